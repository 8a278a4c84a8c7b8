//! Planner/Writer action sum types, parsed from tagged LLM output by [`crate::tags`] and the
//! agents' own `_parse_action`-equivalents.

/// Action chosen by a Planner step.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerAction {
    Search { queries: Vec<String>, goal: String },
    WriteOutline { text: String },
    Terminate { reason: String },
}

/// Action chosen by a Writer step, scoped to one section.
#[derive(Debug, Clone, PartialEq)]
pub enum WriterAction {
    Retrieve {
        query: Option<String>,
        top_k: usize,
        citation_ids: Option<Vec<String>>,
    },
    Write { text: String },
    Terminate { reason: String },
}

impl WriterAction {
    pub const DEFAULT_TOP_K: usize = 8;
}
