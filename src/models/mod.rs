//! Data model: evidence, outline, search results, and agent action sum types.

pub mod actions;
pub mod document;
pub mod evidence;
pub mod outline;
pub mod search;

pub use actions::{PlannerAction, WriterAction};
pub use document::ParsedDocument;
pub use evidence::{Evidence, EvidenceItem, EvidenceSource, EvidenceType};
pub use outline::{split_outline_sections, Outline};
pub use search::SearchResult;
