//! Parsed document model: output of the Page Pipeline's fetch+parse stage.

/// A cleaned, readable representation of a fetched web page.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub content_type: Option<String>,
}
