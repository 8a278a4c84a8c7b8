//! Outline model: a Markdown skeleton with a monotonic version counter.

use serde::{Deserialize, Serialize};

/// A report outline stored as Markdown text containing `<citation>id_1,id_2</citation>` markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub text: String,
    pub version: u32,
}

impl Outline {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            version: 1,
        }
    }

    pub fn new(text: String) -> Self {
        Self { text, version: 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Replace the text and bump the version counter.
    pub fn update(&mut self, text: String) {
        self.text = text;
        self.version += 1;
    }

    /// Split on `## ` headings at column 0 into `(title, body)` pairs.
    ///
    /// An outline with no `## ` headings yields a single `("Report", whole_text)` section.
    pub fn split_sections(&self) -> Vec<(String, String)> {
        split_outline_sections(&self.text)
    }
}

/// Pure function version of [`Outline::split_sections`], usable on any markdown text.
pub fn split_outline_sections(text: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_body = String::new();

    for line in text.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            if let Some(t) = current_title.take() {
                sections.push((t, current_body.trim().to_string()));
                current_body = String::new();
            }
            current_title = Some(title.trim().to_string());
        } else if current_title.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if let Some(t) = current_title.take() {
        sections.push((t, current_body.trim().to_string()));
    }

    if sections.is_empty() {
        sections.push(("Report".to_string(), text.trim().to_string()));
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_bumps_version() {
        let mut o = Outline::empty();
        assert_eq!(o.version, 1);
        o.update("# x".to_string());
        assert_eq!(o.version, 2);
    }

    #[test]
    fn split_sections_on_h2_boundaries() {
        let text = "## Intro\nhello\n## Body\nworld\nmore";
        let sections = split_outline_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0], ("Intro".to_string(), "hello".to_string()));
        assert_eq!(sections[1], ("Body".to_string(), "world\nmore".to_string()));
    }

    #[test]
    fn split_sections_no_headings_yields_single_report_section() {
        let sections = split_outline_sections("just some text");
        assert_eq!(sections, vec![("Report".to_string(), "just some text".to_string())]);
    }
}
