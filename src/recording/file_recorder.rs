//! Append-only JSONL event recorder.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::events::RunEvent;

use super::EventSink;

/// Writes events to `events.jsonl`, one JSON object per line.
pub struct FileEventRecorder {
    path: PathBuf,
}

impl FileEventRecorder {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl EventSink for FileEventRecorder {
    async fn append(&mut self, event: &RunEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

/// Load all events from a JSONL file. Missing files yield an empty list.
pub async fn iter_events(path: &Path) -> Result<Vec<RunEvent>> {
    let mut events = Vec::new();
    let Ok(contents) = fs::read_to_string(path).await else {
        return Ok(events);
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        events.push(serde_json::from_str(line)?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ContentType, EventType};

    #[tokio::test]
    async fn append_then_iter_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut recorder = FileEventRecorder::new(&path).await.unwrap();
        let ev = RunEvent::new(
            "run1",
            1,
            EventType::System,
            ContentType::Message,
            serde_json::json!("hello"),
        );
        recorder.append(&ev).await.unwrap();

        let loaded = iter_events(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].seq, 1);
    }

    #[tokio::test]
    async fn iter_events_missing_file_returns_empty() {
        let loaded = iter_events(Path::new("/nonexistent/events.jsonl"))
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }
}
