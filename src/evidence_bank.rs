//! Evidence Bank: append-only store of source-grounded evidence with content-hash dedup and
//! deterministic lexical retrieval.
//!
//! Concurrent `add` calls (from the per-URL fan-out in async mode) must see a consistent
//! `(hash_lookup, id_allocate, append, index_update)` tuple, so all mutable state lives behind
//! one [`Mutex`] guarding the whole operation rather than one lock per map. Because the append
//! step is an `.await` (file I/O), the hash is *reserved* under the lock before that await ever
//! happens: a second `add` racing on the same content hash sees the reservation, waits on it,
//! and is handed the winner's record instead of allocating a second id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::ids::format_evidence_id;
use crate::models::{Evidence, EvidenceItem, EvidenceSource};

struct Inner {
    by_id: HashMap<String, Evidence>,
    insertion_order: Vec<String>,
    hash_to_id: HashMap<String, String>,
    next_id: u64,
    /// Content hashes currently being added by another in-flight `add` call, keyed by hash.
    /// Resolved (removed) and its waiters woken once the winner finishes, whether it succeeded
    /// or failed.
    pending: HashMap<String, Arc<Notify>>,
}

/// Per-run, directory-rooted evidence store. Cheap to clone (internals are behind `Arc`-free
/// `Mutex` owned by the struct itself; callers share `&EvidenceBank` across fan-out tasks).
pub struct EvidenceBank {
    root: PathBuf,
    inner: Mutex<Inner>,
}

impl EvidenceBank {
    /// Construct a bank rooted at `dir`, replaying `evidence.jsonl` if present.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let root = dir.into();
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join("raw")).await?;

        let jsonl_path = root.join("evidence.jsonl");
        let mut by_id = HashMap::new();
        let mut insertion_order = Vec::new();
        let mut hash_to_id = HashMap::new();
        let mut max_numeric_id: u64 = 0;

        if let Ok(contents) = fs::read_to_string(&jsonl_path).await {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Ok(ev) = serde_json::from_str::<Evidence>(line) else {
                    tracing::warn!("skipping malformed evidence.jsonl line");
                    continue;
                };
                if let Some(n) = parse_evidence_numeric_id(&ev.evidence_id) {
                    max_numeric_id = max_numeric_id.max(n);
                }
                if let Some(hash) = &ev.content_hash {
                    hash_to_id.entry(hash.clone()).or_insert_with(|| ev.evidence_id.clone());
                }
                insertion_order.push(ev.evidence_id.clone());
                by_id.insert(ev.evidence_id.clone(), ev);
            }
        }

        Ok(Self {
            root,
            inner: Mutex::new(Inner {
                by_id,
                insertion_order,
                hash_to_id,
                next_id: max_numeric_id + 1,
                pending: HashMap::new(),
            }),
        })
    }

    fn jsonl_path(&self) -> PathBuf {
        self.root.join("evidence.jsonl")
    }

    /// Append one evidence record, deduplicating on `SHA-256(url + "\n" + raw_text)` when
    /// `raw_text` is supplied. Returns the existing record on a dedup hit without any side
    /// effects (no id allocated, no line appended).
    ///
    /// Concurrent callers racing on the same content hash do not both become the writer: the
    /// first reserves the hash under the lock and proceeds; later callers wait on that
    /// reservation and are handed the winner's record once it resolves. If the winner fails,
    /// the reservation is released and a waiter is free to become the new writer itself.
    pub async fn add(
        &self,
        query: impl Into<String>,
        source: EvidenceSource,
        summary: impl Into<String>,
        items: Vec<EvidenceItem>,
        raw_text: Option<&str>,
        tags: Vec<String>,
    ) -> Result<Evidence> {
        let content_hash = raw_text.map(|raw| compute_content_hash(&source.url, raw));

        // Resolve an existing record, or reserve the hash and become the writer. Loops when a
        // racing writer's reservation resolves, to re-check whether it produced the record we
        // were about to write ourselves.
        loop {
            let mut inner = self.inner.lock().unwrap();
            if let Some(hash) = &content_hash {
                if let Some(id) = inner.hash_to_id.get(hash) {
                    if let Some(existing) = inner.by_id.get(id) {
                        return Ok(existing.clone());
                    }
                }
                if let Some(notify) = inner.pending.get(hash) {
                    let notify = notify.clone();
                    // Register interest in the notification *before* releasing the lock: the
                    // winner's cleanup also takes this lock before calling `notify_waiters`, so
                    // creating the future first rules out the wakeup firing in the gap between
                    // dropping the guard and awaiting it.
                    let notified = notify.notified();
                    drop(inner);
                    notified.await;
                    continue;
                }
                inner.pending.insert(hash.clone(), Arc::new(Notify::new()));
            }
            break;
        }

        let result = self.write_new_evidence(query, source, summary, items, raw_text, tags, &content_hash).await;

        if let Some(hash) = &content_hash {
            let mut inner = self.inner.lock().unwrap();
            if let Some(notify) = inner.pending.remove(hash) {
                notify.notify_waiters();
            }
        }

        result
    }

    /// Allocate an id, persist raw text (if any) and the JSONL record, and update the in-memory
    /// indices. Called only by the caller that won the hash reservation (or when there is no
    /// hash to reserve at all).
    async fn write_new_evidence(
        &self,
        query: impl Into<String>,
        source: EvidenceSource,
        summary: impl Into<String>,
        items: Vec<EvidenceItem>,
        raw_text: Option<&str>,
        tags: Vec<String>,
        content_hash: &Option<String>,
    ) -> Result<Evidence> {
        let allocated_id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            id
        };

        let evidence_id = format_evidence_id(allocated_id);

        let raw_text_ref = if let Some(raw) = raw_text {
            let hash12 = content_hash.as_deref().map(|h| &h[..12]).unwrap_or("unknown");
            let fname = format!("{}_{}.txt", Utc::now().format("%Y%m%dT%H%M%SZ"), hash12);
            let path = self.root.join("raw").join(&fname);
            let mut file = fs::File::create(&path).await?;
            file.write_all(raw.as_bytes()).await?;
            Some(format!("raw/{fname}"))
        } else {
            None
        };

        let evidence = Evidence {
            evidence_id: evidence_id.clone(),
            query: query.into(),
            source,
            summary: summary.into(),
            evidence_items: items,
            raw_text_ref,
            content_hash: content_hash.clone(),
            tags,
        };

        let line = serde_json::to_string(&evidence)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.jsonl_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(hash) = content_hash {
            inner.hash_to_id.insert(hash.clone(), evidence_id.clone());
        }
        inner.insertion_order.push(evidence_id.clone());
        inner.by_id.insert(evidence_id, evidence.clone());

        Ok(evidence)
    }

    pub fn get(&self, id: &str) -> Result<Evidence> {
        self.inner
            .lock()
            .unwrap()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Fetch ids in the given order, silently skipping any that don't exist.
    pub fn bulk_get(&self, ids: &[String]) -> Vec<Evidence> {
        let inner = self.inner.lock().unwrap();
        ids.iter().filter_map(|id| inner.by_id.get(id).cloned()).collect()
    }

    pub fn list_all(&self) -> Vec<Evidence> {
        let inner = self.inner.lock().unwrap();
        inner
            .insertion_order
            .iter()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().by_id.len()
    }

    /// Aggregate stats used by planner decision guidance and diagnostics.
    pub fn stats(&self) -> BankStats {
        let inner = self.inner.lock().unwrap();
        let mut by_tag: HashMap<String, usize> = HashMap::new();
        for ev in inner.by_id.values() {
            for tag in &ev.tags {
                *by_tag.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        BankStats {
            count: inner.by_id.len(),
            by_tag,
        }
    }

    /// Deterministic lexical scoring: score = count of distinct query tokens present in the
    /// candidate's searchable text. Zero-scored candidates are dropped; ties keep insertion
    /// order (stable sort).
    pub fn retrieve_scored(&self, query: &str, top_k: usize) -> Vec<(Evidence, usize)> {
        let query_tokens: std::collections::HashSet<String> = tokenize(query).into_iter().collect();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, Evidence, usize)> = self
            .list_all()
            .into_iter()
            .enumerate()
            .filter_map(|(idx, ev)| {
                let candidate_tokens: std::collections::HashSet<String> =
                    tokenize(&ev.searchable_text()).into_iter().collect();
                let score = query_tokens.intersection(&candidate_tokens).count();
                if score == 0 {
                    None
                } else {
                    Some((idx, ev, score))
                }
            })
            .collect();

        // Stable sort descending by score; ties preserve insertion order because `idx` is the
        // secondary key and the comparator only inspects it when scores are equal.
        scored.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        scored.into_iter().map(|(_, ev, score)| (ev, score)).collect()
    }

    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<Evidence> {
        self.retrieve_scored(query, top_k)
            .into_iter()
            .map(|(ev, _)| ev)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct BankStats {
    pub count: usize,
    pub by_tag: HashMap<String, usize>,
}

fn parse_evidence_numeric_id(id: &str) -> Option<u64> {
    id.strip_prefix("ev_")?.parse().ok()
}

fn compute_content_hash(url: &str, raw_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(raw_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Tokenize `text` into lowercased units: runs of `[A-Za-z0-9_]` of length >= 2, plus each CJK
/// unified ideograph (`U+4E00..=U+9FFF`) as its own single-character unit (CJK text carries no
/// spaces, so length-2 would drop it entirely).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut ascii_run = String::new();

    let flush = |run: &mut String, tokens: &mut Vec<String>| {
        if run.len() >= 2 {
            tokens.push(run.to_lowercase());
        }
        run.clear();
    };

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            ascii_run.push(ch);
        } else if ('\u{4E00}'..='\u{9FFF}').contains(&ch) {
            flush(&mut ascii_run, &mut tokens);
            tokens.push(ch.to_lowercase().to_string());
        } else {
            flush(&mut ascii_run, &mut tokens);
        }
    }
    flush(&mut ascii_run, &mut tokens);

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvidenceSource;

    fn source(url: &str) -> EvidenceSource {
        EvidenceSource {
            url: url.to_string(),
            title: None,
            publisher: None,
            author: None,
            published_at: None,
            retrieved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_allocates_monotonic_ids() {
        let dir = tempfile::tempdir().unwrap();
        let bank = EvidenceBank::open(dir.path()).await.unwrap();

        let e1 = bank
            .add("q", source("https://a"), "summary a", vec![], Some("raw a"), vec![])
            .await
            .unwrap();
        let e2 = bank
            .add("q", source("https://b"), "summary b", vec![], Some("raw b"), vec![])
            .await
            .unwrap();

        assert_eq!(e1.evidence_id, "ev_0001");
        assert_eq!(e2.evidence_id, "ev_0002");
        assert_eq!(bank.count(), 2);
    }

    #[tokio::test]
    async fn dedup_returns_existing_record_without_new_line() {
        let dir = tempfile::tempdir().unwrap();
        let bank = EvidenceBank::open(dir.path()).await.unwrap();

        let e1 = bank
            .add("q", source("https://x"), "s", vec![], Some("hello"), vec![])
            .await
            .unwrap();
        let e2 = bank
            .add("q", source("https://x"), "s", vec![], Some("hello"), vec![])
            .await
            .unwrap();
        assert_eq!(e1.evidence_id, e2.evidence_id);

        let e3 = bank
            .add("q", source("https://x"), "s", vec![], Some("world"), vec![])
            .await
            .unwrap();
        assert_eq!(e3.evidence_id, "ev_0002");
        assert_eq!(bank.count(), 2);

        let contents = fs::read_to_string(dir.path().join("evidence.jsonl")).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn concurrent_adds_with_identical_content_dedup_to_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(EvidenceBank::open(dir.path()).await.unwrap());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let bank = bank.clone();
            tasks.push(tokio::spawn(async move {
                bank.add("q", source("https://race"), "s", vec![], Some("same raw text"), vec![])
                    .await
                    .unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().evidence_id);
        }

        assert_eq!(ids.len(), 1, "all racing adds must resolve to the same evidence id");
        assert_eq!(bank.count(), 1);

        let contents = fs::read_to_string(dir.path().join("evidence.jsonl")).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn reload_from_jsonl_reconstructs_next_id() {
        let dir = tempfile::tempdir().unwrap();
        {
            let bank = EvidenceBank::open(dir.path()).await.unwrap();
            bank.add("q", source("https://a"), "s", vec![], Some("x"), vec![])
                .await
                .unwrap();
        }
        let bank2 = EvidenceBank::open(dir.path()).await.unwrap();
        assert_eq!(bank2.count(), 1);
        let e = bank2
            .add("q", source("https://b"), "s", vec![], Some("y"), vec![])
            .await
            .unwrap();
        assert_eq!(e.evidence_id, "ev_0002");
    }

    #[tokio::test]
    async fn retrieve_scored_ranks_and_drops_zero_score() {
        let dir = tempfile::tempdir().unwrap();
        let bank = EvidenceBank::open(dir.path()).await.unwrap();
        bank.add("async python asyncio", source("https://a"), "async python asyncio", vec![], None, vec![])
            .await
            .unwrap();
        bank.add("go routines channels", source("https://b"), "go routines channels", vec![], None, vec![])
            .await
            .unwrap();

        let results = bank.retrieve_scored("asyncio python", 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.source.url, "https://a");
        assert_eq!(results[0].1, 2);
    }

    #[tokio::test]
    async fn bulk_get_preserves_order_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let bank = EvidenceBank::open(dir.path()).await.unwrap();
        bank.add("q", source("https://a"), "s", vec![], Some("a"), vec![])
            .await
            .unwrap();
        bank.add("q", source("https://b"), "s", vec![], Some("b"), vec![])
            .await
            .unwrap();

        let fetched = bank.bulk_get(&[
            "ev_0002".to_string(),
            "ev_9999".to_string(),
            "ev_0001".to_string(),
        ]);
        let ids: Vec<_> = fetched.iter().map(|e| e.evidence_id.clone()).collect();
        assert_eq!(ids, vec!["ev_0002", "ev_0001"]);
    }

    #[test]
    fn tokenize_splits_cjk_into_single_char_units() {
        let tokens = tokenize("hello 深度 research");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"research".to_string()));
        assert!(tokens.contains(&"深".to_string()));
        assert!(tokens.contains(&"度".to_string()));
    }

    #[test]
    fn tokenize_drops_single_char_ascii_runs() {
        let tokens = tokenize("a bb c");
        assert_eq!(tokens, vec!["bb"]);
    }
}
