//! Search Provider: ranked web-search results with retry/backoff and typed errors.
//!
//! Polymorphic over `{primary_api, fallback_library}` behind one [`SearchProvider`] trait so the
//! planner's search step never has to know which backend answered a query.

pub mod api;
pub mod lite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::SearchResult;

pub use api::ApiSearchProvider;
pub use lite::LiteSearchProvider;

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Whether an HTTP status / transport failure should be retried.
///
/// Retryable: 429 (rate limited) and 5xx (server-side), plus any network-level timeout or
/// connection failure. Everything else (4xx other than 429, malformed response bodies, auth
/// failures) is terminal.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=504).contains(&status)
}

/// Backoff for attempt `n` (0-based): `min(max_backoff, base * 2^n)`, in seconds.
pub fn computed_backoff_secs(attempt: u32, base_secs: f64, max_backoff_secs: f64) -> f64 {
    let exp = base_secs * 2f64.powi(attempt as i32);
    exp.min(max_backoff_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(401));
    }

    #[test]
    fn backoff_grows_exponentially_then_caps() {
        assert_eq!(computed_backoff_secs(0, 0.75, 8.0), 0.75);
        assert_eq!(computed_backoff_secs(1, 0.75, 8.0), 1.5);
        assert_eq!(computed_backoff_secs(2, 0.75, 8.0), 3.0);
        assert_eq!(computed_backoff_secs(10, 0.75, 8.0), 8.0);
    }
}
