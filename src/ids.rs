//! Id formatting helpers.

use chrono::Utc;
use uuid::Uuid;

/// Format a monotonic evidence id, e.g. `format_evidence_id(1) == "ev_0001"`.
pub fn format_evidence_id(n: u64) -> String {
    format!("ev_{:04}", n)
}

/// Generate a run id: `YYYYMMDDTHHMMSSZ_<8hexchars>` (UTC timestamp + random suffix).
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{timestamp}_{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pads_to_width_four() {
        assert_eq!(format_evidence_id(1), "ev_0001");
        assert_eq!(format_evidence_id(23), "ev_0023");
        assert_eq!(format_evidence_id(10_000), "ev_10000");
    }
}
