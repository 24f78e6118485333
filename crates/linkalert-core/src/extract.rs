use crate::models::{CandidateLink, RawTrafficRow};

/// Marker the analytics provider puts in `referralPath` when no path was
/// recorded (direct visits, search engines, campaigns).
pub const NOT_SET: &str = "(not set)";

/// Turns raw traffic rows into candidate referring URLs.
///
/// Rows without a referral path are dropped; the rest become
/// `source_domain + referral_path`. Order and duplicates are preserved.
pub fn extract_links(rows: &[RawTrafficRow]) -> Vec<CandidateLink> {
    rows.iter()
        .filter(|row| row.referral_path != NOT_SET)
        .map(|row| format!("{}{}", row.source_domain, row.referral_path))
        .collect()
}
