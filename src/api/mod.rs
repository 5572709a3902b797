//! REST API handlers and shared query helpers

pub mod admin;
pub mod health;
pub mod institution;

/// Maximum allowed page size
pub(crate) const MAX_COUNT: i64 = 100;

pub(crate) fn default_count() -> i64 {
    MAX_COUNT
}

/// Clamp out-of-range pagination values instead of rejecting them
pub(crate) fn normalize_pagination(page: i64, count: i64) -> (i64, i64) {
    (page.max(0), count.clamp(1, MAX_COUNT))
}

/// Parse a comma-separated LEI filter.
///
/// Blank segments are dropped; an empty or all-blank filter is treated as no
/// filter at all.
pub(crate) fn parse_leis(raw: Option<&str>) -> Option<Vec<String>> {
    let leis: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|lei| !lei.is_empty())
        .map(str::to_string)
        .collect();
    if leis.is_empty() {
        None
    } else {
        Some(leis)
    }
}
