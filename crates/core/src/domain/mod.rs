pub mod case;
pub mod deviation;
pub mod employee;
pub mod incentive;

/// Case-insensitive comparison for organisational keys (state, area, branch, codes).
pub(crate) fn same_key(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}

pub(crate) fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
