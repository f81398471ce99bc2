//! Step functions of the advisory loop.
//!
//! Each step reads and mutates one [`crate::belief::BeliefState`]:
//!
//! - [`ThinkingStep`] asks the advisor what to do next and picks the action
//! - [`access`] retrieves one knowledge domain
//! - [`analyze`] turns visited evidence into patterns and risk buckets
//! - [`decide`] chooses target hours, direction and magnitude
//! - [`execute`] produces the adjustment plan and finalizes the session
//!
//! Only the thinking step talks to the advisor; the rest are deterministic
//! functions of the state.

mod access;
mod analysis;
mod decision;
mod execution;
pub mod periods;
mod thinking;

pub use access::access;
pub use analysis::analyze;
pub use decision::decide;
pub use execution::execute;
pub use thinking::{render_prompt, select_action, ActionChoice, ThinkOutcome, ThinkingStep};

/// Round `value` to two decimals.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render hours as a compact list such as `07-09, 18`.
pub(crate) fn format_hours<'a>(hours: impl IntoIterator<Item = &'a u8>) -> String {
    let mut sorted: Vec<u8> = hours.into_iter().copied().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&end.saturating_add(1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            ranges.push(format!("{:02}", start));
        } else {
            ranges.push(format!("{:02}-{:02}", start, end));
        }
    }
    if ranges.is_empty() {
        "none".to_string()
    } else {
        ranges.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hours_collapses_runs() {
        assert_eq!(format_hours(&[9, 7, 8, 18, 20, 21]), "07-09, 18, 20-21");
        assert_eq!(format_hours(&Vec::<u8>::new()), "none");
        assert_eq!(format_hours(&[23]), "23");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(-2.344), -2.34);
    }
}
