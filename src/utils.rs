use std::fmt::Display;
use std::time::{Duration, Instant};

/// Format a `Duration` with two decimals and a scaled unit, e.g. `1.94ms`.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Warn when more than `threshold` has passed since `start`.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(duration = fmt_duration(elapsed), "slow operation: {label}");
    }
}

/// Join at most `max` items with `, `, noting how many were left out.
pub fn fmt_preview<T: Display>(items: &[T], max: usize) -> String {
    let shown = items
        .iter()
        .take(max)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    match items.len().saturating_sub(max) {
        0 => shown,
        rest => format!("{shown} and {rest} more"),
    }
}
