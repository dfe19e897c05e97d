use std::time::Duration;

/// Format a byte count as kilobytes with two decimals
pub fn format_bytes(bytes: usize) -> String {
    format!("{:.2} Kb", bytes as f64 / 1024.0)
}

/// Format a duration the way it is shown to users, e.g. "10s" or "250ms"
pub fn format_duration(duration: Duration) -> String {
    format!("{:?}", duration)
}
