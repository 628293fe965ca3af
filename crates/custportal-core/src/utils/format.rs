use chrono::{DateTime, Local, Utc};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Describe an expiry relative to `now`, e.g. "in 59m (Oct 19, 2026 18:30)"
pub fn format_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let local = expires_at.with_timezone(&Local).format("%b %d, %Y %H:%M");
    let minutes = (expires_at - now).num_minutes();
    if expires_at <= now {
        format!("expired ({})", local)
    } else if minutes < 1 {
        format!("in under a minute ({})", local)
    } else if minutes < 120 {
        format!("in {}m ({})", minutes, local)
    } else {
        format!("in {}h ({})", minutes / 60, local)
    }
}
