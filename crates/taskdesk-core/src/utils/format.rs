use chrono::{DateTime, Duration, NaiveDate};

/// Format a date string to a more readable format
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if let Ok(day) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        day.format("%b %d, %Y").to_string()
    } else {
        date.to_string()
    }
}

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

/// Describe the time left on a token: "expires in 14m", "expired 2h ago"
pub fn format_expiry(remaining: Duration) -> String {
    let minutes = remaining.num_minutes();
    let span = |m: i64| {
        if m < 60 {
            format!("{}m", m)
        } else if m < 1440 {
            format!("{}h", m / 60)
        } else {
            format!("{}d", m / 1440)
        }
    };
    if remaining < Duration::zero() {
        format!("expired {} ago", span(-minutes))
    } else if minutes < 1 {
        "expires in under a minute".to_string()
    } else {
        format!("expires in {}", span(minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2026-11-01T17:00:00Z"), "Nov 01, 2026");
        assert_eq!(format_date("2026-10-14"), "Oct 14, 2026");
        assert_eq!(format_date("soon"), "soon");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("héllo wörld", 6), "hél...");
    }

    #[test]
    fn test_format_expiry() {
        assert_eq!(format_expiry(Duration::minutes(14)), "expires in 14m");
        assert_eq!(format_expiry(Duration::minutes(150)), "expires in 2h");
        assert_eq!(format_expiry(Duration::seconds(20)), "expires in under a minute");
        assert_eq!(format_expiry(Duration::minutes(-120)), "expired 2h ago");
        assert_eq!(format_expiry(Duration::days(3)), "expires in 3d");
    }
}
