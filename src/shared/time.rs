use chrono::Utc;

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// RFC 3339 rendering used in human-facing notifications and CLI output.
pub fn format_millis(millis: i64) -> String {
    chrono::DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|value| value.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_render_as_rfc3339() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn clock_values_agree_on_seconds() {
        let secs = now_secs();
        let millis = now_millis();
        assert!((millis / 1000 - secs).abs() <= 1);
    }
}
