use chrono::DateTime;
use chrono_tz::Tz;

/// "2025-01-05 09:30:00.000 PST"
pub fn format_epoch_ms(ms: i64, zone: &Tz) -> String {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or_default()
        .with_timezone(zone)
        .format("%Y-%m-%d %H:%M:%S%.3f %Z")
        .to_string()
}

pub fn epoch_ms_to_iso(ms: i64, zone: &Tz) -> String {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or_default()
        .with_timezone(zone)
        .to_rfc3339()
}
