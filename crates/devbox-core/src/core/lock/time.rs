use std::env;

use time::OffsetDateTime;

fn lock_timestamp() -> OffsetDateTime {
    if let Ok(raw) = env::var("SOURCE_DATE_EPOCH") {
        if let Ok(epoch) = raw.trim().parse::<i64>() {
            if let Ok(ts) = OffsetDateTime::from_unix_timestamp(epoch) {
                return ts;
            }
        }
    }
    OffsetDateTime::now_utc()
}

/// RFC 3339 creation time for a new lock, pinned by `SOURCE_DATE_EPOCH` when
/// set.
pub(crate) fn lock_timestamp_string() -> String {
    let ts = lock_timestamp();
    ts.replace_nanosecond(0)
        .unwrap_or(ts)
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
