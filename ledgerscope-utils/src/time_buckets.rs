use chrono::{DateTime, TimeZone, Utc};

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 86_400;

/// Start of the UTC hour containing `t`.
pub fn hour_bucket(t: DateTime<Utc>) -> DateTime<Utc> {
    let ts = t.timestamp();
    Utc.timestamp_opt(ts - ts.rem_euclid(HOUR_SECS), 0).unwrap()
}

/// Start of the UTC calendar day containing `t`.
pub fn day_bucket(t: DateTime<Utc>) -> DateTime<Utc> {
    let ts = t.timestamp();
    Utc.timestamp_opt(ts - ts.rem_euclid(DAY_SECS), 0).unwrap()
}
