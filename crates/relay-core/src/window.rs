//! Time-window bucketing.
//!
//! Wall-clock time is quantized into 30-minute windows aligned to the local
//! clock face (:00 and :30). Every instant inside a window maps to the same
//! bucket, which is what makes the derived checksum rotate twice an hour.

use chrono::{DateTime, TimeDelta, TimeZone, Timelike};

/// Window length in minutes.
pub const WINDOW_MINUTES: u32 = 30;

/// Start of the window containing `now`, in `now`'s own time zone.
///
/// Minutes are rounded down to a multiple of [`WINDOW_MINUTES`]; seconds and
/// sub-second fields are zeroed.
pub fn window_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let into_window = TimeDelta::minutes(i64::from(now.minute() % WINDOW_MINUTES))
        + TimeDelta::seconds(i64::from(now.second()))
        + TimeDelta::nanoseconds(i64::from(now.nanosecond()));
    now.clone() - into_window
}

/// Epoch seconds of the window containing `now`.
pub fn bucket_timestamp<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    window_start(now).timestamp()
}
