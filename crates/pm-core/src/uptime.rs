//! Human-readable uptime strings.

use chrono::Duration;

const SECS_PER_DAY: i64 = 86_400;

/// Formats a duration as `H:MM:SS`, prefixed with `N day(s), ` past 24 hours.
///
/// Sub-second precision is dropped and negative durations clamp to zero.
///
/// ```
/// use chrono::Duration;
/// use pm_core::format_uptime;
///
/// assert_eq!(format_uptime(Duration::seconds(83)), "0:01:23");
/// assert_eq!(format_uptime(Duration::seconds(90_061)), "1 day, 1:01:01");
/// ```
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.num_seconds().max(0);
    let days = total / SECS_PER_DAY;
    let rem = total % SECS_PER_DAY;
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);

    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}
