use once_cell::sync::Lazy;
use regex::Regex;

/// Matches one `[mm:ss]`, `[mm:ss.fff]` or `[mm:ss:fff]` tag anywhere in a line
pub static TIME_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+:\d{1,2}(?:[.:]\d{1,3})?\]").expect("valid time tag pattern"));

static TIME_TAG_PARTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[?(\d+):(\d{1,2})(?:[.:](\d{1,3}))?\]?$").expect("valid time tag pattern")
});

/// Format seconds as `mm:ss.fff`, applying `offset` and clamping at zero.
///
/// Milliseconds are truncated, not rounded. Minutes grow past 59 instead of
/// rolling into hours.
pub fn format_time(seconds: f64, offset: f64) -> String {
    let final_seconds = (seconds + offset).max(0.0);
    // Nudge against binary representation error (1.001 * 1000 = 1000.999..)
    let total_milliseconds = (final_seconds * 1000.0 + 1e-6) as u64;
    let minutes = total_milliseconds / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}.{:03}", minutes, secs, millis)
}

/// Parse a time tag into seconds. Both `.` and `:` are accepted before the
/// sub-second digits, which are read as a decimal fraction.
pub fn parse_time_tag(tag: &str) -> Option<f64> {
    let caps = TIME_TAG_PARTS.captures(tag.trim())?;
    let minutes: u64 = caps.get(1)?.as_str().parse().ok()?;
    let seconds: u64 = caps.get(2)?.as_str().parse().ok()?;
    let fraction = match caps.get(3) {
        Some(digits) => {
            let value: u64 = digits.as_str().parse().ok()?;
            value as f64 / 10f64.powi(digits.as_str().len() as i32)
        }
        None => 0.0,
    };

    // An overflowing minute count is a malformed tag
    let whole_seconds = minutes.checked_mul(60)?.checked_add(seconds)?;
    Some(whole_seconds as f64 + fraction)
}

/// Remove every time tag from `text`
pub fn strip_time_tags(text: &str) -> String {
    TIME_TAG.replace_all(text, "").into_owned()
}
