use chrono::Utc;

/// Source of wall-clock milliseconds used to prefix storage names.
pub trait Clock: Send + Sync {
    fn epoch_millis(&self) -> i64;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn epoch_millis(&self) -> i64 {
        self.0
    }
}

/// Replaces every character outside `[A-Za-z0-9]` with `_`, one per UTF-16
/// code unit, so characters outside the BMP (most emoji) become `__`.
pub fn sanitize_title(title: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            sanitized.push(c);
        } else {
            sanitized.extend(std::iter::repeat_n('_', c.len_utf16()));
        }
    }
    sanitized
}

/// Suffix after the last `.`, case preserved. A name without a dot is
/// returned whole.
pub fn extension_of(original_name: &str) -> &str {
    original_name.rsplit('.').next().unwrap_or(original_name)
}

/// Builds `{epochMillis}_{sanitizedTitle}.{extension}`.
///
/// Uniqueness rests on the timestamp alone: two submissions with the same
/// title in the same millisecond produce the same name.
pub fn storage_name(epoch_millis: i64, title: &str, original_name: &str) -> String {
    format!(
        "{}_{}.{}",
        epoch_millis,
        sanitize_title(title),
        extension_of(original_name)
    )
}
