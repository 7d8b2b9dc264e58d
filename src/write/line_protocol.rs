//! Minimal line-protocol inspection.
//!
//! Only the measurement of the first point is extracted; the payload itself
//! is never parsed or rewritten.

/// Return the measurement name of the first point in `payload`.
///
/// Blank lines and `#` comments are skipped. Backslash escapes are honoured,
/// so `my\ measurement,host=a` yields `my measurement`.
pub fn first_measurement(payload: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(payload).ok()?;
    let line = text
        .lines()
        .map(str::trim_start)
        .find(|l| !l.is_empty() && !l.starts_with('#'))?;

    let mut name = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    name.push(escaped);
                }
            }
            ',' | ' ' => break,
            _ => name.push(c),
        }
    }

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
