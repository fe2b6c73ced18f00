//! Text conversions and code-point aware string operations
//!
//! Strings are byte buffers that are expected, but not required, to hold
//! UTF-8. Positions used by blocks are 1-based code-point indices; a code
//! point starts at every byte that is not a UTF-8 continuation byte.

/// Whether `byte` starts a new code point
const fn is_char_start(byte: u8) -> bool {
    byte & 0xC0 != 0x80
}

/// Byte offsets of every code point start, plus the end offset
fn char_bounds(bytes: &[u8]) -> Vec<usize> {
    let mut bounds: Vec<usize> = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| is_char_start(**b))
        .map(|(i, _)| i)
        .collect();
    bounds.push(bytes.len());
    bounds
}

/// Number of code points
#[must_use]
pub fn length(bytes: &[u8]) -> i64 {
    bytes.iter().filter(|&&b| is_char_start(b)).count() as i64
}

/// The code point at 1-based `index`, empty when out of range
#[must_use]
pub fn letter_in(bytes: &[u8], index: i64) -> &[u8] {
    substring(bytes, index, index)
}

/// Code points `begin..=end` (1-based)
///
/// `begin` is clamped to 1; an empty result is returned when `end <= 0`,
/// `begin > end`, or `begin` lies past the end of the string.
#[must_use]
pub fn substring(bytes: &[u8], begin: i64, end: i64) -> &[u8] {
    let begin = begin.max(1);
    if end <= 0 || begin > end {
        return &[];
    }

    let bounds = char_bounds(bytes);
    let count = bounds.len() as i64 - 1;
    if begin > count {
        return &[];
    }
    let end = end.min(count);
    &bytes[bounds[(begin - 1) as usize]..bounds[end as usize]]
}

/// First code point as an integer, 0 for an empty string
#[must_use]
pub fn ord(bytes: &[u8]) -> i64 {
    let Some(&first) = bytes.first() else {
        return 0;
    };
    let width = bytes
        .iter()
        .skip(1)
        .position(|&b| is_char_start(b))
        .map_or(bytes.len(), |pos| pos + 1);
    std::str::from_utf8(&bytes[..width])
        .ok()
        .and_then(|s| s.chars().next())
        .map_or(i64::from(first), |c| i64::from(u32::from(c)))
}

/// UTF-8 encoding of a code point, empty when invalid
#[must_use]
pub fn chr(code: i64) -> String {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_default()
}

/// Parse a leading integer the way C `atoi` does
///
/// Leading whitespace and one sign are accepted; parsing stops at the first
/// non-digit and overflow wraps.
#[must_use]
pub fn parse_leading_int(bytes: &[u8]) -> i64 {
    let mut iter = bytes.iter().copied().skip_while(u8::is_ascii_whitespace).peekable();
    let negative = match iter.peek() {
        Some(b'-') => {
            iter.next();
            true
        }
        Some(b'+') => {
            iter.next();
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for byte in iter {
        if !byte.is_ascii_digit() {
            break;
        }
        value = value.wrapping_mul(10).wrapping_add(i64::from(byte - b'0'));
    }
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

/// Parse a leading float the way C `atof` does, 0.0 when nothing parses
#[must_use]
pub fn parse_leading_float(bytes: &[u8]) -> f64 {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start();
    let raw = text.as_bytes();

    let mut end = 0;
    if matches!(raw.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while raw.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if raw.get(end) == Some(&b'.') {
        end += 1;
        while raw.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
    }
    if end == digits_start || (end == digits_start + 1 && raw[digits_start] == b'.') {
        return 0.0;
    }
    if matches!(raw.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(raw.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while raw.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    text[..end].parse().unwrap_or(0.0)
}

/// Float formatting used everywhere a float becomes text (`%f`)
#[must_use]
pub fn format_float(value: f64) -> String {
    format!("{:.6}", value)
}

/// Bool formatting
#[must_use]
pub const fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Color formatting, `#rrggbbaa`
#[must_use]
pub fn format_color(value: i64) -> String {
    format!("#{:08x}", value as u32)
}

/// Placeholder printed for lists
#[must_use]
pub fn format_list(len: u64) -> String {
    format!("*LIST ({})*", len)
}

/// Parse `#rrggbbaa` or `#rrggbb` (alpha defaults to opaque)
#[must_use]
pub fn parse_color(text: &str) -> Option<i64> {
    let hex = text.trim().strip_prefix('#')?;
    let value = u32::from_str_radix(hex, 16).ok()?;
    match hex.len() {
        6 => Some(i64::from((value << 8) | 0xff)),
        8 => Some(i64::from(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_counts_code_points() {
        assert_eq!(length(b""), 0);
        assert_eq!(length(b"abc"), 3);
        assert_eq!(length("héllo".as_bytes()), 5);
        assert_eq!(length("日本".as_bytes()), 2);
    }

    #[test]
    fn letter_in_is_one_based() {
        assert_eq!(letter_in(b"abc", 1), b"a");
        assert_eq!(letter_in(b"abc", 3), b"c");
        assert_eq!(letter_in(b"abc", 0), b"");
        assert_eq!(letter_in(b"abc", 4), b"");
        assert_eq!(letter_in("añb".as_bytes(), 2), "ñ".as_bytes());
    }

    #[test]
    fn substring_clamps() {
        assert_eq!(substring(b"hello", 2, 4), b"ell");
        assert_eq!(substring(b"hello", -3, 2), b"he");
        assert_eq!(substring(b"hello", 4, 100), b"lo");
        assert_eq!(substring(b"hello", 3, 2), b"");
        assert_eq!(substring(b"hello", 1, 0), b"");
        assert_eq!(substring(b"hello", 9, 12), b"");
        assert_eq!(substring("日本語".as_bytes(), 2, 3), "本語".as_bytes());
    }

    #[test]
    fn ord_and_chr() {
        assert_eq!(ord(b"A"), 65);
        assert_eq!(ord(b""), 0);
        assert_eq!(ord("é!".as_bytes()), 0xe9);
        assert_eq!(chr(97), "a");
        assert_eq!(chr(0x65e5), "日");
        assert_eq!(chr(-1), "");
        assert_eq!(chr(0xd800), "");
    }

    #[test]
    fn leading_int_like_atoi() {
        assert_eq!(parse_leading_int(b"42"), 42);
        assert_eq!(parse_leading_int(b"  -17abc"), -17);
        assert_eq!(parse_leading_int(b"+8"), 8);
        assert_eq!(parse_leading_int(b"abc"), 0);
        assert_eq!(parse_leading_int(b""), 0);
        assert_eq!(parse_leading_int(b"3.9"), 3);
    }

    #[test]
    fn leading_float_like_atof() {
        assert!((parse_leading_float(b"2.5") - 2.5).abs() < 1e-12);
        assert!((parse_leading_float(b" -1.25xyz") + 1.25).abs() < 1e-12);
        assert!((parse_leading_float(b"1e3") - 1000.0).abs() < 1e-9);
        assert!((parse_leading_float(b"7e") - 7.0).abs() < 1e-12);
        assert!((parse_leading_float(b".5") - 0.5).abs() < 1e-12);
        assert_eq!(parse_leading_float(b"."), 0.0);
        assert_eq!(parse_leading_float(b"abc"), 0.0);
    }

    #[test]
    fn formatting() {
        assert_eq!(format_float(1.5), "1.500000");
        assert_eq!(format_bool(true), "true");
        assert_eq!(format_color(0x11_22_33_ff), "#112233ff");
        assert_eq!(format_list(3), "*LIST (3)*");
    }

    #[test]
    fn color_parsing() {
        assert_eq!(parse_color("#ff0000"), Some(0xff00_00ff));
        assert_eq!(parse_color("#00ff0080"), Some(0x00ff_0080));
        assert_eq!(parse_color("red"), None);
        assert_eq!(parse_color("#abc"), None);
    }
}
