//! Locale independent number parsing and formatting.
//!
//! EDF headers and TAL records embed numbers as plain ASCII with a dot as
//! decimal separator. Nothing here consults the process locale.

use crate::EDFLIB_TIME_DIMENSION;

/// 检查字符串是否为有效的整数
///
/// Optional leading sign, at least one digit, trailing space padding allowed
/// only after the digits.
pub fn is_integer_number(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return false;
    }

    let mut i = usize::from(bytes[0] == b'+' || bytes[0] == b'-');
    let mut digits = 0;
    let mut has_space = false;

    while i < bytes.len() {
        match bytes[i] {
            b' ' => {
                if digits == 0 {
                    return false;
                }
                has_space = true;
            }
            b'0'..=b'9' if !has_space => digits += 1,
            _ => return false,
        }
        i += 1;
    }

    digits > 0
}

/// 检查字符串是否为有效的数字（包括浮点数）
///
/// Like [`is_integer_number`] but accepts one decimal dot and an optional
/// exponent (`e`/`E`, optionally signed).
pub fn is_number(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return false;
    }

    let mut i = usize::from(bytes[0] == b'+' || bytes[0] == b'-');
    let mut digits = 0;
    let mut has_space = false;
    let mut has_dot = false;
    let mut has_exp = false;

    while i < bytes.len() {
        match bytes[i] {
            b'e' | b'E' => {
                if digits == 0 {
                    return false;
                }
                has_exp = true;
                digits = 0;
                break;
            }
            b' ' => {
                if digits == 0 {
                    return false;
                }
                has_space = true;
            }
            _ if has_space => return false,
            b'.' => {
                if has_dot {
                    return false;
                }
                has_dot = true;
            }
            b'0'..=b'9' => digits += 1,
            _ => return false,
        }
        i += 1;
    }

    if has_exp {
        i += 1;
        if i == bytes.len() {
            return false;
        }
        if bytes[i] == b'+' || bytes[i] == b'-' {
            i += 1;
        }
        while i < bytes.len() {
            match bytes[i] {
                b' ' => {
                    if digits == 0 {
                        return false;
                    }
                    has_space = true;
                }
                b'0'..=b'9' if !has_space => digits += 1,
                _ => return false,
            }
            i += 1;
        }
    }

    digits > 0
}

/// TAL onset grammar: mandatory sign, digits with at most one inner dot.
pub fn is_onset_number(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return false;
    }
    if bytes[0] != b'+' && bytes[0] != b'-' {
        return false;
    }
    if bytes[1] == b'.' || bytes[bytes.len() - 1] == b'.' {
        return false;
    }
    is_plain_decimal(&bytes[1..])
}

/// TAL duration grammar: unsigned digits with at most one inner dot.
pub fn is_duration_number(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    if bytes[0] == b'.' || bytes[bytes.len() - 1] == b'.' {
        return false;
    }
    is_plain_decimal(bytes)
}

fn is_plain_decimal(bytes: &[u8]) -> bool {
    let mut has_dot = false;
    for &b in bytes {
        match b {
            b'.' if has_dot => return false,
            b'.' => has_dot = true,
            b'0'..=b'9' => {}
            _ => return false,
        }
    }
    true
}

/// Fixed point conversion of unsigned decimal seconds to 100 ns units.
///
/// Digits past the seventh decimal are ignored.
fn fixed_point_seconds(digits: &[u8]) -> i64 {
    let (int_part, frac_part) = match digits.iter().position(|&b| b == b'.') {
        Some(dot) => (&digits[..dot], &digits[dot + 1..]),
        None => (digits, &digits[..0]),
    };

    let mut value: i64 = 0;
    let mut radix = EDFLIB_TIME_DIMENSION;
    for &b in int_part.iter().rev() {
        value = value.saturating_add(i64::from(b.wrapping_sub(b'0')).saturating_mul(radix));
        radix = radix.saturating_mul(10);
    }

    let mut radix = EDFLIB_TIME_DIMENSION / 10;
    for &b in frac_part {
        if radix == 0 {
            break;
        }
        value += i64::from(b.wrapping_sub(b'0')) * radix;
        radix /= 10;
    }

    value
}

/// 解析TAL onset为100纳秒单位
///
/// The input must already satisfy [`is_onset_number`].
pub fn get_long_time(s: &str) -> i64 {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return 0;
    }
    let value = fixed_point_seconds(&bytes[1..]);
    if bytes[0] == b'-' {
        -value
    } else {
        value
    }
}

/// 解析数据记录持续时间（header field, padded with spaces）
///
/// Reads at most 8 characters and stops at the first space.
pub fn get_long_duration(s: &str) -> i64 {
    let bytes = s.as_bytes();
    let field = &bytes[..bytes.len().min(8)];
    let len = field.iter().position(|&b| b == b' ').unwrap_or(field.len());
    fixed_point_seconds(&field[..len])
}

/// 移除字符串前后的空格
pub fn trim_padding_spaces(s: &mut String) {
    let trimmed = s.trim_matches(' ').to_string();
    s.clear();
    s.push_str(&trimmed);
}

/// 非本地化的整数解析（避免受系统locale影响）
///
/// Skips leading spaces, takes an optional sign, then reads digits up to the
/// first non-digit. Never fails; garbage yields 0.
pub fn atoi_nonlocalized(s: &str) -> i32 {
    let bytes = s.as_bytes();
    let mut i = bytes.iter().take_while(|&&b| b == b' ').count();
    let mut negative = false;

    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        negative = bytes[i] == b'-';
        i += 1;
    }

    let mut value: i32 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add(i32::from(bytes[i] - b'0'));
        i += 1;
    }

    if negative {
        -value
    } else {
        value
    }
}

/// 非本地化的浮点数解析
///
/// Same leniency as [`atoi_nonlocalized`], plus a fraction and an optional
/// exponent.
pub fn atof_nonlocalized(s: &str) -> f64 {
    let bytes = s.as_bytes();
    let mut i = bytes.iter().take_while(|&&b| b == b' ').count();
    let mut sign = 1.0;

    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        if bytes[i] == b'-' {
            sign = -1.0;
        }
        i += 1;
    }

    let mut value = 0.0f64;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value * 10.0 + f64::from(bytes[i] - b'0');
        i += 1;
    }

    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let mut scale = 0.1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            value += f64::from(bytes[i] - b'0') * scale;
            scale /= 10.0;
            i += 1;
        }
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let exponent = atoi_nonlocalized(&s[i + 1..]);
        value *= 10f64.powi(exponent);
    }

    sign * value
}

/// Writes `q` as decimal into `dest` and returns the number of bytes written.
///
/// `minimum` is the minimum number of digits (zero padded, sign excluded).
/// With `sign` set a `+` is emitted for non-negative values. Output that does
/// not fit in `dest` is cut off; the return value counts only what was written.
pub fn sprint_ll_number_nonlocalized(dest: &mut [u8], q: i64, minimum: usize, sign: bool) -> usize {
    let mut scratch = [0u8; 24];
    let mut len = 0;

    if q < 0 {
        scratch[len] = b'-';
        len += 1;
    } else if sign {
        scratch[len] = b'+';
        len += 1;
    }

    let mut digits = [0u8; 20];
    let mut n = q.unsigned_abs();
    let mut count = 0;
    loop {
        digits[count] = b'0' + (n % 10) as u8;
        count += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }

    let padding = minimum.min(19).saturating_sub(count);
    for _ in 0..padding {
        scratch[len] = b'0';
        len += 1;
    }
    for &d in digits[..count].iter().rev() {
        scratch[len] = d;
        len += 1;
    }

    let written = len.min(dest.len());
    dest[..written].copy_from_slice(&scratch[..written]);
    written
}

/// `i32` flavor of [`sprint_ll_number_nonlocalized`].
pub fn sprint_int_number_nonlocalized(dest: &mut [u8], q: i32, minimum: usize, sign: bool) -> usize {
    sprint_ll_number_nonlocalized(dest, i64::from(q), minimum.min(10), sign)
}

/// Owned-string convenience over [`sprint_ll_number_nonlocalized`].
pub fn format_ll_number_nonlocalized(q: i64, minimum: usize, sign: bool) -> String {
    let mut buf = [0u8; 24];
    let len = sprint_ll_number_nonlocalized(&mut buf, q, minimum, sign);
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

/// Formats a real number with up to nine decimals, trailing zeros removed.
pub fn sprint_number_nonlocalized(nr: f64) -> String {
    let mut int_part = (nr.trunc() as i64).abs();
    let mut frac = ((nr - nr.trunc()) * 1_000_000_000.0).round().abs() as i64;
    if frac >= 1_000_000_000 {
        int_part += 1;
        frac = 0;
    }

    let mut out = String::new();
    if nr < 0.0 {
        out.push('-');
    }
    out.push_str(&format_ll_number_nonlocalized(int_part, 0, false));

    if frac == 0 {
        return out;
    }

    let digits = format_ll_number_nonlocalized(frac, 9, false);
    out.push('.');
    out.push_str(digits.trim_end_matches('0'));
    out
}

/// Renders a 100 ns time value as `+secs[.fraction]` seconds, fraction with
/// `decimals` zero padded digits of the given `unit`.
pub(crate) fn format_tal_time(value: i64, unit: i64, decimals: usize) -> String {
    let per_second = EDFLIB_TIME_DIMENSION / unit;
    let scaled = value / unit;
    let mut out = format_ll_number_nonlocalized(scaled / per_second, 0, true);
    let frac = scaled % per_second;
    if frac != 0 {
        out.push('.');
        out.push_str(&format_ll_number_nonlocalized(frac.abs(), decimals, false));
    }
    out
}
