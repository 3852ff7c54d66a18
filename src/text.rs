//! Latin-1 folding for header text and Latin-1 to UTF-8 expansion for
//! annotation text.

/// Folds one Latin-1 (Windows-1252 in the 0x80-0x9F block) byte to a
/// printable 7-bit character. Unmapped codes become a space.
fn fold_latin1(b: u8) -> u8 {
    match b {
        32..=126 => b,
        128 | 140 | 198 | 200..=203 => b'E',
        130 => b',',
        131 => b'F',
        132 | 147 | 148 => b'"',
        133 | 149 => b'.',
        134 | 135 => b'+',
        136 => b'^',
        137 => b'm',
        138 => b'S',
        139 | 171 => b'<',
        142 => b'Z',
        145 => b'`',
        146 | 180 => b'\'',
        150 | 151 | 247 => b'-',
        152 => b'~',
        154 | 223 => b's',
        155 | 187 => b'>',
        156 | 230 | 232..=235 => b'e',
        158 => b'z',
        159 | 221 => b'Y',
        181 | 249..=252 => b'u',
        191 => b'?',
        192..=197 => b'A',
        199 => b'C',
        204..=207 | 222 => b'I',
        208 => b'D',
        209 => b'N',
        210..=214 | 216 => b'O',
        215 => b'x',
        217..=220 => b'U',
        224..=229 => b'a',
        231 => b'c',
        236..=239 => b'i',
        240 => b'd',
        241 => b'n',
        242..=246 => b'o',
        248 => b'0',
        253 | 255 => b'y',
        254 => b't',
        _ => b' ',
    }
}

/// In-place Latin-1 to ASCII folding.
pub fn latin1_to_ascii(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = fold_latin1(*b);
    }
}

/// Folds a Rust string into header-safe ASCII bytes.
///
/// Code points in the Latin-1 range go through the folding table, anything
/// beyond it becomes a space.
pub fn str_to_ascii(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match u8::try_from(u32::from(c)) {
            Ok(b) => fold_latin1(b),
            Err(_) => b' ',
        })
        .collect()
}

/// Expands Latin-1 text into UTF-8 without growing past the input length.
///
/// Bytes below 0x20 and in 0x7F..=0x9F become `.`; bytes from 0xA0 up take
/// two UTF-8 bytes, or a space when only one byte of room is left. A zero
/// byte terminates the text.
pub fn latin1_to_utf8(latin: &[u8]) -> Vec<u8> {
    let len = latin.len();
    let mut out = Vec::with_capacity(len);

    for &b in latin {
        if b == 0 || out.len() >= len {
            break;
        }
        match b {
            0..=31 | 127..=159 => out.push(b'.'),
            160..=255 => {
                if len - out.len() < 2 {
                    out.push(b' ');
                } else {
                    out.push(0xC0 | (b >> 6));
                    out.push(0x80 | (b & 0x3F));
                }
            }
            _ => out.push(b),
        }
    }

    out
}
