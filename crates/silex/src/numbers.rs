//! Numeric literal parsing and number-to-string conversion.
//!
//! The scanner delegates here for every numeric literal: decimal (with
//! fraction and exponent), `0x`/`0o`/`0b` radix prefixes, legacy octal, and
//! underscore separators between digits. Rendering goes the other way for
//! the dumper and for materializing tagged integer atoms.

use crate::strings::JsString;

/// Options accepted by [`parse_number_literal`].
#[derive(Debug, Clone, Copy)]
pub struct NumberFlags {
    /// Accept `0123` as octal (Annex B). The scanner disables this in
    /// strict mode by rejecting the literal before parsing it.
    pub legacy_octal: bool,
    /// Accept `_` separators between digits of the same radix.
    pub underscores: bool,
}

impl Default for NumberFlags {
    fn default() -> Self {
        Self { legacy_octal: true, underscores: true }
    }
}

/// Parses a numeric literal starting at `pos`.
///
/// On success returns the value and the position of the first byte after the
/// literal. Returns `None` when the literal is malformed (e.g. `0x` with no
/// digits). The caller is responsible for rejecting an identifier character
/// immediately after the literal.
#[must_use]
pub fn parse_number_literal(buf: &[u8], pos: usize, flags: NumberFlags) -> Option<(f64, usize)> {
    let mut p = pos;
    let b = |i: usize| buf.get(i).copied().unwrap_or(0);

    if b(p) == b'0' {
        let radix = match b(p + 1) {
            b'x' | b'X' => Some(16u32),
            b'o' | b'O' => Some(8),
            b'b' | b'B' => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            return parse_radix_digits(buf, p + 2, radix, flags.underscores).map(|(v, next)| (v, next));
        }
        if flags.legacy_octal && b(p + 1).is_ascii_digit() {
            // Annex B: all-octal digits parse as octal; an 8 or 9 anywhere
            // makes the whole run decimal again.
            let mut q = p + 1;
            let mut all_octal = true;
            while b(q).is_ascii_digit() {
                if b(q) >= b'8' {
                    all_octal = false;
                }
                q += 1;
            }
            // a fraction or exponent forces the decimal interpretation
            if all_octal && b(q) != b'.' && b(q) != b'e' && b(q) != b'E' {
                let mut v = 0f64;
                let mut r = p + 1;
                while b(r).is_ascii_digit() {
                    v = v * 8.0 + f64::from(b(r) - b'0');
                    r += 1;
                }
                return Some((v, q));
            }
            // fall through to the decimal scan below
        }
    }

    // decimal: [digits] [ '.' digits ] [ (e|E) [+|-] digits ]
    let mut text = String::new();
    let mut seen_digit = false;
    if b(p) == b'.' && !b(p + 1).is_ascii_digit() {
        return None;
    }
    while b(p).is_ascii_digit() {
        text.push(b(p) as char);
        seen_digit = true;
        p += 1;
        if flags.underscores && b(p) == b'_' && b(p + 1).is_ascii_digit() {
            p += 1;
        }
    }
    if b(p) == b'.' {
        text.push('.');
        p += 1;
        if !b(p).is_ascii_digit() {
            // "1." is valid, ". " is not
            if !seen_digit {
                return None;
            }
            text.push('0');
        }
        while b(p).is_ascii_digit() {
            text.push(b(p) as char);
            seen_digit = true;
            p += 1;
            if flags.underscores && b(p) == b'_' && b(p + 1).is_ascii_digit() {
                p += 1;
            }
        }
    }
    if !seen_digit {
        return None;
    }
    if b(p) == b'e' || b(p) == b'E' {
        let mut q = p + 1;
        let mut exp = String::from("e");
        if b(q) == b'+' || b(q) == b'-' {
            exp.push(b(q) as char);
            q += 1;
        }
        if b(q).is_ascii_digit() {
            while b(q).is_ascii_digit() {
                exp.push(b(q) as char);
                q += 1;
                if flags.underscores && b(q) == b'_' && b(q + 1).is_ascii_digit() {
                    q += 1;
                }
            }
            text.push_str(&exp);
            p = q;
        }
        // a bare 'e' with no digits is left for the caller, which rejects
        // an identifier character following a number
    }
    let v: f64 = text.parse().ok()?;
    Some((v, p))
}

/// Parses digits of an explicit radix (16, 8 or 2) after the prefix.
fn parse_radix_digits(buf: &[u8], pos: usize, radix: u32, underscores: bool) -> Option<(f64, usize)> {
    let mut p = pos;
    let mut v = 0f64;
    let mut seen = false;
    loop {
        let Some(d) = buf.get(p).copied().and_then(|c| (c as char).to_digit(radix)) else {
            break;
        };
        v = v * f64::from(radix) + f64::from(d);
        seen = true;
        p += 1;
        if underscores
            && buf.get(p) == Some(&b'_')
            && buf.get(p + 1).copied().is_some_and(|c| (c as char).to_digit(radix).is_some())
        {
            p += 1;
        }
    }
    if seen { Some((v, p)) } else { None }
}

/// Renders a number the way `Number.prototype.toString` does in the common
/// cases: integer fast path, `NaN`/`Infinity`, negative zero folded to `0`,
/// shortest-round-trip fractions via `ryu`.
#[must_use]
pub fn number_to_string(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_owned();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() };
    }
    if v == 0.0 {
        return "0".to_owned();
    }
    // integer fast path: i64-representable whole numbers print without
    // fraction or exponent
    if v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 {
        return format!("{}", v as i64);
    }
    let mut buf = ryu::Buffer::new();
    let s = buf.format(v);
    s.strip_suffix(".0").unwrap_or(s).to_owned()
}

/// Returns `n` when the string is the canonical decimal form of an unsigned
/// 32-bit integer (no leading zeros, no sign, at most ten digits).
///
/// This is the test that decides whether an interned string can use the
/// tagged integer atom representation.
#[must_use]
pub fn canonical_u32(s: &JsString) -> Option<u32> {
    let len = s.len();
    if len == 0 || len > 10 {
        return None;
    }
    let first = s.code_unit(0);
    if !(0x30..=0x39).contains(&first) {
        return None;
    }
    if first == 0x30 {
        return if len == 1 { Some(0) } else { None };
    }
    let mut n: u64 = u64::from(first - 0x30);
    for i in 1..len {
        let c = s.code_unit(i);
        if !(0x30..=0x39).contains(&c) {
            return None;
        }
        n = n * 10 + u64::from(c - 0x30);
        if n > u64::from(u32::MAX) {
            return None;
        }
    }
    Some(n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Option<(f64, usize)> {
        parse_number_literal(src.as_bytes(), 0, NumberFlags::default())
    }

    #[test]
    fn decimal_forms() {
        assert_eq!(parse("123"), Some((123.0, 3)));
        assert_eq!(parse("1.5"), Some((1.5, 3)));
        assert_eq!(parse(".25"), Some((0.25, 3)));
        assert_eq!(parse("1."), Some((1.0, 2)));
        assert_eq!(parse("1e3"), Some((1000.0, 3)));
        assert_eq!(parse("2E-2"), Some((0.02, 4)));
    }

    #[test]
    fn radix_prefixes() {
        assert_eq!(parse("0xff"), Some((255.0, 4)));
        assert_eq!(parse("0o17"), Some((15.0, 4)));
        assert_eq!(parse("0b101"), Some((5.0, 5)));
        assert_eq!(parse("0x"), None);
    }

    #[test]
    fn legacy_octal() {
        assert_eq!(parse("0755"), Some((493.0, 4)));
        // an 8 makes the run decimal (Annex B)
        assert_eq!(parse("089"), Some((89.0, 3)));
    }

    #[test]
    fn underscore_separators() {
        assert_eq!(parse("1_000"), Some((1000.0, 5)));
        assert_eq!(parse("0xff_ff"), Some((65535.0, 7)));
        // trailing underscore is not consumed; the scanner then rejects the
        // identifier character that follows the literal
        assert_eq!(parse("1_"), Some((1.0, 1)));
    }

    #[test]
    fn rendering() {
        assert_eq!(number_to_string(0.0), "0");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-42.0), "-42");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
    }

    #[test]
    fn canonical_u32_detection() {
        assert_eq!(canonical_u32(&JsString::from_utf8("0")), Some(0));
        assert_eq!(canonical_u32(&JsString::from_utf8("42")), Some(42));
        assert_eq!(canonical_u32(&JsString::from_utf8("4294967295")), Some(u32::MAX));
        assert_eq!(canonical_u32(&JsString::from_utf8("4294967296")), None);
        assert_eq!(canonical_u32(&JsString::from_utf8("042")), None);
        assert_eq!(canonical_u32(&JsString::from_utf8("-1")), None);
        assert_eq!(canonical_u32(&JsString::from_utf8("")), None);
    }
}
