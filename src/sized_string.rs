//! Thin helpers over `&str` that stand in for the original C source's
//! `SizedString` — a non-owning `(ptr, len)` view into a source buffer.
//!
//! Rust slices already carry a length, so most of what `SizedString` did
//! in the original is just `&str`/`&[u8]` methods. What remains here is
//! the handful of operations `std` doesn't give us directly: ASCII
//! case-insensitive comparison used identically by the opcode-table
//! lookup and the addressing-mode classifier (§9 Open Questions calls
//! for a single shared compare), and the `strtoul`-style multi-base
//! integer parser used by the expression evaluator's literal tokens.

/// ASCII case-insensitive equality, shared by opcode lookup and operand
/// matching so the two paths can never diverge (see SPEC_FULL.md §9).
pub fn eq_ignore_ascii_case(a: &str, b: &str) -> bool {
    a.as_bytes().eq_ignore_ascii_case(b.as_bytes())
}

/// Splits `s` at the first occurrence of `delim`, excluding the
/// delimiter from either half. If `delim` is absent, returns `(s, "")`.
pub fn split_at(s: &str, delim: char) -> (&str, &str) {
    match s.find(delim) {
        Some(idx) => (&s[..idx], &s[idx + delim.len_utf8()..]),
        None => (s, ""),
    }
}

/// Result of [`strtoul`]: the parsed value together with how many bytes
/// of `s` were consumed by digits (and any recognized base prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrToUl {
    pub value: u32,
    pub consumed: usize,
}

/// A re-implementation of the C standard library's `strtoul`, restricted
/// to the behavior the expression evaluator relies on: base 0 means
/// "sniff `0x`/`0X` for hex, a leading `0` for octal, else decimal";
/// base 16/8/2/10/36 are otherwise accepted directly. Digits run up to
/// base 36 (`0-9`, `a-z`, `A-Z`). On accumulation overflow (the running
/// value would exceed `u32::MAX`), parsing stops and returns
/// `u32::MAX` with `consumed` set to the number of digit bytes actually
/// read before the overflowing digit (mirroring glibc's `ERANGE`
/// behavior of leaving the end pointer past the last *consumed* digit).
pub fn strtoul(s: &str, base: u32) -> StrToUl {
    let bytes = s.as_bytes();
    let mut idx = 0;
    let mut base = base;

    if base == 0 || base == 16 {
        if bytes.len() >= idx + 2 && bytes[idx] == b'0' && (bytes[idx + 1] | 0x20) == b'x' {
            idx += 2;
            base = 16;
        } else if base == 0 {
            if bytes.get(idx) == Some(&b'0') {
                base = 8;
            } else {
                base = 10;
            }
        }
    }

    let mut value: u32 = 0;
    let mut consumed = idx;
    while let Some(&b) = bytes.get(idx) {
        let digit = match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'a'..=b'z' => (b - b'a') as u32 + 10,
            b'A'..=b'Z' => (b - b'A') as u32 + 10,
            _ => break,
        };
        if digit >= base {
            break;
        }
        match value
            .checked_mul(base)
            .and_then(|v| v.checked_add(digit))
        {
            Some(next) => {
                value = next;
                idx += 1;
                consumed = idx;
            }
            None => {
                return StrToUl { value: u32::MAX, consumed };
            }
        }
    }

    StrToUl { value, consumed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_at_present_and_absent() {
        assert_eq!(split_at("foo,bar", ','), ("foo", "bar"));
        assert_eq!(split_at("foobar", ','), ("foobar", ""));
    }

    #[test]
    fn case_insensitive_eq() {
        assert!(eq_ignore_ascii_case("LDA", "lda"));
        assert!(!eq_ignore_ascii_case("LDA", "ldx"));
    }

    #[test]
    fn strtoul_hex_prefix_base0() {
        let r = strtoul("0xFFFFFFFF", 0);
        assert_eq!(r.value, 0xFFFF_FFFF);
        assert_eq!(r.consumed, 10);
    }

    #[test]
    fn strtoul_overflow_saturates() {
        let r = strtoul("12345678901234567890", 0);
        assert_eq!(r.value, u32::MAX);
    }

    #[test]
    fn strtoul_octal_prefix() {
        let r = strtoul("017", 0);
        assert_eq!(r.value, 0o17);
    }

    #[test]
    fn strtoul_decimal_no_prefix() {
        let r = strtoul("4095", 0);
        assert_eq!(r.value, 4095);
        assert_eq!(r.consumed, 4);
    }
}
