//! Line parser (§4.3): splits one logical source line into
//! `(label, operator, operands)`, honoring `*`/`;` comments and quoted
//! strings (so a `;` inside a string literal, e.g. `#';'`, is not mistaken
//! for a comment).

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedLine<'a> {
    pub label: &'a str,
    pub operator: &'a str,
    pub operands: &'a str,
    /// True if the whole line is a comment (column 0 is `*` or `;`).
    pub is_comment: bool,
}

/// Parses one already-stripped-of-newline source line.
pub fn parse_line(line: &str) -> ParsedLine<'_> {
    if line.is_empty() {
        return ParsedLine::default();
    }

    let first = line.as_bytes()[0];
    if first == b'*' || first == b';' {
        return ParsedLine { is_comment: true, ..Default::default() };
    }

    let has_label = !(first == b' ' || first == b'\t');

    let mut rest = line;
    let label = if has_label {
        let (lbl, after) = split_whitespace_run(rest);
        rest = after;
        lbl
    } else {
        ""
    };

    rest = skip_whitespace(rest);
    let (operator, after_op) = split_whitespace_run(rest);
    rest = skip_whitespace(after_op);

    let operands = take_operands(rest);

    ParsedLine { label, operator, operands, is_comment: false }
}

/// Splits off the leading run of non-whitespace bytes, returning
/// `(run, remainder)`.
fn split_whitespace_run(s: &str) -> (&str, &str) {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] != b' ' && bytes[i] != b'\t' {
        i += 1;
    }
    (&s[..i], &s[i..])
}

fn skip_whitespace(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    &s[i..]
}

/// Operands run until end-of-line, or an unquoted `;` that is preceded
/// by whitespace. `'` and `"` both open/close a one-character-delimited
/// quoted run for the purposes of this scan (the expression evaluator's
/// own `'c`/`"c` literal syntax means a closing quote is optional, but
/// when present it must not be mistaken for the start of a new quoted
/// region).
fn take_operands(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut in_quote: Option<u8> = None;
    let mut prev_was_space = true;
    while i < bytes.len() {
        let b = bytes[i];
        match in_quote {
            Some(q) => {
                if b == q {
                    in_quote = None;
                }
                prev_was_space = false;
            }
            None => {
                if b == b';' && prev_was_space {
                    break;
                }
                if b == b'\'' || b == b'"' {
                    in_quote = Some(b);
                }
                prev_was_space = b == b' ' || b == b'\t';
            }
        }
        i += 1;
    }
    s[..i].trim_end_matches([' ', '\t'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_lines() {
        assert!(parse_line("* a full line comment").is_comment);
        assert!(parse_line("; also a comment").is_comment);
    }

    #[test]
    fn no_label_when_indented() {
        let p = parse_line(" lda #$60");
        assert_eq!(p.label, "");
        assert_eq!(p.operator, "lda");
        assert_eq!(p.operands, "#$60");
    }

    #[test]
    fn label_operator_operands() {
        let p = parse_line("entry lda #$60");
        assert_eq!(p.label, "entry");
        assert_eq!(p.operator, "lda");
        assert_eq!(p.operands, "#$60");
    }

    #[test]
    fn trailing_comment_after_whitespace() {
        let p = parse_line(" sta $fb ; store it");
        assert_eq!(p.operator, "sta");
        assert_eq!(p.operands, "$fb");
    }

    #[test]
    fn quoted_semicolon_is_an_operand_char() {
        let p = parse_line(" lda #';'");
        assert_eq!(p.operator, "lda");
        assert_eq!(p.operands, "#';'");
    }

    #[test]
    fn empty_line() {
        let p = parse_line("");
        assert_eq!(p.label, "");
        assert_eq!(p.operator, "");
        assert_eq!(p.operands, "");
        assert!(!p.is_comment);
    }
}
