//! Splitting of method type strings into per-value tokens.
//!
//! The runtime only needs to know where one type ends and the next begins
//! (to count arguments and to copy individual types out). Full translation
//! into marshaling shapes is the caller's business.
//!
//! Recognised forms: primitives, qualifiers (`rnNoORV`), pointers (`^T`),
//! structs (`{...}`), unions (`(...)`), arrays (`[...]`), bit-fields (`bN`),
//! `@"ClassName"` and `@?` blocks. Stack offsets (`v24@0:8`) are skipped.

const QUALIFIERS: &[u8] = b"rnNoORV";

/// Returns the index just past the type starting at `start`, or `None` if
/// the string ends in the middle of a type.
pub(crate) fn skip_type(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i < bytes.len() && QUALIFIERS.contains(&bytes[i]) {
        i += 1;
    }

    match *bytes.get(i)? {
        b'^' => skip_type(bytes, i + 1),
        b'{' => skip_group(bytes, i, b'{', b'}'),
        b'(' => skip_group(bytes, i, b'(', b')'),
        b'[' => skip_group(bytes, i, b'[', b']'),
        b'b' => Some(skip_digits(bytes, i + 1)),
        b'@' => match bytes.get(i + 1) {
            Some(b'?') => Some(i + 2),
            Some(b'"') => {
                let close = bytes[i + 2..].iter().position(|&b| b == b'"')?;
                Some(i + 2 + close + 1)
            }
            _ => Some(i + 1),
        },
        _ => Some(i + 1),
    }
}

fn skip_group(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if b == b'"' {
            in_quote = !in_quote;
            continue;
        }
        if in_quote {
            continue;
        }
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(start + offset + 1);
            }
        }
    }
    None
}

fn skip_digits(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'-') {
        i += 1;
    }
    i
}

/// Splits a method type string into one token per value, return type first.
///
/// Offsets are dropped. Returns `None` for truncated strings.
pub(crate) fn split_types(types: &str) -> Option<Vec<&str>> {
    let bytes = types.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let end = skip_type(bytes, i)?;
        tokens.push(&types[i..end]);
        i = skip_digits(bytes, end);
    }
    Some(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        assert_eq!(split_types("v@:").unwrap(), vec!["v", "@", ":"]);
        assert_eq!(split_types("B@::").unwrap(), vec!["B", "@", ":", ":"]);
    }

    #[test]
    fn test_split_with_offsets() {
        assert_eq!(split_types("v24@0:8@16").unwrap(), vec!["v", "@", ":", "@"]);
    }

    #[test]
    fn test_split_compound() {
        let tokens = split_types("{CGPoint=dd}@:^{CGSize=dd}r*@\"NSString\"@?").unwrap();
        assert_eq!(
            tokens,
            vec!["{CGPoint=dd}", "@", ":", "^{CGSize=dd}", "r*", "@\"NSString\"", "@?"]
        );
    }

    #[test]
    fn test_split_nested_and_quoted() {
        let tokens = split_types("{Outer=\"a\"{Inner=ii}\"b\"[4c]}@:").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], "{Outer=\"a\"{Inner=ii}\"b\"[4c]}");
    }

    #[test]
    fn test_split_truncated() {
        assert!(split_types("{Broken=ii").is_none());
        assert!(split_types("v@:^").is_none());
    }
}
