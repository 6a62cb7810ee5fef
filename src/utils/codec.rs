//! Frames a single command line into tokens.
//!
//! Whitespace separates tokens except inside paired ASCII double quotes,
//! which are preserved as one token; a token that begins with `[` or `{` is
//! treated as a single JSON blob running to the end of the line.

/// Splits one command line into its tokens per the wire codec's rule.
pub fn tokenize(line: &str) -> Vec<String> {
    let line = line.trim();
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        if chars[i] == '"' {
            let mut j = i + 1;
            while j < chars.len() && chars[j] != '"' {
                j += 1;
            }
            tokens.push(chars[i + 1..j].iter().collect());
            i = if j < chars.len() { j + 1 } else { j };
        } else if chars[i] == '[' || chars[i] == '{' {
            tokens.push(chars[i..].iter().collect());
            break;
        } else {
            let mut j = i;
            while j < chars.len() && !chars[j].is_whitespace() {
                j += 1;
            }
            tokens.push(chars[i..j].iter().collect());
            i = j;
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_whitespace_separated_tokens() {
        assert_eq!(
            tokenize("find_successor 123"),
            vec!["find_successor", "123"]
        );
    }

    #[test]
    fn keeps_quoted_token_together() {
        assert_eq!(
            tokenize(r#"insert "hello world" v1"#),
            vec!["insert", "hello world", "v1"]
        );
    }

    #[test]
    fn treats_json_array_as_single_trailing_token() {
        let line = r#"increment_hop ["a", "b", "c"]"#;
        let tokens = tokenize(line);
        assert_eq!(tokens[0], "increment_hop");
        assert_eq!(tokens[1], r#"["a", "b", "c"]"#);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn treats_json_object_as_single_trailing_token() {
        let line = r#"receive_keys {"k": {"value": "v", "hop": 1}}"#;
        let tokens = tokenize(line);
        assert_eq!(tokens[0], "receive_keys");
        assert_eq!(tokens[1], r#"{"k": {"value": "v", "hop": 1}}"#);
    }

    #[test]
    fn ignores_surrounding_whitespace_and_collapses_runs() {
        assert_eq!(tokenize("  query   \"alpha\"  "), vec!["query", "alpha"]);
    }

    #[test]
    fn empty_line_yields_no_tokens() {
        assert!(tokenize("   ").is_empty());
    }
}
