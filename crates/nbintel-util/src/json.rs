//! Tolerant JSON parsing.
//!
//! Language models frequently emit tool arguments as slightly malformed
//! JSON: unquoted keys, single quotes, trailing commas, or a missing
//! closing brace when the stream was cut. `parse_tolerant` first tries
//! strict parsing and falls back to a repairing pass.

use serde_json::Value;

/// Parse a JSON document, repairing common model-generated defects.
pub fn parse_tolerant(input: &str) -> serde_json::Result<Value> {
    match serde_json::from_str(input) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(&repair(input)),
    }
}

/// Rewrite `input` into strict JSON where possible.
///
/// Handles: single-quoted strings, unquoted object keys and bare-word
/// values, trailing commas, and unterminated strings/containers at EOF.
fn repair(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut open: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let quote = c;
                out.push('"');
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        out.push('\\');
                        out.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if ch == quote {
                        break;
                    }
                    if ch == '"' {
                        out.push('\\');
                    }
                    out.push(ch);
                    i += 1;
                }
                out.push('"');
                i += 1;
            }
            '{' => {
                open.push('}');
                out.push(c);
                i += 1;
            }
            '[' => {
                open.push(']');
                out.push(c);
                i += 1;
            }
            '}' | ']' => {
                open.pop();
                out.push(c);
                i += 1;
            }
            ',' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                // trailing comma before a closer or EOF is dropped
                if j < chars.len() && chars[j] != '}' && chars[j] != ']' {
                    out.push(',');
                }
                i += 1;
            }
            ':' => {
                out.push(':');
                i += 1;
            }
            c if c.is_whitespace() => {
                out.push(c);
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                let literal = matches!(token.as_str(), "true" | "false" | "null")
                    || token.parse::<f64>().is_ok();
                if literal {
                    out.push_str(&token);
                } else {
                    out.push('"');
                    out.push_str(&token);
                    out.push('"');
                }
            }
        }
    }

    while let Some(closer) = open.pop() {
        out.push(closer);
    }
    out
}

fn is_delimiter(c: char) -> bool {
    matches!(c, ',' | ':' | '{' | '}' | '[' | ']' | '"' | '\'') || c.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_passthrough() {
        let value = parse_tolerant(r#"{"a": 1, "b": [true, null]}"#).unwrap();
        assert_eq!(value, json!({"a": 1, "b": [true, null]}));
    }

    #[test]
    fn test_unquoted_key_and_missing_brace() {
        let value = parse_tolerant("{temperature: 100").unwrap();
        assert_eq!(value, json!({"temperature": 100}));
    }

    #[test]
    fn test_trailing_comma() {
        let value = parse_tolerant(r#"{"a": 1,}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
        let value = parse_tolerant(r#"[1, 2, 3,]"#).unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_single_quotes() {
        let value = parse_tolerant("{'name': 'world'}").unwrap();
        assert_eq!(value, json!({"name": "world"}));
    }

    #[test]
    fn test_bare_word_value() {
        let value = parse_tolerant("{cell_type: markdown}").unwrap();
        assert_eq!(value, json!({"cell_type": "markdown"}));
    }

    #[test]
    fn test_unterminated_string() {
        let value = parse_tolerant(r#"{"path": "/tmp/a"#).unwrap();
        assert_eq!(value, json!({"path": "/tmp/a"}));
    }

    #[test]
    fn test_nested_missing_closers() {
        let value = parse_tolerant(r#"{"a": {"b": [1, 2"#).unwrap();
        assert_eq!(value, json!({"a": {"b": [1, 2]}}));
    }

    #[test]
    fn test_negative_and_float_numbers() {
        let value = parse_tolerant("{x: -3.5, y: 1e2}").unwrap();
        assert_eq!(value, json!({"x": -3.5, "y": 100.0}));
    }

    #[test]
    fn test_hopeless_input_is_error() {
        assert!(parse_tolerant("").is_err());
    }
}
