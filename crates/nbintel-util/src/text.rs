//! Text helpers for model output.

/// Extract code from a model response that may be wrapped in markdown
/// code fences. Returns the content between the first fence pair, or the
/// input unchanged when no fences are present.
pub fn extract_generated_code(code: &str) -> String {
    let mut code = code.trim_end();
    if let Some(stripped) = code.strip_suffix("```") {
        code = stripped;
    }

    let lines: Vec<&str> = code.split('\n').collect();
    if lines.len() < 2 {
        return code.to_string();
    }

    let mut start_line = None;
    let mut end_line = lines.len();

    for (i, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with("```") {
            match start_line {
                None => start_line = Some(i),
                Some(_) => {
                    end_line = i;
                    break;
                }
            }
        }
    }

    match start_line {
        Some(start) => lines[start + 1..end_line].join("\n"),
        None => lines.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_code_unchanged() {
        assert_eq!(extract_generated_code("print('hi')"), "print('hi')");
    }

    #[test]
    fn test_fenced_code() {
        let input = "```python\nx = 1\ny = 2\n```";
        assert_eq!(extract_generated_code(input), "x = 1\ny = 2");
    }

    #[test]
    fn test_fence_with_prose_before() {
        let input = "Here you go:\n```python\nx = 1\n```\nEnjoy!";
        assert_eq!(extract_generated_code(input), "x = 1");
    }

    #[test]
    fn test_unterminated_fence() {
        let input = "```python\nx = 1\ny = 2";
        assert_eq!(extract_generated_code(input), "x = 1\ny = 2");
    }

    #[test]
    fn test_multiline_without_fences() {
        let input = "x = 1\ny = 2";
        assert_eq!(extract_generated_code(input), input);
    }
}
