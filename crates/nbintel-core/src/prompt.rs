//! Prompt routing.
//!
//! A raw prompt selects a participant with a leading `@id` token and a
//! command with a following `/name` token; the rest is the prompt text.
//! Routing is deliberately lenient: unknown participants fall back to the
//! default downstream, and nothing here is an error.

/// Participant id used when the prompt names none.
pub const DEFAULT_PARTICIPANT_ID: &str = "default";

/// The result of routing a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrompt {
    /// Participant id, `default` when not addressed.
    pub participant: String,
    /// Command name without the leading slash, empty when absent.
    pub command: String,
    /// Residual prompt text.
    pub input: String,
}

/// Parse a prompt into (participant, command, residual text).
pub fn parse_prompt(prompt: &str) -> ParsedPrompt {
    let mut participant = DEFAULT_PARTICIPANT_ID.to_string();
    let mut command = String::new();

    let prompt = prompt.trim_start();
    let mut parts: Vec<&str> = prompt.split(' ').filter(|p| !p.trim().is_empty()).collect();

    if let Some(first) = parts.first() {
        if let Some(id) = first.strip_prefix('@') {
            participant = id.to_string();
            parts.remove(0);
        }
    }

    if let Some(first) = parts.first() {
        if let Some(name) = first.strip_prefix('/') {
            command = name.to_string();
            parts.remove(0);
        }
    }

    ParsedPrompt {
        participant,
        command,
        input: parts.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_prompt() {
        let parsed = parse_prompt("explain this code");
        assert_eq!(parsed.participant, "default");
        assert_eq!(parsed.command, "");
        assert_eq!(parsed.input, "explain this code");
    }

    #[test]
    fn test_participant_and_command() {
        let parsed = parse_prompt("@test /repeat hello world");
        assert_eq!(parsed.participant, "test");
        assert_eq!(parsed.command, "repeat");
        assert_eq!(parsed.input, "hello world");
    }

    #[test]
    fn test_command_without_participant() {
        let parsed = parse_prompt("/newNotebook plot a sine wave");
        assert_eq!(parsed.participant, "default");
        assert_eq!(parsed.command, "newNotebook");
        assert_eq!(parsed.input, "plot a sine wave");
    }

    #[test]
    fn test_participant_only() {
        let parsed = parse_prompt("@mcp");
        assert_eq!(parsed.participant, "mcp");
        assert_eq!(parsed.command, "");
        assert_eq!(parsed.input, "");
    }

    #[test]
    fn test_leading_whitespace_and_empty_tokens() {
        let parsed = parse_prompt("   @test   /test   a   b ");
        assert_eq!(parsed.participant, "test");
        assert_eq!(parsed.command, "test");
        assert_eq!(parsed.input, "a b");
    }

    #[test]
    fn test_empty_prompt() {
        let parsed = parse_prompt("");
        assert_eq!(parsed.participant, "default");
        assert_eq!(parsed.command, "");
        assert_eq!(parsed.input, "");
    }

    #[test]
    fn test_residual_reparse_is_identity() {
        // Re-parsing a residual with no @/slash prefixes yields the same
        // residual unchanged.
        let prompts = [
            "@test /cmd what is the answer",
            "plot   a sine   wave",
            "@a hello",
        ];
        for prompt in prompts {
            let first = parse_prompt(prompt);
            let second = parse_prompt(&first.input);
            assert_eq!(second.input, first.input);
            assert_eq!(second.participant, "default");
            assert_eq!(second.command, "");
        }
    }

    #[test]
    fn test_at_in_middle_is_not_participant() {
        let parsed = parse_prompt("email @user about this");
        assert_eq!(parsed.participant, "default");
        assert_eq!(parsed.input, "email @user about this");
    }
}
