// Reserved chat commands, handled before anything reaches the assistant.

pub const HISTORY_CLEARED_MESSAGE: &str = "Conversation history cleared";
pub const CLEAR_FAILED_MESSAGE: &str =
    "Sorry, I couldn't clear the conversation history. Please try again.";

pub const HELP_MESSAGE: &str = "I can help with Google Drive, Google Docs and Linear.\n\
\n\
Try things like:\n\
- \"list my recent docs\"\n\
- \"create a doc called Sprint notes\"\n\
- \"what's in the Roadmap doc?\"\n\
- \"create a Linear issue for the login bug in the ENG team\"\n\
- \"move ENG-42 to In Progress\"\n\
\n\
Commands:\n\
- clear (or /clear, reset, /reset): forget our conversation\n\
- help (or /help): show this message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ClearHistory,
    Help,
}

/// Matches the whole trimmed message, ignoring case. "clear the doc" is not
/// a command.
pub fn parse_command(text: &str) -> Option<Command> {
    match text.trim().to_lowercase().as_str() {
        "/clear" | "clear" | "/reset" | "reset" => Some(Command::ClearHistory),
        "/help" | "help" => Some(Command::Help),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_words() {
        assert_eq!(parse_command("/clear"), Some(Command::ClearHistory));
        assert_eq!(parse_command("  RESET \n"), Some(Command::ClearHistory));
        assert_eq!(parse_command("Help"), Some(Command::Help));
        assert_eq!(parse_command("/HELP"), Some(Command::Help));
    }

    #[test]
    fn test_only_exact_text_matches() {
        assert_eq!(parse_command("clear the doc"), None);
        assert_eq!(parse_command("help me find a file"), None);
        assert_eq!(parse_command(""), None);
    }
}
