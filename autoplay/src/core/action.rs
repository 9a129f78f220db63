//! Action token extraction from free-form oracle replies.

/// Marker preceding the action in an oracle reply.
pub const ACTION_MARKER: &str = "ACTION:";

/// Extract the action token from an oracle reply.
///
/// Takes everything after the last `ACTION:` marker, trimmed. Without a
/// marker, falls back to the last non-empty line. Never fails; an empty reply
/// yields an empty action.
pub fn extract_action(reply: &str) -> String {
    if let Some((_, tail)) = reply.rsplit_once(ACTION_MARKER) {
        return tail.trim().to_string();
    }
    reply
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Whether `action` ends the session (`quit` or `exit`, any case).
pub fn is_quit_command(action: &str) -> bool {
    let action = action.trim();
    action.eq_ignore_ascii_case("quit") || action.eq_ignore_ascii_case("exit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_text_after_marker() {
        assert_eq!(extract_action("...blah...\nACTION: go north"), "go north");
    }

    #[test]
    fn uses_last_marker() {
        let reply = concat!(
            "ACTION IDEA: take lamp\n",
            "ACTION: open mailbox\n",
            "(Final Action)\n",
            "ACTION:  read leaflet \n",
        );
        assert_eq!(extract_action(reply), "read leaflet");
    }

    #[test]
    fn falls_back_to_last_non_empty_line() {
        assert_eq!(extract_action("thinking...\nopen door\n\n  \n"), "open door");
    }

    #[test]
    fn empty_reply_yields_empty_action() {
        assert_eq!(extract_action(""), "");
        assert_eq!(extract_action("\n \n"), "");
    }

    #[test]
    fn quit_is_case_insensitive() {
        for action in ["Quit", "EXIT", "exit", " quit "] {
            assert!(is_quit_command(action), "{action:?} should quit");
        }
        for action in ["quit now", "go exit", ""] {
            assert!(!is_quit_command(action), "{action:?} should not quit");
        }
    }
}
