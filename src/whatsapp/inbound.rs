// Inbound message routing: decides whether a chat message reaches the
// assistant, is answered as a command, or is dropped.

use super::cloud_api::MessageSender;
use super::commands::{
    parse_command, Command, CLEAR_FAILED_MESSAGE, HELP_MESSAGE, HISTORY_CLEARED_MESSAGE,
};
use crate::core::ai::Assistant;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// One text message as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sender_id: String,
    pub display_name: Option<String>,
    pub text: String,
    pub timestamp_ms: i64,
    pub is_from_self: bool,
    pub is_group_message: bool,
}

impl InboundMessage {
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

/// Why a message was not handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    FromSelf,
    GroupMessage,
    EmptyText,
    SenderNotAllowed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Ignored(IgnoreReason),
    Command { command: Command, delivered: bool },
    Answered { success: bool, delivered: bool },
}

/// Keeps only the digits of a phone number or chat id ("+1 555-0100",
/// "15550100@c.us" -> "15550100").
pub fn normalize_phone(value: &str) -> String {
    let number = value.split('@').next().unwrap_or(value);
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn looks_like_phone(entry: &str) -> bool {
    entry.chars().any(|c| c.is_ascii_digit())
        && entry
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
}

/// Allow set of senders. Entries that look like phone numbers match the
/// sender id by digits; anything else matches the display name ignoring case.
/// An empty set lets everyone through.
#[derive(Debug, Clone, Default)]
pub struct SenderAccess {
    numbers: HashSet<String>,
    names: HashSet<String>,
}

impl SenderAccess {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut access = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if looks_like_phone(entry) {
                access.numbers.insert(normalize_phone(entry));
            } else {
                access.names.insert(entry.to_lowercase());
            }
        }
        access
    }

    pub fn allows_everyone(&self) -> bool {
        self.numbers.is_empty() && self.names.is_empty()
    }

    pub fn allows(&self, sender_id: &str, display_name: Option<&str>) -> bool {
        if self.allows_everyone() {
            return true;
        }
        let number = normalize_phone(sender_id);
        if !number.is_empty() && self.numbers.contains(&number) {
            return true;
        }
        display_name
            .map(|name| self.names.contains(&name.trim().to_lowercase()))
            .unwrap_or(false)
    }
}

/// Forwards allowed, non-command messages to the assistant and sends the
/// reply back to the sender.
pub struct MessageRouter {
    assistant: Arc<dyn Assistant>,
    sender: Arc<dyn MessageSender>,
    access: SenderAccess,
    allow_group_messages: bool,
}

impl MessageRouter {
    pub fn new(
        assistant: Arc<dyn Assistant>,
        sender: Arc<dyn MessageSender>,
        access: SenderAccess,
        allow_group_messages: bool,
    ) -> Self {
        Self {
            assistant,
            sender,
            access,
            allow_group_messages,
        }
    }

    fn ignore_reason(&self, message: &InboundMessage) -> Option<IgnoreReason> {
        if message.is_from_self {
            Some(IgnoreReason::FromSelf)
        } else if message.is_group_message && !self.allow_group_messages {
            Some(IgnoreReason::GroupMessage)
        } else if message.text.trim().is_empty() {
            Some(IgnoreReason::EmptyText)
        } else if !self
            .access
            .allows(&message.sender_id, message.display_name.as_deref())
        {
            Some(IgnoreReason::SenderNotAllowed)
        } else {
            None
        }
    }

    pub async fn on_inbound_message(&self, message: InboundMessage) -> RouteOutcome {
        if let Some(reason) = self.ignore_reason(&message) {
            tracing::debug!(
                sender = %message.sender_id,
                reason = ?reason,
                "Ignoring inbound message"
            );
            return RouteOutcome::Ignored(reason);
        }

        let user_id = message.sender_id.as_str();

        if let Some(command) = parse_command(&message.text) {
            let reply = match command {
                Command::ClearHistory => match self.assistant.clear_history(user_id).await {
                    Ok(()) => {
                        tracing::info!(user_id, "Cleared conversation history");
                        HISTORY_CLEARED_MESSAGE
                    }
                    Err(e) => {
                        tracing::error!(user_id, error = %e, "Failed to clear history");
                        CLEAR_FAILED_MESSAGE
                    }
                },
                Command::Help => HELP_MESSAGE,
            };
            let delivered = self.reply(user_id, reply).await;
            return RouteOutcome::Command { command, delivered };
        }

        tracing::info!(
            user_id,
            received_at = ?message.received_at(),
            "Processing message"
        );
        let outcome = self.assistant.process_turn(user_id, &message.text).await;
        let delivered = self.reply(user_id, &outcome.message).await;

        RouteOutcome::Answered {
            success: outcome.success,
            delivered,
        }
    }

    async fn reply(&self, to: &str, text: &str) -> bool {
        match self.sender.send_text(to, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(to, error = %e, "Failed to send WhatsApp reply");
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{EchoAssistant, RecordingSender};
    use super::*;

    fn message(sender: &str, text: &str) -> InboundMessage {
        InboundMessage {
            sender_id: sender.to_string(),
            display_name: Some("Ana Silva".to_string()),
            text: text.to_string(),
            timestamp_ms: 1_700_000_000_000,
            is_from_self: false,
            is_group_message: false,
        }
    }

    fn router(
        access: SenderAccess,
        allow_groups: bool,
    ) -> (MessageRouter, Arc<EchoAssistant>, Arc<RecordingSender>) {
        let assistant = Arc::new(EchoAssistant::default());
        let sender = Arc::new(RecordingSender::default());
        let router = MessageRouter::new(assistant.clone(), sender.clone(), access, allow_groups);
        (router, assistant, sender)
    }

    #[test]
    fn test_sender_access() {
        let access = SenderAccess::new(["+1 (555) 010-0200", "Ana Silva", " "]);
        assert!(access.allows("15550100200", None));
        assert!(access.allows("15550100200@c.us", None));
        assert!(access.allows("4477", Some("  ana silva ")));
        assert!(!access.allows("4477", Some("Bob")));
        assert!(!access.allows("4477", None));

        assert!(SenderAccess::new(Vec::<String>::new()).allows("anyone", None));
    }

    #[test]
    fn test_received_at() {
        let msg = message("1", "hi");
        assert_eq!(msg.received_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_message_is_forwarded_and_answered() {
        let (router, assistant, sender) = router(SenderAccess::default(), false);

        let outcome = router.on_inbound_message(message("1555", "list my docs")).await;

        assert_eq!(
            outcome,
            RouteOutcome::Answered {
                success: true,
                delivered: true
            }
        );
        assert_eq!(
            assistant.turns.lock().unwrap().clone(),
            vec![("1555".to_string(), "list my docs".to_string())]
        );
        assert_eq!(
            sender.sent(),
            vec![("1555".to_string(), "echo: list my docs".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dropped_messages_never_reach_the_assistant() {
        let (router, assistant, sender) = router(SenderAccess::new(["1555"]), false);

        let mut from_self = message("1555", "hi");
        from_self.is_from_self = true;
        let mut group = message("1555", "hi");
        group.is_group_message = true;

        let cases = [
            (from_self, IgnoreReason::FromSelf),
            (group, IgnoreReason::GroupMessage),
            (message("1555", "   "), IgnoreReason::EmptyText),
            (message("9999", "hi"), IgnoreReason::SenderNotAllowed),
        ];
        for (msg, reason) in cases {
            assert_eq!(
                router.on_inbound_message(msg).await,
                RouteOutcome::Ignored(reason)
            );
        }

        assert!(assistant.turns.lock().unwrap().is_empty());
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_group_messages_when_allowed() {
        let (router, assistant, _) = router(SenderAccess::default(), true);
        let mut group = message("1555", "hi team");
        group.is_group_message = true;

        let outcome = router.on_inbound_message(group).await;

        assert!(matches!(outcome, RouteOutcome::Answered { success: true, .. }));
        assert_eq!(assistant.turns.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_command() {
        let (router, assistant, sender) = router(SenderAccess::default(), false);

        let outcome = router.on_inbound_message(message("1555", " /Clear ")).await;

        assert_eq!(
            outcome,
            RouteOutcome::Command {
                command: Command::ClearHistory,
                delivered: true
            }
        );
        assert_eq!(assistant.cleared.lock().unwrap().clone(), vec!["1555"]);
        assert!(assistant.turns.lock().unwrap().is_empty());
        assert_eq!(sender.sent()[0].1, HISTORY_CLEARED_MESSAGE);
    }

    #[tokio::test]
    async fn test_help_command() {
        let (router, assistant, sender) = router(SenderAccess::default(), false);

        router.on_inbound_message(message("1555", "HELP")).await;

        assert!(assistant.turns.lock().unwrap().is_empty());
        assert_eq!(sender.sent()[0].1, HELP_MESSAGE);
    }

    #[tokio::test]
    async fn test_send_failure_is_reported_not_raised() {
        let assistant = Arc::new(EchoAssistant::default());
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let router = MessageRouter::new(assistant, sender, SenderAccess::default(), false);

        let outcome = router.on_inbound_message(message("1555", "hello")).await;

        assert_eq!(
            outcome,
            RouteOutcome::Answered {
                success: true,
                delivered: false
            }
        );
    }
}
