//! Append-only conversation log.

use crate::types::Message;

/// Ordered sequence of messages, append-only for the duration of a run.
///
/// Single-writer discipline: the turn processor appends on behalf of the
/// loop; anything else (renderers, loggers) only reads a snapshot. Messages
/// are never reordered or truncated mid-run.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation with an optional system prompt.
    pub fn with_system_prompt(prompt: Option<&str>) -> Self {
        let mut conversation = Self::new();
        if let Some(prompt) = prompt {
            conversation.push(Message::system(prompt));
        }
        conversation
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Owned snapshot for a gateway request.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_lands_first() {
        let conversation = Conversation::with_system_prompt(Some("be terse"));
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].content, "be terse");
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hello"));
        let snapshot = conversation.snapshot();
        conversation.push(Message::assistant("hi"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(conversation.len(), 2);
    }
}
