use serde::Serialize;

/// One turn in the chat-completion request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: String) -> Self {
        Self {
            role: "system".to_string(),
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

/// The exact exchange sent to the completion service: one system instruction
/// carrying persona, retrieved context and safety guidelines, and one user
/// turn carrying the sanitized query. No conversation history is kept, so
/// every request is stateless with respect to prior turns.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system_instruction: String,
    pub user_turn: String,
}

impl Prompt {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_instruction),
            ChatMessage::user(self.user_turn),
        ]
    }
}
