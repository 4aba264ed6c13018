use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(Error::InvalidRole(other.to_string())),
        }
    }
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    /// Build a message from a role name, rejecting anything other than
    /// `system`, `user` or `assistant`.
    pub fn new(role: &str, content: impl Into<String>) -> crate::Result<Self> {
        Ok(Self {
            role: role.parse()?,
            content: content.into(),
        })
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: text.into() }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into() }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into() }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Content of the most recent user message, if any.
pub fn last_user_content(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_known_roles() {
        let user = Message::new("user", "Bonjour").unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "Bonjour");

        let system = Message::new("system", "Instructions").unwrap();
        assert_eq!(system.role, Role::System);

        let assistant = Message::new("assistant", "Je peux vous aider").unwrap();
        assert_eq!(assistant.role, Role::Assistant);
    }

    #[test]
    fn new_rejects_unknown_role() {
        let err = Message::new("invalid_role", "Contenu").unwrap_err();
        assert!(matches!(err, Error::InvalidRole(ref r) if r == "invalid_role"));
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }

    #[test]
    fn last_user_content_skips_assistant_replies() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
            Message::assistant("reply 2"),
        ];
        assert_eq!(last_user_content(&msgs), Some("second"));
        assert_eq!(last_user_content(&[Message::system("only")]), None);
    }
}
