//! Conversation log shared by every model call in a session
//!
//! [`ChatContext`] is append-only: turns are never removed or edited once
//! appended, and ordinals increase strictly in append order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::functions::FunctionCall;
use crate::{Error, Result};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Function => "function",
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

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "function" => Ok(Self::Function),
            _ => Err(Error::InvalidRole(s.to_string())),
        }
    }
}

/// One logged utterance or action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    /// Position in the session log, starting at 1
    pub ordinal: u64,
    pub role: Role,
    pub text: String,
    /// For function turns: the call that produced this result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<FunctionCall>,
    pub created_at: DateTime<Utc>,
}

/// Ordered, append-only log of turns
#[derive(Debug, Default)]
pub struct ChatContext {
    turns: Vec<Arc<Turn>>,
}

impl ChatContext {
    /// Create an empty context
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Create a context seeded with a system prompt
    ///
    /// An empty prompt yields an empty context.
    #[must_use]
    pub fn with_system_prompt(prompt: &str) -> Self {
        let mut ctx = Self::new();
        if !prompt.trim().is_empty() {
            ctx.append(Role::System, prompt);
        }
        ctx
    }

    /// Append a turn and return it
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> Turn {
        self.push(role, text.into(), None)
    }

    /// Append a turn whose role is given by name
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRole` if `role` is not a recognized role
    pub fn append_named(&mut self, role: &str, text: impl Into<String>) -> Result<Turn> {
        let role = role.parse::<Role>()?;
        Ok(self.append(role, text))
    }

    /// Append the result of a function call
    pub fn append_function_result(&mut self, call: FunctionCall, text: impl Into<String>) -> Turn {
        self.push(Role::Function, text.into(), Some(call))
    }

    fn push(&mut self, role: Role, text: String, call: Option<FunctionCall>) -> Turn {
        let ordinal = self.turns.last().map_or(1, |t| t.ordinal + 1);
        let turn = Turn {
            ordinal,
            role,
            text,
            call,
            created_at: Utc::now(),
        };
        tracing::trace!(ordinal, role = %role, "turn appended");
        self.turns.push(Arc::new(turn.clone()));
        turn
    }

    /// Stable copy of the log for handing to the model
    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            turns: self.turns.clone().into(),
        }
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last().map(AsRef::as_ref)
    }
}

/// Immutable view of a [`ChatContext`] at one point in time
///
/// Cheap to clone; later appends to the context are not visible.
#[derive(Debug, Clone, Default)]
pub struct ChatSnapshot {
    turns: Arc<[Arc<Turn>]>,
}

impl ChatSnapshot {
    /// Iterate turns in append order
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().map(AsRef::as_ref)
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the snapshot is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last().map(AsRef::as_ref)
    }

    /// Most recent turn with the given role
    #[must_use]
    pub fn last_with_role(&self, role: Role) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .map(AsRef::as_ref)
            .find(|t| t.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_increase_in_append_order() {
        let mut ctx = ChatContext::new();
        ctx.append(Role::System, "be brief");
        ctx.append(Role::User, "hi");
        ctx.append(Role::Assistant, "hello");

        let snap = ctx.snapshot();
        let ordinals: Vec<u64> = snap.iter().map(|t| t.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        let roles: Vec<Role> = snap.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn snapshot_is_stable_across_appends() {
        let mut ctx = ChatContext::new();
        ctx.append(Role::User, "one");
        let before = ctx.snapshot();
        ctx.append(Role::User, "two");

        assert_eq!(before.len(), 1);
        assert_eq!(ctx.snapshot().len(), 2);
    }

    #[test]
    fn repeated_snapshots_match() {
        let mut ctx = ChatContext::new();
        ctx.append(Role::User, "a");
        ctx.append(Role::Assistant, "b");

        let a: Vec<Turn> = ctx.snapshot().iter().cloned().collect();
        let b: Vec<Turn> = ctx.snapshot().iter().cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn append_named_rejects_unknown_role() {
        let mut ctx = ChatContext::new();
        let err = ctx.append_named("narrator", "once upon a time").unwrap_err();
        assert!(matches!(err, Error::InvalidRole(ref r) if r == "narrator"));
        assert!(ctx.is_empty());

        let turn = ctx.append_named("Assistant", "ok").unwrap();
        assert_eq!(turn.role, Role::Assistant);
    }

    #[test]
    fn empty_system_prompt_is_skipped() {
        assert!(ChatContext::with_system_prompt("  ").is_empty());
        assert_eq!(ChatContext::with_system_prompt("be nice").len(), 1);
    }
}
