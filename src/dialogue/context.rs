//! Per-session conversation context
//!
//! A bounded FIFO of dialogue turns. Every turn is tagged with the order it
//! belongs to, so reasoner prompts can be scoped to the currently-active
//! order instead of the whole session history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use uuid::Uuid;

use super::intent::IntentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Order the turn belongs to; None for turns before the first order
    pub order_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct ConversationContext {
    pub session_id: Uuid,
    history: VecDeque<ChatTurn>,
    max_history: usize,
    pub last_intent: Option<IntentKind>,
    pub user_preferences: FxHashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(session_id: Uuid, max_history: usize) -> Self {
        Self {
            session_id,
            history: VecDeque::new(),
            max_history,
            last_intent: None,
            user_preferences: FxHashMap::default(),
            created_at: crate::now_micros(),
        }
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>, order_id: Option<Uuid>) {
        self.history.push_back(ChatTurn {
            role,
            content: content.into(),
            timestamp: crate::now_micros(),
            order_id,
        });
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Most recent `count` turns regardless of order tag
    pub fn recent(&self, count: usize) -> Vec<&ChatTurn> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).collect()
    }

    /// Most recent `count` turns of one order's conversation
    pub fn by_order(&self, order_id: Uuid, count: usize) -> Vec<&ChatTurn> {
        let turns: Vec<&ChatTurn> = self
            .history
            .iter()
            .filter(|t| t.order_id == Some(order_id))
            .collect();
        let skip = turns.len().saturating_sub(count);
        turns.into_iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_capped() {
        let mut ctx = ConversationContext::new(Uuid::new_v4(), 3);
        for i in 0..5 {
            ctx.add_message(Role::User, format!("msg {}", i), None);
        }
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx.recent(3)[0].content, "msg 2");
    }

    #[test]
    fn test_by_order_filters_tags() {
        let mut ctx = ConversationContext::new(Uuid::new_v4(), 20);
        let order_a = Uuid::new_v4();
        let order_b = Uuid::new_v4();
        ctx.add_message(Role::User, "빅맥 주세요", Some(order_a));
        ctx.add_message(Role::Assistant, "추가했습니다", Some(order_a));
        ctx.add_message(Role::User, "콜라 주세요", Some(order_b));

        let a_turns = ctx.by_order(order_a, 10);
        assert_eq!(a_turns.len(), 2);
        assert!(a_turns.iter().all(|t| t.order_id == Some(order_a)));
    }

    #[test]
    fn test_recent_returns_tail() {
        let mut ctx = ConversationContext::new(Uuid::new_v4(), 20);
        for i in 0..10 {
            ctx.add_message(Role::User, format!("{}", i), None);
        }
        let recent = ctx.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content, "9");
    }
}
