//! Chat sessions with the assistant

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use super::live::LiveQuery;
use crate::backend::{BackendApi, ChatRequest, HistoryTurn};
use crate::context::AppContext;
use crate::error::{DashboardError, Result};
use crate::listener::Subscription;
use crate::store::{Direction, Document, decode_all, to_fields};
use crate::types::{CHAT_SESSIONS, ChatMessage, ChatSession, MESSAGES, MessageType, Sender, timestamp_now};

const PREVIEW_CHARS: usize = 80;
const DEFAULT_SESSION_NAME: &str = "New Chat";

/// A user message and the assistant's reply
#[derive(Debug, Clone, Serialize)]
pub struct ChatExchange {
    pub user: ChatMessage,
    pub reply: ChatMessage,
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() { format!("{head}...") } else { head }
}

fn messages_path(session_id: &str) -> String {
    format!("{CHAT_SESSIONS}/{session_id}/{MESSAGES}")
}

pub struct ChatService<'a> {
    ctx: &'a AppContext,
    backend: &'a dyn BackendApi,
}

impl<'a> ChatService<'a> {
    pub fn new(ctx: &'a AppContext, backend: &'a dyn BackendApi) -> Self {
        Self { ctx, backend }
    }

    pub async fn create_session(&self, name: &str) -> Result<ChatSession> {
        let name = match name.trim() {
            "" => DEFAULT_SESSION_NAME,
            trimmed => trimmed,
        };
        let mut session = ChatSession {
            id: String::new(),
            name: name.to_string(),
            created_at: timestamp_now(),
            last_message: None,
        };
        session.id = self.ctx.add_document(CHAT_SESSIONS, to_fields(&session)?).await?;
        Ok(session)
    }

    /// Newest first
    pub async fn sessions(&self) -> Result<Vec<ChatSession>> {
        let docs = self
            .ctx
            .query(CHAT_SESSIONS, |q| q.order_by("createdAt", Direction::Descending))
            .await?;
        Ok(decode_all(&docs))
    }

    /// Oldest first
    pub async fn messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let docs = self
            .ctx
            .query(&messages_path(session_id), |q| q.order_by("timestamp", Direction::Ascending))
            .await?;
        Ok(decode_all(&docs))
    }

    /// Persist the user message, ask the backend with the prior history,
    /// then persist the reply and refresh the session preview
    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<ChatExchange> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DashboardError::Validation("Message cannot be empty".into()));
        }
        let session_path = format!("{CHAT_SESSIONS}/{session_id}");
        if self.ctx.get_document(&session_path).await?.is_none() {
            return Err(DashboardError::NotFound(format!("Chat session {session_id}")));
        }

        let history: Vec<HistoryTurn> = self
            .messages(session_id)
            .await?
            .into_iter()
            .map(|m| HistoryTurn {
                role: m.sender.role().to_string(),
                content: m.text,
            })
            .collect();

        let mut user = ChatMessage {
            id: String::new(),
            sender: Sender::User,
            text: text.to_string(),
            timestamp: timestamp_now(),
            kind: MessageType::Text,
        };
        user.id = self.ctx.add_document(&messages_path(session_id), to_fields(&user)?).await?;

        let response = self
            .backend
            .chat(&ChatRequest {
                message: text.to_string(),
                history,
            })
            .await?;

        let mut reply = ChatMessage {
            id: String::new(),
            sender: Sender::Assistant,
            text: response.response,
            timestamp: timestamp_now(),
            kind: MessageType::Text,
        };
        let mut summary = serde_json::Map::new();
        summary.insert("lastMessage".into(), preview(&reply.text).into());

        reply.id = self.ctx.add_document(&messages_path(session_id), to_fields(&reply)?).await?;
        self.ctx.update_document(&session_path, summary).await?;

        Ok(ChatExchange { user, reply })
    }

    /// Live, ordered message list for one session
    pub async fn watch_messages(
        &self,
        session_id: &str,
        on_change: impl Fn(Vec<ChatMessage>) + 'static,
    ) -> Result<Subscription> {
        self.ctx
            .subscribe(
                &messages_path(session_id),
                |q| q.order_by("timestamp", Direction::Ascending),
                Rc::new(move |docs: &[Document]| on_change(decode_all(docs))),
            )
            .await
    }
}

/// Messages of the selected session, kept current by one live subscription
#[derive(Default)]
pub struct MessageFeed {
    live: LiveQuery<String>,
    latest: Rc<RefCell<Vec<ChatMessage>>>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow `session_id`, dropping the previous session's subscription
    pub async fn select(&mut self, chat: &ChatService<'_>, session_id: &str) -> Result<()> {
        let latest = Rc::clone(&self.latest);
        let rebound = self
            .live
            .bind(session_id.to_string(), |id| {
                let id = id.clone();
                async move {
                    chat.watch_messages(&id, move |messages| *latest.borrow_mut() = messages)
                        .await
                }
            })
            .await?;
        if rebound {
            tracing::debug!(session_id, "message feed switched");
        }
        Ok(())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.live.key().map(String::as_str)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.latest.borrow().clone()
    }

    pub fn close(&mut self) {
        self.live.clear();
        self.latest.borrow_mut().clear();
    }
}
