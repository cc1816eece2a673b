//! # Events Module
//!
//! Fire-and-forget notifications for the mailer and for other services.
//! Producers assume at-most-once delivery; nothing here waits for a consumer.

pub mod memory;
pub mod rabbitmq;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use memory::InMemoryPublisher;
pub use rabbitmq::RabbitMqPublisher;

// ============================================================================
// Destinations
// ============================================================================

pub const REGISTRATION_CODE_MAIL_QUEUE: &str = "notifications.registration_code";
pub const SIGN_IN_CODE_MAIL_QUEUE: &str = "notifications.signin_code";
pub const FORGOT_PASSWORD_MAIL_QUEUE: &str = "user-forgot-password";
pub const USER_INFO_UPDATED_QUEUE: &str = "user-info-updated";
pub const USERS_CREATED_EXCHANGE: &str = "users.created";
pub const FOLLOWS_QUEUE: &str = "follows";
pub const SUBSCRIPTIONS_QUEUE: &str = "subscriptions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Point-to-point queue, published through the default exchange
    Queue(&'static str),
    /// Fanout exchange, every bound queue gets a copy
    Exchange(&'static str),
}

impl Destination {
    pub fn name(&self) -> &'static str {
        match self {
            Destination::Queue(name) | Destination::Exchange(name) => name,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Queue(name) => write!(f, "queue:{}", name),
            Destination::Exchange(name) => write!(f, "exchange:{}", name),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, destination: Destination, payload: Vec<u8>)
        -> Result<(), PublishError>;
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CodeMail<'a> {
    pub email: &'a str,
    pub code: u64,
}

#[derive(Debug, Serialize)]
pub struct UserCreated<'a> {
    pub id: &'a str,
    pub username: &'a str,
}

#[derive(Debug, Serialize)]
pub struct FollowCreated<'a> {
    pub user_id: &'a str,
    pub follower_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionCreated<'a> {
    pub user_id: &'a str,
    pub sub_id: &'a str,
}

/// Which mail template a one-time code goes out with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeMailKind {
    Registration,
    SignIn,
    ForgotPassword,
}

impl CodeMailKind {
    fn destination(self) -> Destination {
        match self {
            CodeMailKind::Registration => Destination::Queue(REGISTRATION_CODE_MAIL_QUEUE),
            CodeMailKind::SignIn => Destination::Queue(SIGN_IN_CODE_MAIL_QUEUE),
            CodeMailKind::ForgotPassword => Destination::Queue(FORGOT_PASSWORD_MAIL_QUEUE),
        }
    }
}

// ============================================================================
// Typed bus
// ============================================================================

/// One method per outbound event on top of an [`EventPublisher`]
#[derive(Clone)]
pub struct EventBus {
    publisher: Arc<dyn EventPublisher>,
}

impl EventBus {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    async fn send<T: Serialize>(
        &self,
        destination: Destination,
        event: &T,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        debug!(destination = %destination, bytes = payload.len(), "Publishing event");
        self.publisher.publish(destination, payload).await
    }

    pub async fn code_mail(
        &self,
        kind: CodeMailKind,
        email: &str,
        code: u64,
    ) -> Result<(), PublishError> {
        self.send(kind.destination(), &CodeMail { email, code }).await
    }

    pub async fn user_created(&self, id: &str, username: &str) -> Result<(), PublishError> {
        self.send(
            Destination::Exchange(USERS_CREATED_EXCHANGE),
            &UserCreated { id, username },
        )
        .await
    }

    /// `changes` holds only the fields that were written
    pub async fn user_info_updated(
        &self,
        user_id: &str,
        changes: Map<String, Value>,
    ) -> Result<(), PublishError> {
        let mut event = changes;
        event.insert("user_id".to_string(), Value::String(user_id.to_string()));
        self.send(Destination::Queue(USER_INFO_UPDATED_QUEUE), &event)
            .await
    }

    pub async fn follow_created(
        &self,
        user_id: &str,
        follower_id: &str,
    ) -> Result<(), PublishError> {
        self.send(
            Destination::Queue(FOLLOWS_QUEUE),
            &FollowCreated {
                user_id,
                follower_id,
            },
        )
        .await
    }

    pub async fn subscription_created(
        &self,
        user_id: &str,
        sub_id: &str,
    ) -> Result<(), PublishError> {
        self.send(
            Destination::Queue(SUBSCRIPTIONS_QUEUE),
            &SubscriptionCreated { user_id, sub_id },
        )
        .await
    }
}
