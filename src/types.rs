//! Core types shared across components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of inbound protocol event. These are the topics the client
/// publishes on its notification hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Presence,
    Iq,
    NewSubscription,
    SubscriptionRequest,
    Event,
}

impl EventKind {
    /// Every kind, in a stable order.
    pub const ALL: [EventKind; 6] = [
        EventKind::Message,
        EventKind::Presence,
        EventKind::Iq,
        EventKind::NewSubscription,
        EventKind::SubscriptionRequest,
        EventKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Presence => "presence",
            EventKind::Iq => "iq",
            EventKind::NewSubscription => "new_subscription",
            EventKind::SubscriptionRequest => "subscription_request",
            EventKind::Event => "event",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of outbound message. Carried alongside the payload so the
/// collaborator can frame it; the core never interprets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    Normal,
    #[default]
    Chat,
    GroupChat,
    Headline,
    Error,
}

/// Identity of an observer within one topic.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub String);

impl ObserverId {
    pub fn new(id: impl Into<String>) -> Self {
        ObserverId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObserverId({})", self.0)
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObserverId {
    fn from(s: &str) -> Self {
        ObserverId(s.to_string())
    }
}

impl From<String> for ObserverId {
    fn from(s: String) -> Self {
        ObserverId(s)
    }
}

/// Login identity plus secret handed to the collaborator's `authenticate`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identity: String,
    pub secret: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

// Never print the secret.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}
