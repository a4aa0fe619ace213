//! Text chat over the session's signal channel.
//!
//! Messages are JSON `{data, timestamp, username}` sent as signals of type
//! `text`. Every participant receives every message, the sender included, so
//! the panel only ever renders what comes back from the session.

use crate::sdk::{SdkSession, Signal, SignalEvent};
use chrono::{DateTime, TimeZone};
use common::types::ConnectionId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Signal type carrying chat messages.
pub const TEXT_SIGNAL_TYPE: &str = "text";

/// Layout width while the chat panel is open.
pub const LAYOUT_WIDTH_WITH_CHAT: f64 = 0.75;

/// A chat message as carried in the signal payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    /// Sender's local wall-clock time, e.g. `3:04:05 PM`.
    pub timestamp: String,
    pub data: String,
}

impl ChatMessage {
    pub fn new<Tz>(data: impl Into<String>, username: impl Into<String>, now: DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            username: username.into(),
            timestamp: now.format("%-I:%M:%S %p").to_string(),
            data: data.into(),
        }
    }

    /// Parse a received `text` signal.
    pub fn from_signal(event: &SignalEvent) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&event.data)
    }
}

/// Result of a send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send.
    Empty,
    Sent,
    /// The signal was not delivered. Logged only.
    DeliveryFailed,
}

/// Sends chat messages.
pub struct ChatRelay;

impl ChatRelay {
    /// Broadcast `text` to the session. Empty input is ignored.
    pub async fn send<Tz>(
        session: &dyn SdkSession,
        text: &str,
        username: &str,
        now: DateTime<Tz>,
    ) -> SendOutcome
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        if text.is_empty() {
            return SendOutcome::Empty;
        }

        let message = ChatMessage::new(text, username, now);
        let data = match serde_json::to_string(&message) {
            Ok(data) => data,
            Err(e) => {
                warn!(target: "client.chat", error = %e, "Failed to encode chat message");
                return SendOutcome::DeliveryFailed;
            }
        };

        let signal = Signal {
            signal_type: TEXT_SIGNAL_TYPE.to_string(),
            data,
        };

        match session.signal(signal).await {
            Ok(()) => {
                debug!(target: "client.chat", "signal sent");
                SendOutcome::Sent
            }
            Err(e) => {
                warn!(target: "client.chat", error = %e, "Chat signal not delivered");
                SendOutcome::DeliveryFailed
            }
        }
    }
}

/// Who sent a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    Me,
    Other,
}

impl MessageOrigin {
    /// Classify a message by comparing the sender to our own connection.
    pub fn classify(from: &ConnectionId, local: Option<&ConnectionId>) -> Self {
        if local == Some(from) {
            MessageOrigin::Me
        } else {
            MessageOrigin::Other
        }
    }

    /// CSS class of the list item.
    pub fn css_class(&self) -> &'static str {
        match self {
            MessageOrigin::Me => "me",
            MessageOrigin::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub message: ChatMessage,
    pub origin: MessageOrigin,
}

/// Rendered chat list, visibility and unread badge.
#[derive(Debug, Clone, Default)]
pub struct ChatPanel {
    entries: Vec<ChatEntry>,
    visible: bool,
    unread: usize,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received message. Messages from others count as unread
    /// while the panel is hidden.
    pub fn receive(&mut self, message: ChatMessage, origin: MessageOrigin) {
        if origin == MessageOrigin::Other && !self.visible {
            self.unread += 1;
        }
        self.entries.push(ChatEntry { message, origin });
    }

    /// Show or hide the panel. Returns the new visibility.
    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible;
        if self.visible {
            self.unread = 0;
        }
        self.visible
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Unread badge count. Zero hides the badge.
    pub fn unread(&self) -> usize {
        self.unread
    }

    /// Share of the page width left for the layout container.
    pub fn layout_width_fraction(&self) -> f64 {
        if self.visible {
            LAYOUT_WIDTH_WITH_CHAT
        } else {
            1.0
        }
    }

    pub fn width_css(&self) -> &'static str {
        if self.visible {
            "75%"
        } else {
            "100%"
        }
    }
}
