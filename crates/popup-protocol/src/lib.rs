use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod launch;

pub use launch::LaunchParams;

/// Counter mixed into generated ids so two ids from one context never collide.
static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Unique-enough suffix: per-process sequence plus a random component so ids
/// from independent contexts (frames, native windows) do not collide either.
fn unique_suffix() -> String {
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
    let salt: u32 = rand::random();
    format!("{seq:x}-{salt:08x}")
}

/// Milliseconds since the Unix epoch, saturating to zero on clock skew.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Identifier of one popup instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopupId(String);

impl PopupId {
    /// Wrap an existing id (e.g. one read back from launch parameters).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id.
    pub fn generate() -> Self {
        Self(format!("popup-{}", unique_suffix()))
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PopupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Identifier of the channel wiring one popup to its creator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id.
    pub fn generate() -> Self {
        Self(format!("channel-{}", unique_suffix()))
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Host theme indicator propagated to popup content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light appearance.
    #[default]
    Light,
    /// Dark appearance.
    Dark,
}

impl Theme {
    /// Wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl Display for Theme {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Returned when a theme string is neither `light` nor `dark`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown theme '{0}'")]
pub struct UnknownTheme(pub String);

impl FromStr for Theme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(UnknownTheme(other.to_string())),
        }
    }
}

/// Why a popup closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// The content submitted a result.
    Submit,
    /// The content or caller cancelled.
    Cancel,
    /// Outside click, or the native host dismissed the window.
    Blur,
    /// The escape key was pressed.
    Escape,
    /// Closed by code: `close()`, `close_all()`, teardown, or a failure.
    Programmatic,
}

/// Terminal outcome of one popup. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupResult {
    /// True only for a submitted value.
    pub confirmed: bool,
    /// Submitted value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Why the popup closed.
    pub close_reason: CloseReason,
}

impl PopupResult {
    /// Confirmed result carrying optional data.
    pub fn submit(data: Option<Value>) -> Self {
        Self {
            confirmed: true,
            data,
            close_reason: CloseReason::Submit,
        }
    }

    /// Dismissed by the content without a value.
    pub fn cancel() -> Self {
        Self::dismissed(CloseReason::Cancel)
    }

    /// Unconfirmed result with the given reason.
    pub fn dismissed(reason: CloseReason) -> Self {
        Self {
            confirmed: false,
            data: None,
            close_reason: reason,
        }
    }

    /// Closed by the opener.
    pub fn programmatic() -> Self {
        Self::dismissed(CloseReason::Programmatic)
    }

    /// Attach data to the result.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// The child finished loading and is listening.
    Ready,
    /// Ask the other side to close the popup.
    CloseRequest,
    /// Acknowledge a close.
    CloseAck,
    /// The host theme changed; payload is the theme string.
    ThemeChange,
    /// Application data from the creator to the popup.
    DataToChild,
    /// Application data from the popup to the creator.
    DataToParent,
    /// The popup submitted its result; payload is a `PopupResult` or raw data.
    SubmitResult,
    /// Diagnostic error report.
    Error,
}

impl MessageKind {
    /// Wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::CloseRequest => "close-request",
            Self::CloseAck => "close-ack",
            Self::ThemeChange => "theme-change",
            Self::DataToChild => "data-to-child",
            Self::DataToParent => "data-to-parent",
            Self::SubmitResult => "submit-result",
            Self::Error => "error",
        }
    }
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One message on a popup channel.
///
/// Receivers discard any message whose `popup_id` is not their own; that
/// filter is the only thing keeping popups sharing a transport apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Popup the message concerns.
    pub popup_id: PopupId,
    /// Message type; `type` on the wire.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Kind-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Milliseconds since the Unix epoch at send time.
    pub timestamp: u64,
}

impl Message {
    /// Build a message stamped with the current time.
    pub fn new(popup_id: PopupId, kind: MessageKind, payload: Option<Value>) -> Self {
        Self {
            popup_id,
            kind,
            payload,
            timestamp: now_ms(),
        }
    }

    /// Interpret the payload of a `theme-change` message.
    pub fn theme(&self) -> Option<Theme> {
        match (&self.kind, &self.payload) {
            (MessageKind::ThemeChange, Some(Value::String(s))) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Point-to-point wire frame: a message plus the channel it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Channel the message travels on.
    pub channel_id: ChannelId,
    /// The message.
    pub message: Message,
}

impl Envelope {
    /// Envelope carrying `message` on `channel_id`.
    pub fn new(channel_id: ChannelId, message: Message) -> Self {
        Self {
            channel_id,
            message,
        }
    }
}

/// IPC helpers for transports crossing a real process boundary.
pub mod ipc {
    /// JSON codec for envelopes.
    pub mod codec;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = PopupId::generate();
        let b = PopupId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("popup-"));
        assert!(ChannelId::generate().as_str().starts_with("channel-"));
    }

    #[test]
    fn message_wire_shape() {
        let msg = Message {
            popup_id: PopupId::new("p1"),
            kind: MessageKind::SubmitResult,
            payload: Some(json!({"a": 1})),
            timestamp: 7,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            v,
            json!({"popupId": "p1", "type": "submit-result", "payload": {"a": 1}, "timestamp": 7})
        );
    }

    #[test]
    fn result_wire_shape() {
        let v = serde_json::to_value(PopupResult::dismissed(CloseReason::Escape)).unwrap();
        assert_eq!(v, json!({"confirmed": false, "closeReason": "escape"}));
        let back: PopupResult =
            serde_json::from_value(json!({"confirmed": true, "data": "x", "closeReason": "submit"}))
                .unwrap();
        assert_eq!(back, PopupResult::submit(Some(json!("x"))));
    }

    #[test]
    fn theme_parsing_and_messages() {
        assert_eq!("Dark".parse::<Theme>(), Ok(Theme::Dark));
        assert!("sepia".parse::<Theme>().is_err());
        let msg = Message::new(
            PopupId::new("p"),
            MessageKind::ThemeChange,
            Some(json!("dark")),
        );
        assert_eq!(msg.theme(), Some(Theme::Dark));
        let data = Message::new(PopupId::new("p"), MessageKind::DataToChild, Some(json!("dark")));
        assert_eq!(data.theme(), None);
    }

    #[test]
    fn kind_strings_match_serde() {
        for kind in [
            MessageKind::Ready,
            MessageKind::CloseRequest,
            MessageKind::CloseAck,
            MessageKind::ThemeChange,
            MessageKind::DataToChild,
            MessageKind::DataToParent,
            MessageKind::SubmitResult,
            MessageKind::Error,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }
}
