//! Wire shapes exchanged between the terminal front end and the extension.
//!
//! Both message families are open records discriminated by `type`. Unknown
//! `type` values and unknown fields are kept in a flattened map so they pass
//! through the relay untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message kinds with host-level meaning.
pub mod kinds {
    pub const STATE: &str = "state";
    pub const MESSAGE_UPDATED: &str = "messageUpdated";
    pub const WEBVIEW_DID_LAUNCH: &str = "webviewDidLaunch";
    pub const MODE: &str = "mode";
    pub const NEW_TASK: &str = "newTask";
    pub const ASK_RESPONSE: &str = "askResponse";
    pub const CLEAR_TASK: &str = "clearTask";
}

/// Sub-kind of the streaming API request indicator.
pub const API_REQ_STARTED: &str = "api_req_started";

macro_rules! open_message {
    ($name:ident) => {
        impl $name {
            pub fn new(kind: impl Into<String>) -> Self {
                Self {
                    kind: kind.into(),
                    payload: Map::new(),
                }
            }

            /// Builder-style payload field.
            pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
                self.payload.insert(key.to_string(), value.into());
                self
            }

            pub fn kind(&self) -> &str {
                &self.kind
            }

            pub fn get(&self, key: &str) -> Option<&Value> {
                self.payload.get(key)
            }

            pub fn str_field(&self, key: &str) -> Option<&str> {
                self.payload.get(key).and_then(Value::as_str)
            }

            pub fn text(&self) -> Option<&str> {
                self.str_field("text")
            }

            pub fn is(&self, kind: &str) -> bool {
                self.kind == kind
            }
        }
    };
}

/// Message posted by the extension toward the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

open_message!(ExtensionMessage);

impl ExtensionMessage {
    /// Full state snapshot broadcast.
    pub fn state(state: &ExtensionState) -> Self {
        let value = serde_json::to_value(state).unwrap_or(Value::Null);
        Self::new(kinds::STATE).with("state", value)
    }

    /// Single transcript entry update.
    pub fn message_updated(message: &ChatMessage) -> Self {
        let value = serde_json::to_value(message).unwrap_or(Value::Null);
        Self::new(kinds::MESSAGE_UPDATED).with("clineMessage", value)
    }

    /// Decode the `state` payload. Malformed snapshots yield `None`.
    pub fn as_state(&self) -> Option<ExtensionState> {
        if !self.is(kinds::STATE) {
            return None;
        }
        serde_json::from_value(self.get("state")?.clone()).ok()
    }

    /// Decode the `clineMessage` payload of a `messageUpdated`.
    pub fn as_updated_message(&self) -> Option<ChatMessage> {
        if !self.is(kinds::MESSAGE_UPDATED) {
            return None;
        }
        serde_json::from_value(self.get("clineMessage")?.clone()).ok()
    }
}

/// Message posted by the front end toward the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebviewMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

open_message!(WebviewMessage);

impl WebviewMessage {
    pub fn webview_did_launch() -> Self {
        Self::new(kinds::WEBVIEW_DID_LAUNCH)
    }

    pub fn new_task(text: impl Into<String>) -> Self {
        Self::new(kinds::NEW_TASK).with("text", text.into())
    }

    pub fn mode(slug: impl Into<String>) -> Self {
        Self::new(kinds::MODE).with("text", slug.into())
    }

    /// Answer to an outstanding `ask`, e.g. `messageResponse` with text.
    pub fn ask_response(response: &str, text: Option<&str>) -> Self {
        let message = Self::new(kinds::ASK_RESPONSE).with("askResponse", response);
        match text {
            Some(text) => message.with("text", text),
            None => message,
        }
    }

    pub fn clear_task() -> Self {
        Self::new(kinds::CLEAR_TASK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageType {
    Ask,
    Say,
}

/// One transcript entry authored by the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub ts: u64,
    #[serde(rename = "type")]
    pub kind: ChatMessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub say: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_answered: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn say(ts: u64, say: &str, text: impl Into<String>) -> Self {
        Self {
            ts,
            kind: ChatMessageType::Say,
            ask: None,
            say: Some(say.to_string()),
            text: Some(text.into()),
            images: None,
            partial: None,
            is_answered: None,
            extra: Map::new(),
        }
    }

    pub fn ask(ts: u64, ask: &str, text: impl Into<String>) -> Self {
        Self {
            ts,
            kind: ChatMessageType::Ask,
            ask: Some(ask.to_string()),
            say: None,
            text: Some(text.into()),
            images: None,
            partial: None,
            is_answered: None,
            extra: Map::new(),
        }
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = Some(partial);
        self
    }

    pub fn answered(mut self, answered: bool) -> Self {
        self.is_answered = Some(answered);
        self
    }

    pub fn is_partial(&self) -> bool {
        self.partial == Some(true)
    }

    /// Sub-kind selecting interpretation: the `ask` or `say` value.
    pub fn sub_kind(&self) -> Option<&str> {
        match self.kind {
            ChatMessageType::Ask => self.ask.as_deref(),
            ChatMessageType::Say => self.say.as_deref(),
        }
    }

    /// Rough measure of how much content the entry carries. Used to keep the
    /// longer of two competing versions of a streaming entry.
    pub fn content_weight(&self) -> usize {
        self.text.as_deref().map_or(0, str::len)
            + self.say.as_deref().map_or(0, str::len)
            + self.ask.as_deref().map_or(0, str::len)
    }
}

/// Outcome fields carried in the JSON text of an `api_req_started` entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiRequestInfo {
    pub streaming_failed_message: Option<Value>,
    pub cancel_reason: Option<Value>,
    /// `Some` whenever the key is present, including an explicit `null`.
    pub cost: Option<Value>,
}

impl ApiRequestInfo {
    /// Parse the entry text. Malformed JSON degrades to "no info".
    pub fn parse(text: Option<&str>) -> Self {
        let Some(Value::Object(fields)) = text.and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        else {
            return Self::default();
        };
        Self {
            streaming_failed_message: fields.get("streamingFailedMessage").cloned(),
            cancel_reason: fields.get("cancelReason").cloned(),
            cost: fields.get("cost").cloned(),
        }
    }

    /// True once a failure, a cancellation or a cost figure is recorded.
    pub fn has_terminal_outcome(&self) -> bool {
        self.streaming_failed_message.as_ref().is_some_and(is_truthy)
            || self.cancel_reason.as_ref().is_some_and(is_truthy)
            || self.cost.is_some()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A user-defined mode published in the state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMode {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// State snapshot broadcast by the host and the extension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionState {
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub custom_modes: Vec<CustomMode>,
    #[serde(default)]
    pub cline_messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry authored locally by the terminal front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendMessage {
    pub id: String,
    /// Local entry kind, e.g. `user`, `system` or `error`.
    pub kind: String,
    pub content: String,
    pub ts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl FrontendMessage {
    pub fn new(id: impl Into<String>, kind: &str, content: impl Into<String>, ts: u64) -> Self {
        Self {
            id: id.into(),
            kind: kind.to_string(),
            content: content.into(),
            ts,
            partial: None,
        }
    }
}

/// Stable identity of a transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Frontend(String),
    Backend(u64),
}

/// Transcript entry from either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "message", rename_all = "lowercase")]
pub enum UnifiedMessage {
    Frontend(FrontendMessage),
    Backend(ChatMessage),
}

impl UnifiedMessage {
    pub fn key(&self) -> MessageKey {
        match self {
            Self::Frontend(message) => MessageKey::Frontend(message.id.clone()),
            Self::Backend(message) => MessageKey::Backend(message.ts),
        }
    }

    pub fn ts(&self) -> u64 {
        match self {
            Self::Frontend(message) => message.ts,
            Self::Backend(message) => message.ts,
        }
    }
}
