//! Typed method parameters and their flattening into transport key/value pairs.

use serde::Serialize;
use serde_json::Value;

use crate::{domain::ChatId, errors::Error, model::UpdateKind, Result};

/// Largest batch the server will return for one `getUpdates` call.
pub const MAX_UPDATES_PER_ROUND: u32 = 100;

/// Parameters of one `getUpdates` round.
///
/// Owned exclusively by the poll loop for the lifetime of a session; the loop
/// rewrites `offset` after every round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PollParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    /// Long-poll wait in seconds. Zero means short polling.
    pub timeout: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<UpdateKind>>,
}

impl Default for PollParams {
    fn default() -> Self {
        Self {
            offset: None,
            timeout: 30,
            limit: MAX_UPDATES_PER_ROUND,
            allowed_updates: None,
        }
    }
}

impl PollParams {
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_timeout(mut self, timeout: u32) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_allowed_updates(mut self, kinds: impl IntoIterator<Item = UpdateKind>) -> Self {
        self.allowed_updates = Some(kinds.into_iter().collect());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_UPDATES_PER_ROUND {
            return Err(Error::Config(format!(
                "getUpdates limit must be within 1..={MAX_UPDATES_PER_ROUND}, got {}",
                self.limit
            )));
        }
        Ok(())
    }

    /// The zero-wait, single-update round that confirms `offset` to the server.
    pub fn acknowledgement(&self) -> Self {
        Self {
            offset: self.offset,
            timeout: 0,
            limit: 1,
            allowed_updates: self.allowed_updates.clone(),
        }
    }
}

/// <https://core.telegram.org/bots/api#sendmessage>
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendMessageParams {
    pub chat_id: ChatId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_notification: Option<bool>,
}

impl SendMessageParams {
    pub fn new(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            parse_mode: None,
            reply_to_message_id: None,
            disable_notification: None,
        }
    }

    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to_message_id = Some(message_id);
        self
    }
}

/// <https://core.telegram.org/bots/api#getfile>
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GetFileParams {
    pub file_id: String,
}

/// Flatten a parameter struct into key/value pairs for a query string or form body.
///
/// Strings pass through verbatim, nulls are dropped and every other value is
/// JSON-encoded, which is how the Bot API expects arrays and objects.
pub fn encode_values<P: Serialize + ?Sized>(params: &P) -> Result<Vec<(String, String)>> {
    let value = serde_json::to_value(params)?;
    let fields = match value {
        Value::Object(fields) => fields,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(Error::Config(format!(
                "method parameters must serialize to an object, got {other}"
            )))
        }
    };

    let mut out = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        match value {
            Value::Null => {}
            Value::String(s) => out.push((key, s)),
            other => out.push((key, serde_json::to_string(&other)?)),
        }
    }
    Ok(out)
}
