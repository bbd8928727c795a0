use std::{fmt, str::FromStr};

use serde::{
    de, ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{Map, Value};

use crate::{errors::Error, model::message::Message};

/// Payload kinds a server may deliver, as named in `allowed_updates`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
}

impl UpdateKind {
    pub const ALL: [UpdateKind; 9] = [
        UpdateKind::Message,
        UpdateKind::EditedMessage,
        UpdateKind::ChannelPost,
        UpdateKind::EditedChannelPost,
        UpdateKind::InlineQuery,
        UpdateKind::ChosenInlineResult,
        UpdateKind::CallbackQuery,
        UpdateKind::ShippingQuery,
        UpdateKind::PreCheckoutQuery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateKind::Message => "message",
            UpdateKind::EditedMessage => "edited_message",
            UpdateKind::ChannelPost => "channel_post",
            UpdateKind::EditedChannelPost => "edited_channel_post",
            UpdateKind::InlineQuery => "inline_query",
            UpdateKind::ChosenInlineResult => "chosen_inline_result",
            UpdateKind::CallbackQuery => "callback_query",
            UpdateKind::ShippingQuery => "shipping_query",
            UpdateKind::PreCheckoutQuery => "pre_checkout_query",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UpdateKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown update kind: {s}")))
    }
}

impl Serialize for UpdateKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UpdateKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The single populated payload of an update.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdatePayload {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    /// Any payload without a typed representation (or one that failed to decode).
    Opaque { kind: String, raw: Value },
    Empty,
}

impl UpdatePayload {
    fn decode(kind: String, raw: Value) -> Self {
        let typed: fn(Message) -> UpdatePayload = match kind.as_str() {
            "message" => UpdatePayload::Message,
            "edited_message" => UpdatePayload::EditedMessage,
            "channel_post" => UpdatePayload::ChannelPost,
            "edited_channel_post" => UpdatePayload::EditedChannelPost,
            _ => return UpdatePayload::Opaque { kind, raw },
        };
        match Message::deserialize(&raw) {
            Ok(m) => typed(m),
            Err(_) => UpdatePayload::Opaque { kind, raw },
        }
    }

    /// Wire name of the payload field, `None` for an empty update.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            UpdatePayload::Message(_) => Some(UpdateKind::Message.as_str()),
            UpdatePayload::EditedMessage(_) => Some(UpdateKind::EditedMessage.as_str()),
            UpdatePayload::ChannelPost(_) => Some(UpdateKind::ChannelPost.as_str()),
            UpdatePayload::EditedChannelPost(_) => Some(UpdateKind::EditedChannelPost.as_str()),
            UpdatePayload::Opaque { kind, .. } => Some(kind),
            UpdatePayload::Empty => None,
        }
    }

    pub fn kind(&self) -> Option<UpdateKind> {
        self.field_name().and_then(|k| k.parse().ok())
    }
}

/// <https://core.telegram.org/bots/api#update>
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub payload: UpdatePayload,
}

impl Update {
    pub fn new(update_id: i64, payload: UpdatePayload) -> Self {
        Self { update_id, payload }
    }

    /// The message carried by a `message` update.
    pub fn message(&self) -> Option<&Message> {
        match &self.payload {
            UpdatePayload::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.message().and_then(|m| m.text.as_deref())
    }
}

impl<'de> Deserialize<'de> for Update {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let update_id = fields
            .remove("update_id")
            .ok_or_else(|| de::Error::missing_field("update_id"))?
            .as_i64()
            .ok_or_else(|| de::Error::custom("update_id is not a 64-bit integer"))?;

        // At most one payload is populated; prefer a known kind if extras ever show up.
        let key = fields
            .keys()
            .find(|k| k.parse::<UpdateKind>().is_ok())
            .or_else(|| fields.keys().next())
            .cloned();

        let payload = match key.and_then(|k| fields.remove_entry(&k)) {
            Some((kind, raw)) => UpdatePayload::decode(kind, raw),
            None => UpdatePayload::Empty,
        };

        Ok(Update { update_id, payload })
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.payload.field_name().is_some() { 2 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("update_id", &self.update_id)?;
        match &self.payload {
            UpdatePayload::Message(m)
            | UpdatePayload::EditedMessage(m)
            | UpdatePayload::ChannelPost(m)
            | UpdatePayload::EditedChannelPost(m) => {
                if let Some(name) = self.payload.field_name() {
                    map.serialize_entry(name, m)?;
                }
            }
            UpdatePayload::Opaque { kind, raw } => map.serialize_entry(kind, raw)?,
            UpdatePayload::Empty => {}
        }
        map.end()
    }
}
