//! Inbound update model.
//!
//! Only the subset of the Bot API update that routing needs is typed here;
//! media payloads are kept as raw JSON because the core only checks presence.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ChatId, MessageId, UserId};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_join_request: Option<ChatJoinRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_answer: Option<PollAnswer>,

    /// Set on the synthetic copy dispatched right after a user enters a scope.
    #[serde(skip)]
    pub scope_entered: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_note: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    /// Offset in UTF-16 code units.
    pub offset: usize,
    /// Length in UTF-16 code units.
    pub length: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatJoinRequest {
    pub chat: Chat,
    pub from: User,
    #[serde(default)]
    pub date: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default)]
    pub option_ids: Vec<i32>,
}

impl Message {
    pub fn entity(&self, kind: &str) -> Option<&MessageEntity> {
        self.entities.iter().find(|e| e.kind == kind)
    }

    /// File id of the attached audio, video or photo (largest size), in
    /// that order of preference, then any other file-bearing media.
    pub fn file_id(&self) -> Option<&str> {
        let photo = self.photo.as_ref().and_then(|sizes| sizes.as_array()?.last());
        [
            self.audio.as_ref(),
            self.video.as_ref(),
            photo,
            self.document.as_ref(),
            self.voice.as_ref(),
            self.animation.as_ref(),
            self.video_note.as_ref(),
            self.sticker.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find_map(|media| media.get("file_id")?.as_str())
    }

    /// Text covered by `entity`, resolving UTF-16 offsets.
    pub fn entity_text(&self, entity: &MessageEntity) -> Option<String> {
        let text = self.text.as_deref()?;
        let units: Vec<u16> = text
            .encode_utf16()
            .skip(entity.offset)
            .take(entity.length)
            .collect();
        if units.is_empty() {
            return None;
        }
        Some(String::from_utf16_lossy(&units))
    }
}

fn command_params_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/\S*? (.*)").ok()).as_ref()
}

impl Update {
    /// The message this update is about, whichever slot carries it.
    pub fn message(&self) -> Option<&Message> {
        self.message
            .as_ref()
            .or(self.edited_message.as_ref())
            .or(self.channel_post.as_ref())
            .or(self.edited_channel_post.as_ref())
            .or_else(|| self.callback_query.as_ref()?.message.as_ref())
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        if let Some(m) = self.message() {
            return Some(ChatId(m.chat.id));
        }
        if let Some(user) = self.poll_answer.as_ref().and_then(|a| a.user.as_ref()) {
            return Some(ChatId(user.id));
        }
        self.chat_join_request.as_ref().map(|r| ChatId(r.chat.id))
    }

    /// The user acting in this update. Scope and state are keyed by it.
    pub fn user_id(&self) -> Option<UserId> {
        if let Some(q) = &self.callback_query {
            return Some(UserId(q.from.id));
        }
        if let Some(user) = self.message().and_then(|m| m.from.as_ref()) {
            return Some(UserId(user.id));
        }
        if let Some(r) = &self.chat_join_request {
            return Some(UserId(r.from.id));
        }
        self.poll_answer
            .as_ref()
            .and_then(|a| a.user.as_ref())
            .map(|u| UserId(u.id))
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message().map(|m| MessageId(m.message_id))
    }

    pub fn text(&self) -> Option<&str> {
        self.message().and_then(|m| m.text.as_deref())
    }

    pub fn entities(&self) -> &[MessageEntity] {
        self.message().map(|m| m.entities.as_slice()).unwrap_or(&[])
    }

    pub fn entity(&self, kind: &str) -> Option<&MessageEntity> {
        self.message()?.entity(kind)
    }

    pub fn callback_query_id(&self) -> Option<&str> {
        self.callback_query.as_ref().map(|q| q.id.as_str())
    }

    pub fn callback_data(&self) -> Option<&str> {
        self.callback_query.as_ref()?.data.as_deref()
    }

    /// The `/command` token of the first `bot_command` entity.
    pub fn command(&self) -> Option<String> {
        let msg = self.message()?;
        let entity = msg.entity("bot_command")?;
        msg.entity_text(entity)
    }

    /// Words after the command: `/buy 3 apples` -> `["3", "apples"]`.
    pub fn command_params(&self) -> Vec<String> {
        let Some(text) = self.text() else {
            return Vec::new();
        };
        let Some(caps) = command_params_re().and_then(|re| re.captures(text)) else {
            return Vec::new();
        };
        caps.get(1)
            .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Copy of this update flagged as the scope-transition event.
    pub fn as_scope_entry(&self) -> Self {
        Self {
            scope_entered: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn text_update(update_id: i64, user_id: i64, text: &str) -> Update {
        let entities = if text.starts_with('/') {
            let len = text
                .split_whitespace()
                .next()
                .map(|w| w.encode_utf16().count())
                .unwrap_or(0);
            vec![MessageEntity {
                kind: "bot_command".to_string(),
                offset: 0,
                length: len,
            }]
        } else {
            Vec::new()
        };

        Update {
            update_id,
            message: Some(Message {
                message_id: 10,
                from: Some(User {
                    id: user_id,
                    first_name: "Test".to_string(),
                    ..Default::default()
                }),
                chat: Chat {
                    id: user_id,
                    kind: "private".to_string(),
                    ..Default::default()
                },
                text: Some(text.to_string()),
                entities,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn click_update(update_id: i64, user_id: i64, data: &str) -> Update {
        Update {
            update_id,
            callback_query: Some(CallbackQuery {
                id: format!("cb-{update_id}"),
                from: User {
                    id: user_id,
                    ..Default::default()
                },
                message: Some(Message {
                    message_id: 5,
                    from: Some(User {
                        id: 999,
                        is_bot: true,
                        ..Default::default()
                    }),
                    chat: Chat {
                        id: user_id,
                        kind: "private".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                data: Some(data.to_string()),
            }),
            ..Default::default()
        }
    }
}
