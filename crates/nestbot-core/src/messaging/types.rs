use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ChatId;

/// Outbound operation names understood by adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Send,
    Alert,
    Toast,
    Forward,
    Copy,
    ChatAction,
    Ban,
    Unban,
    Restrict,
    Promote,
    AdminTitle,
    ApproveJoinRequest,
    DeclineJoinRequest,
    SaveFile,
    SaveProfilePhoto,
    SetChatStickerSet,
    SetChatPhoto,
    DeleteChatPhoto,
    DeleteChatStickerSet,
    Leave,
    SetMenuButton,
    SetMyDefaultAdminRights,
    SetChatTitle,
    SetChatDescription,
    SetChatPermissions,
    SetMyCommands,
    DeleteMyCommands,
    Pin,
    Unpin,
    Delete,
    StopPoll,
    Edit,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Send => "send",
            Method::Alert => "alert",
            Method::Toast => "toast",
            Method::Forward => "forward",
            Method::Copy => "copy",
            Method::ChatAction => "chatAction",
            Method::Ban => "ban",
            Method::Unban => "unban",
            Method::Restrict => "restrict",
            Method::Promote => "promote",
            Method::AdminTitle => "adminTitle",
            Method::ApproveJoinRequest => "approveJoinRequest",
            Method::DeclineJoinRequest => "declineJoinRequest",
            Method::SaveFile => "saveFile",
            Method::SaveProfilePhoto => "saveProfilePhoto",
            Method::SetChatStickerSet => "setChatStickerSet",
            Method::SetChatPhoto => "setChatPhoto",
            Method::DeleteChatPhoto => "deleteChatPhoto",
            Method::DeleteChatStickerSet => "deleteChatStickerSet",
            Method::Leave => "leave",
            Method::SetMenuButton => "setMenuButton",
            Method::SetMyDefaultAdminRights => "setMyDefaultAdminRights",
            Method::SetChatTitle => "setChatTitle",
            Method::SetChatDescription => "setChatDescription",
            Method::SetChatPermissions => "setChatPermissions",
            Method::SetMyCommands => "setMyCommands",
            Method::DeleteMyCommands => "deleteMyCommands",
            Method::Pin => "pin",
            Method::Unpin => "unpin",
            Method::Delete => "delete",
            Method::StopPoll => "stopPoll",
            Method::Edit => "edit",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode one positional argument. Our payload types always serialize.
pub(crate) fn to_arg<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// A classified outbound call: method name plus positional arguments.
///
/// Absent optional arguments are encoded as `Value::Null` so positions stay
/// stable for every method.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundCall {
    pub method: Method,
    pub args: Vec<Value>,
}

impl OutboundCall {
    pub fn new(method: Method, args: Vec<Value>) -> Self {
        Self { method, args }
    }

    /// Typed positional argument; `Ok(None)` for a missing or null slot.
    pub fn arg<T: serde::de::DeserializeOwned>(&self, index: usize) -> crate::Result<Option<T>> {
        match self.args.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone()).map(Some).map_err(|e| {
                crate::Error::InvalidArgument {
                    method: self.method.as_str(),
                    index,
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// Position of the explicit target chat in this method's arguments.
    pub fn chat_slot(&self) -> Option<usize> {
        match self.method {
            Method::Forward
            | Method::Copy
            | Method::DeleteChatPhoto
            | Method::DeleteChatStickerSet
            | Method::Leave => Some(0),
            Method::ApproveJoinRequest
            | Method::DeclineJoinRequest
            | Method::SetChatStickerSet
            | Method::SetChatPhoto
            | Method::SetMenuButton
            | Method::SetChatTitle
            | Method::SetChatDescription
            | Method::Pin
            | Method::Unpin
            | Method::Delete => Some(1),
            Method::Restrict | Method::StopPoll => Some(2),
            _ => None,
        }
    }

    /// The chat named in the call itself, if any. Malformed slots count as
    /// absent here; the adapter reports them when it decodes the call.
    pub fn explicit_chat(&self) -> Option<Recipient> {
        self.arg(self.chat_slot()?).ok().flatten()
    }

    /// Like [`OutboundCall::arg`] but the slot must be present.
    pub fn required<T: serde::de::DeserializeOwned>(&self, index: usize) -> crate::Result<T> {
        self.arg(index)?.ok_or_else(|| crate::Error::InvalidArgument {
            method: self.method.as_str(),
            index,
            reason: "missing".to_string(),
        })
    }
}

/// Bare content a handler can return to mean "send this to the current chat".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Media(Media),
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<Media> for Content {
    fn from(m: Media) -> Self {
        Content::Media(m)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Document,
    Voice,
    Animation,
    VideoNote,
    Sticker,
}

impl MediaKind {
    /// Field name carrying this media kind in a Bot API message.
    pub fn field(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Voice => "voice",
            MediaKind::Animation => "animation",
            MediaKind::VideoNote => "video_note",
            MediaKind::Sticker => "sticker",
        }
    }
}

/// A media file referenced by Telegram file id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Media {
    pub fn new(kind: MediaKind, file_id: impl Into<String>) -> Self {
        Self {
            kind,
            file_id: file_id.into(),
            caption: None,
        }
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// Target chat: numeric id or `@channelusername`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipient {
    Id(ChatId),
    Username(String),
}

impl From<ChatId> for Recipient {
    fn from(id: ChatId) -> Self {
        Recipient::Id(id)
    }
}

impl From<i64> for Recipient {
    fn from(id: i64) -> Self {
        Recipient::Id(ChatId(id))
    }
}

impl From<&str> for Recipient {
    fn from(name: &str) -> Self {
        Recipient::Username(name.to_string())
    }
}

/// Outgoing "chat action" (typing indicator, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatActionKind {
    Typing,
    UploadPhoto,
    RecordVideo,
    UploadVideo,
    RecordVoice,
    UploadVoice,
    UploadDocument,
    ChooseSticker,
    FindLocation,
    RecordVideoNote,
    UploadVideoNote,
}

impl ChatActionKind {
    pub const ALL: [ChatActionKind; 11] = [
        ChatActionKind::Typing,
        ChatActionKind::UploadPhoto,
        ChatActionKind::RecordVideo,
        ChatActionKind::UploadVideo,
        ChatActionKind::RecordVoice,
        ChatActionKind::UploadVoice,
        ChatActionKind::UploadDocument,
        ChatActionKind::ChooseSticker,
        ChatActionKind::FindLocation,
        ChatActionKind::RecordVideoNote,
        ChatActionKind::UploadVideoNote,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Inline keyboard attached to a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a button to the last row, opening one if needed.
    pub fn button(mut self, label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        let button = InlineButton {
            label: label.into(),
            callback_data: callback_data.into(),
        };
        match self.rows.last_mut() {
            Some(row) => row.push(button),
            None => self.rows.push(vec![button]),
        }
        self
    }

    pub fn row(mut self) -> Self {
        self.rows.push(Vec::new());
        self
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(options: &[(String, String)], max_label_len: usize) -> Self {
        let rows = options
            .iter()
            .map(|(label, data)| {
                let label = if label.chars().count() > max_label_len {
                    format!("{}...", label.chars().take(max_label_len).collect::<String>())
                } else {
                    label.clone()
                };
                vec![InlineButton {
                    label,
                    callback_data: data.clone(),
                }]
            })
            .collect();
        Self { rows }
    }
}
