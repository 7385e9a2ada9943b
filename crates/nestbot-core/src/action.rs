//! Action Translator.
//!
//! Handlers describe what should happen next by returning a [`Reply`]. Each
//! step of the reply is either an [`Action`] (one outbound operation with its
//! positional payload), bare [`Content`] to send to the current chat, or a
//! [`Deferred`] closure the dispatcher simply awaits.

use std::{future::Future, pin::Pin};

use serde_json::Value;

use crate::{
    domain::{MessageId, UserId},
    messaging::types::{
        to_arg, BotCommand, ChatActionKind, Content, Keyboard, Media, Method, OutboundCall,
        Recipient,
    },
    Result,
};

/// One outbound operation. Fields left `None` are resolved by the adapter
/// from the current update (current chat, current message, acting user).
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Send {
        content: Content,
        keyboard: Option<Keyboard>,
        options: Option<Value>,
    },
    Alert {
        text: String,
        options: Option<Value>,
    },
    Toast {
        text: String,
        options: Option<Value>,
    },
    Forward {
        to_chat_id: Recipient,
        options: Option<Value>,
    },
    Copy {
        to_chat_id: Recipient,
        keyboard: Option<Keyboard>,
        options: Option<Value>,
    },
    ChatAction(ChatActionKind),
    Ban {
        until_date: Option<i64>,
        revoke_messages: Option<bool>,
        user_id: Option<UserId>,
    },
    Unban {
        only_if_banned: Option<bool>,
        user_id: Option<UserId>,
    },
    Restrict {
        permissions: Value,
        user_id: Option<UserId>,
        chat_id: Option<Recipient>,
        until_date: Option<i64>,
    },
    Promote {
        permissions: Value,
        user_id: Option<UserId>,
    },
    AdminTitle {
        title: String,
        user_id: Option<UserId>,
    },
    ApproveJoinRequest {
        user_id: Option<UserId>,
        chat_id: Option<Recipient>,
    },
    DeclineJoinRequest {
        user_id: Option<UserId>,
        chat_id: Option<Recipient>,
    },
    SaveFile {
        path: String,
        file_id: Option<String>,
    },
    SaveProfilePhoto {
        path: String,
        index: Option<u32>,
    },
    SetChatStickerSet {
        sticker_set_name: String,
        chat_id: Option<Recipient>,
    },
    SetChatPhoto {
        photo: Media,
        chat_id: Option<Recipient>,
    },
    DeleteChatPhoto {
        chat_id: Option<Recipient>,
    },
    DeleteChatStickerSet {
        chat_id: Option<Recipient>,
    },
    Leave {
        chat_id: Option<Recipient>,
    },
    SetMenuButton {
        menu_button: Value,
        chat_id: Option<Recipient>,
    },
    SetMyDefaultAdminRights {
        rights: Value,
        for_channels: Option<bool>,
    },
    SetChatTitle {
        title: String,
        chat_id: Option<Recipient>,
    },
    SetChatDescription {
        description: String,
        chat_id: Option<Recipient>,
    },
    SetChatPermissions {
        permissions: Value,
    },
    SetMyCommands {
        commands: Vec<BotCommand>,
        scope: Option<Value>,
        language_code: Option<String>,
    },
    DeleteMyCommands {
        scope: Option<Value>,
        language_code: Option<String>,
    },
    Pin {
        message_id: Option<MessageId>,
        chat_id: Option<Recipient>,
        disable_notification: Option<bool>,
    },
    Unpin {
        message_id: Option<MessageId>,
        chat_id: Option<Recipient>,
    },
    Delete {
        message_id: Option<MessageId>,
        chat_id: Option<Recipient>,
    },
    StopPoll {
        keyboard: Option<Keyboard>,
        message_id: Option<MessageId>,
        chat_id: Option<Recipient>,
        options: Option<Value>,
    },
    Edit {
        content: Content,
        keyboard: Option<Keyboard>,
        options: Option<Value>,
        message_id: Option<MessageId>,
    },
}

impl Action {
    pub fn send(content: impl Into<Content>) -> Self {
        Action::Send {
            content: content.into(),
            keyboard: None,
            options: None,
        }
    }

    pub fn send_with_keyboard(content: impl Into<Content>, keyboard: Keyboard) -> Self {
        Action::Send {
            content: content.into(),
            keyboard: Some(keyboard),
            options: None,
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Action::Alert {
            text: text.into(),
            options: None,
        }
    }

    pub fn toast(text: impl Into<String>) -> Self {
        Action::Toast {
            text: text.into(),
            options: None,
        }
    }

    pub fn edit(content: impl Into<Content>) -> Self {
        Action::Edit {
            content: content.into(),
            keyboard: None,
            options: None,
            message_id: None,
        }
    }

    /// Delete the message the update is about.
    pub fn delete() -> Self {
        Action::Delete {
            message_id: None,
            chat_id: None,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Action::Send { .. } => Method::Send,
            Action::Alert { .. } => Method::Alert,
            Action::Toast { .. } => Method::Toast,
            Action::Forward { .. } => Method::Forward,
            Action::Copy { .. } => Method::Copy,
            Action::ChatAction(_) => Method::ChatAction,
            Action::Ban { .. } => Method::Ban,
            Action::Unban { .. } => Method::Unban,
            Action::Restrict { .. } => Method::Restrict,
            Action::Promote { .. } => Method::Promote,
            Action::AdminTitle { .. } => Method::AdminTitle,
            Action::ApproveJoinRequest { .. } => Method::ApproveJoinRequest,
            Action::DeclineJoinRequest { .. } => Method::DeclineJoinRequest,
            Action::SaveFile { .. } => Method::SaveFile,
            Action::SaveProfilePhoto { .. } => Method::SaveProfilePhoto,
            Action::SetChatStickerSet { .. } => Method::SetChatStickerSet,
            Action::SetChatPhoto { .. } => Method::SetChatPhoto,
            Action::DeleteChatPhoto { .. } => Method::DeleteChatPhoto,
            Action::DeleteChatStickerSet { .. } => Method::DeleteChatStickerSet,
            Action::Leave { .. } => Method::Leave,
            Action::SetMenuButton { .. } => Method::SetMenuButton,
            Action::SetMyDefaultAdminRights { .. } => Method::SetMyDefaultAdminRights,
            Action::SetChatTitle { .. } => Method::SetChatTitle,
            Action::SetChatDescription { .. } => Method::SetChatDescription,
            Action::SetChatPermissions { .. } => Method::SetChatPermissions,
            Action::SetMyCommands { .. } => Method::SetMyCommands,
            Action::DeleteMyCommands { .. } => Method::DeleteMyCommands,
            Action::Pin { .. } => Method::Pin,
            Action::Unpin { .. } => Method::Unpin,
            Action::Delete { .. } => Method::Delete,
            Action::StopPoll { .. } => Method::StopPoll,
            Action::Edit { .. } => Method::Edit,
        }
    }

    /// Extract this action's fixed argument tuple.
    pub fn classify(&self) -> OutboundCall {
        let args = match self {
            Action::Send {
                content,
                keyboard,
                options,
            } => vec![to_arg(content), to_arg(keyboard), to_arg(options)],
            Action::Alert { text, options } | Action::Toast { text, options } => {
                vec![to_arg(text), to_arg(options)]
            }
            Action::Forward {
                to_chat_id,
                options,
            } => vec![to_arg(to_chat_id), to_arg(options)],
            Action::Copy {
                to_chat_id,
                keyboard,
                options,
            } => vec![to_arg(to_chat_id), to_arg(keyboard), to_arg(options)],
            Action::ChatAction(kind) => vec![to_arg(kind)],
            Action::Ban {
                until_date,
                revoke_messages,
                user_id,
            } => vec![to_arg(until_date), to_arg(revoke_messages), to_arg(user_id)],
            Action::Unban {
                only_if_banned,
                user_id,
            } => vec![to_arg(only_if_banned), to_arg(user_id)],
            Action::Restrict {
                permissions,
                user_id,
                chat_id,
                until_date,
            } => vec![
                permissions.clone(),
                to_arg(user_id),
                to_arg(chat_id),
                to_arg(until_date),
            ],
            Action::Promote {
                permissions,
                user_id,
            } => vec![permissions.clone(), to_arg(user_id)],
            Action::AdminTitle { title, user_id } => vec![to_arg(title), to_arg(user_id)],
            Action::ApproveJoinRequest { user_id, chat_id }
            | Action::DeclineJoinRequest { user_id, chat_id } => {
                vec![to_arg(user_id), to_arg(chat_id)]
            }
            Action::SaveFile { path, file_id } => vec![to_arg(path), to_arg(file_id)],
            Action::SaveProfilePhoto { path, index } => vec![to_arg(path), to_arg(index)],
            Action::SetChatStickerSet {
                sticker_set_name,
                chat_id,
            } => vec![to_arg(sticker_set_name), to_arg(chat_id)],
            Action::SetChatPhoto { photo, chat_id } => vec![to_arg(photo), to_arg(chat_id)],
            Action::DeleteChatPhoto { chat_id }
            | Action::DeleteChatStickerSet { chat_id }
            | Action::Leave { chat_id } => vec![to_arg(chat_id)],
            Action::SetMenuButton {
                menu_button,
                chat_id,
            } => vec![menu_button.clone(), to_arg(chat_id)],
            Action::SetMyDefaultAdminRights {
                rights,
                for_channels,
            } => vec![rights.clone(), to_arg(for_channels)],
            Action::SetChatTitle { title, chat_id } => vec![to_arg(title), to_arg(chat_id)],
            Action::SetChatDescription {
                description,
                chat_id,
            } => vec![to_arg(description), to_arg(chat_id)],
            Action::SetChatPermissions { permissions } => vec![permissions.clone()],
            Action::SetMyCommands {
                commands,
                scope,
                language_code,
            } => vec![to_arg(commands), to_arg(scope), to_arg(language_code)],
            Action::DeleteMyCommands {
                scope,
                language_code,
            } => vec![to_arg(scope), to_arg(language_code)],
            Action::Pin {
                message_id,
                chat_id,
                disable_notification,
            } => vec![
                to_arg(message_id),
                to_arg(chat_id),
                to_arg(disable_notification),
            ],
            Action::Unpin {
                message_id,
                chat_id,
            }
            | Action::Delete {
                message_id,
                chat_id,
            } => vec![to_arg(message_id), to_arg(chat_id)],
            Action::StopPoll {
                keyboard,
                message_id,
                chat_id,
                options,
            } => vec![
                to_arg(keyboard),
                to_arg(message_id),
                to_arg(chat_id),
                to_arg(options),
            ],
            Action::Edit {
                content,
                keyboard,
                options,
                message_id,
            } => vec![
                to_arg(content),
                to_arg(keyboard),
                to_arg(options),
                to_arg(message_id),
            ],
        };
        OutboundCall::new(self.method(), args)
    }
}

impl Content {
    /// Bare content is a direct `send` whose sole argument is the content.
    pub fn classify(&self) -> OutboundCall {
        OutboundCall::new(Method::Send, vec![to_arg(self)])
    }
}

type DeferredFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A one-shot async closure run in place of an outbound call.
pub struct Deferred(Box<dyn FnOnce() -> DeferredFuture + Send>);

impl Deferred {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(f())))
    }

    pub async fn run(self) -> Result<()> {
        (self.0)().await
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// One entry of a reply.
#[derive(Debug)]
pub enum Step {
    Action(Action),
    Content(Content),
    Deferred(Deferred),
}

impl From<Action> for Step {
    fn from(a: Action) -> Self {
        Step::Action(a)
    }
}

impl From<Content> for Step {
    fn from(c: Content) -> Self {
        Step::Content(c)
    }
}

impl From<Media> for Step {
    fn from(m: Media) -> Self {
        Step::Content(Content::Media(m))
    }
}

impl From<&str> for Step {
    fn from(s: &str) -> Self {
        Step::Content(Content::from(s))
    }
}

impl From<String> for Step {
    fn from(s: String) -> Self {
        Step::Content(Content::from(s))
    }
}

impl From<Deferred> for Step {
    fn from(d: Deferred) -> Self {
        Step::Deferred(d)
    }
}

/// Translate one step; deferred steps have no outbound call.
pub fn classify(step: &Step) -> Option<OutboundCall> {
    match step {
        Step::Action(action) => Some(action.classify()),
        Step::Content(content) => Some(content.classify()),
        Step::Deferred(_) => None,
    }
}

/// What a handler body returns: a primary step plus chained follow-ups.
#[derive(Debug)]
pub struct Reply {
    primary: Step,
    follow_ups: Vec<Step>,
}

impl Reply {
    pub fn new(primary: impl Into<Step>) -> Self {
        Self {
            primary: primary.into(),
            follow_ups: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Step::Content(Content::Text(text.into())))
    }

    /// Chain a follow-up, performed after everything added before it.
    pub fn then(mut self, step: impl Into<Step>) -> Self {
        self.follow_ups.push(step.into());
        self
    }

    /// Primary first, then follow-ups in append order.
    pub fn into_steps(self) -> Vec<Step> {
        let mut steps = Vec::with_capacity(1 + self.follow_ups.len());
        steps.push(self.primary);
        steps.extend(self.follow_ups);
        steps
    }
}

macro_rules! reply_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Reply {
            fn from(value: $ty) -> Self {
                Reply::new(value)
            }
        })*
    };
}

reply_from!(Action, Content, Media, Deferred, String, &str);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;
    use serde_json::json;

    #[test]
    fn bare_text_is_a_direct_send() {
        let call = classify(&Step::from("hello")).unwrap();
        assert_eq!(call.method, Method::Send);
        assert_eq!(call.args, vec![json!("hello")]);
    }

    #[test]
    fn send_action_carries_content_keyboard_options() {
        let kb = Keyboard::new().button("Yes", "yes");
        let call = Action::send_with_keyboard("Sure?", kb.clone()).classify();
        assert_eq!(call.method.as_str(), "send");
        assert_eq!(call.args.len(), 3);
        assert_eq!(call.args[0], json!("Sure?"));
        assert_eq!(call.required::<Keyboard>(1).unwrap(), kb);
        assert_eq!(call.args[2], Value::Null);
    }

    #[test]
    fn ban_arguments_follow_declared_order() {
        let call = Action::Ban {
            until_date: Some(1_700_000_000),
            revoke_messages: Some(true),
            user_id: Some(UserId(9)),
        }
        .classify();
        assert_eq!(call.method.as_str(), "ban");
        assert_eq!(call.args, vec![json!(1_700_000_000), json!(true), json!(9)]);
    }

    #[test]
    fn admin_actions_use_set_names() {
        let title = Action::SetChatTitle {
            title: "Club".to_string(),
            chat_id: Some(Recipient::Id(ChatId(-1))),
        }
        .classify();
        assert_eq!(title.method.as_str(), "setChatTitle");
        assert_eq!(title.args, vec![json!("Club"), json!(-1)]);

        let leave = Action::Leave { chat_id: None }.classify();
        assert_eq!(leave.method.as_str(), "leave");
        assert_eq!(leave.args, vec![Value::Null]);
    }

    #[test]
    fn edit_and_stop_poll_positions() {
        let edit = Action::Edit {
            content: Content::from("v2"),
            keyboard: None,
            options: Some(json!({ "parse_mode": "HTML" })),
            message_id: Some(MessageId(4)),
        }
        .classify();
        assert_eq!(edit.args.len(), 4);
        assert_eq!(edit.args[3], json!(4));

        let stop = Action::StopPoll {
            keyboard: None,
            message_id: Some(MessageId(8)),
            chat_id: Some(Recipient::Username("@club".to_string())),
            options: None,
        }
        .classify();
        assert_eq!(stop.method, Method::StopPoll);
        assert_eq!(stop.args[1], json!(8));
        assert_eq!(stop.args[2], json!("@club"));
    }

    #[test]
    fn explicit_chat_reads_the_declared_target() {
        let forward = Action::Forward {
            to_chat_id: Recipient::Id(ChatId(-5)),
            options: None,
        }
        .classify();
        assert_eq!(forward.explicit_chat(), Some(Recipient::Id(ChatId(-5))));

        let delete = Action::Delete {
            message_id: Some(MessageId(1)),
            chat_id: Some(Recipient::from("@club")),
        }
        .classify();
        assert_eq!(delete.explicit_chat(), Some(Recipient::from("@club")));

        let restrict = Action::Restrict {
            permissions: json!({}),
            user_id: None,
            chat_id: Some(Recipient::Id(ChatId(-9))),
            until_date: None,
        }
        .classify();
        assert_eq!(restrict.explicit_chat(), Some(Recipient::Id(ChatId(-9))));

        assert_eq!(Action::delete().classify().explicit_chat(), None);
        assert_eq!(Action::send("hi").classify().explicit_chat(), None);
    }

    #[test]
    fn deferred_steps_are_not_classified() {
        let step = Step::from(Deferred::new(|| async { Ok(()) }));
        assert!(classify(&step).is_none());
    }

    #[test]
    fn reply_orders_primary_then_follow_ups() {
        let steps = Reply::new(Action::alert("saved"))
            .then("first")
            .then(Action::delete())
            .into_steps();
        assert_eq!(steps.len(), 3);
        let methods: Vec<_> = steps
            .iter()
            .filter_map(classify)
            .map(|c| c.method)
            .collect();
        assert_eq!(methods, vec![Method::Alert, Method::Send, Method::Delete]);
    }
}
