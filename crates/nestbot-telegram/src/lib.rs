//! Telegram adapter (teloxide).
//!
//! [`TelegramOutbound`] implements the `nestbot-core` outbound port over the
//! Bot API. [`router`] feeds inbound updates to a dispatcher by long polling,
//! [`webhook`] by receiving Telegram's pushes.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use teloxide::{
    net::Download,
    prelude::*,
    types::{
        BotCommandScope, ChatAdministratorRights, ChatPermissions, InlineKeyboardButton,
        InlineKeyboardMarkup, InputFile, MenuButton, ParseMode,
    },
};
use tokio::{io::AsyncWrite, time::sleep};

pub mod router;
pub mod webhook;

#[cfg(test)]
mod testing;

use nestbot_core::{
    domain::{MessageId, UserId},
    errors::Error,
    messaging::{
        port::Outbound,
        types::{
            BotCommand, ChatActionKind, Content, Keyboard, Media, MediaKind, Method, OutboundCall,
            Recipient,
        },
    },
    update::Update,
    Result,
};

/// Bot API binding for the outbound port.
///
/// Targets left empty in a call (chat, message, user, callback query) are
/// taken from the update being handled.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    async fn send_content(
        &self,
        chat: teloxide::types::Recipient,
        content: Content,
        keyboard: Option<InlineKeyboardMarkup>,
        options: &CallOptions,
    ) -> Result<Value> {
        let msg = match content {
            Content::Text(text) => {
                self.with_retry(|| {
                    let mut req = self.bot.send_message(chat.clone(), text.clone());
                    if let Some(mode) = options.parse_mode() {
                        req = req.parse_mode(mode);
                    }
                    if let Some(disable) = options.disable_web_page_preview {
                        req = req.disable_web_page_preview(disable);
                    }
                    if let Some(kb) = &keyboard {
                        req = req.reply_markup(kb.clone());
                    }
                    if let Some(id) = options.reply_to() {
                        req = req.reply_to_message_id(id);
                    }
                    req.disable_notification(options.silent())
                        .protect_content(options.protected())
                })
                .await?
            }
            Content::Media(media) => self.send_media(chat, media, keyboard, options).await?,
        };
        to_json(&msg)
    }

    async fn send_media(
        &self,
        chat: teloxide::types::Recipient,
        media: Media,
        keyboard: Option<InlineKeyboardMarkup>,
        options: &CallOptions,
    ) -> Result<teloxide::types::Message> {
        let Media {
            kind,
            file_id,
            caption,
        } = media;
        let file = || InputFile::file_id(file_id.clone());
        let caption = caption.unwrap_or_default();
        let parse_mode = options.parse_mode();

        macro_rules! send {
            ($req:expr) => {
                self.with_retry(|| {
                    let mut req = $req;
                    if let Some(kb) = &keyboard {
                        req = req.reply_markup(kb.clone());
                    }
                    if let Some(id) = options.reply_to() {
                        req = req.reply_to_message_id(id);
                    }
                    req.disable_notification(options.silent())
                        .protect_content(options.protected())
                })
                .await
            };
            ($req:expr, captioned) => {
                send!({
                    let req = $req.caption(caption.clone());
                    match parse_mode {
                        Some(mode) => req.parse_mode(mode),
                        None => req,
                    }
                })
            };
        }

        let bot = &self.bot;
        match kind {
            MediaKind::Photo => send!(bot.send_photo(chat.clone(), file()), captioned),
            MediaKind::Video => send!(bot.send_video(chat.clone(), file()), captioned),
            MediaKind::Audio => send!(bot.send_audio(chat.clone(), file()), captioned),
            MediaKind::Document => send!(bot.send_document(chat.clone(), file()), captioned),
            MediaKind::Voice => send!(bot.send_voice(chat.clone(), file()), captioned),
            MediaKind::Animation => send!(bot.send_animation(chat.clone(), file()), captioned),
            // No captions on these two.
            MediaKind::VideoNote => send!(bot.send_video_note(chat.clone(), file())),
            MediaKind::Sticker => send!(bot.send_sticker(chat.clone(), file())),
        }
    }

    async fn answer_callback(
        &self,
        update: &Update,
        text: String,
        show_alert: bool,
        options: &CallOptions,
    ) -> Result<Value> {
        let id = update
            .callback_query_id()
            .ok_or(Error::MissingContext("callback query"))?
            .to_string();
        let url = match &options.url {
            Some(url) => Some(
                reqwest::Url::parse(url)
                    .map_err(|e| Error::External(format!("callback url '{url}': {e}")))?,
            ),
            None => None,
        };
        self.with_retry(|| {
            let mut req = self
                .bot
                .answer_callback_query(id.clone())
                .text(text.clone())
                .show_alert(show_alert);
            if let Some(url) = &url {
                req = req.url(url.clone());
            }
            if let Some(secs) = options.cache_time {
                req = req.cache_time(secs);
            }
            req
        })
        .await?;
        Ok(Value::Bool(true))
    }

    /// Stream a stored Telegram file into `dst`.
    async fn download(
        &self,
        file_id: &str,
        dst: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()> {
        let file = self
            .with_retry(|| self.bot.get_file(file_id.to_string()))
            .await?;
        self.bot
            .download_file(&file.path, dst)
            .await
            .map_err(|e| Error::External(format!("download {file_id}: {e}")))
    }

    async fn save_to(&self, file_id: &str, path: &str) -> Result<()> {
        if let Some(parent) = std::path::Path::new(path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut dst = tokio::fs::File::create(path).await?;
        self.download(file_id, &mut dst).await
    }
}

#[async_trait]
impl Outbound for TelegramOutbound {
    async fn perform(&self, update: &Update, call: OutboundCall) -> Result<Value> {
        let bot = &self.bot;
        match call.method {
            Method::Send => {
                let content: Content = call.required(0)?;
                let keyboard = call.arg::<Keyboard>(1)?.map(markup);
                let options = CallOptions::decode(&call, 2)?;
                self.send_content(current_chat(update)?, content, keyboard, &options)
                    .await
            }
            Method::Alert | Method::Toast => {
                let options = CallOptions::decode(&call, 1)?;
                let show_alert = call.method == Method::Alert;
                self.answer_callback(update, call.required(0)?, show_alert, &options)
                    .await
            }
            Method::Forward => {
                let to = recipient(call.required::<Recipient>(0)?);
                let options = CallOptions::decode(&call, 1)?;
                let from = current_chat(update)?;
                let id = current_message(update)?;
                let msg = self
                    .with_retry(|| {
                        bot.forward_message(to.clone(), from.clone(), id)
                            .disable_notification(options.silent())
                            .protect_content(options.protected())
                    })
                    .await?;
                to_json(&msg)
            }
            Method::Copy => {
                let to = recipient(call.required::<Recipient>(0)?);
                let keyboard = call.arg::<Keyboard>(1)?.map(markup);
                let options = CallOptions::decode(&call, 2)?;
                let from = current_chat(update)?;
                let id = current_message(update)?;
                let copied = self
                    .with_retry(|| {
                        let mut req = bot
                            .copy_message(to.clone(), from.clone(), id)
                            .disable_notification(options.silent())
                            .protect_content(options.protected());
                        if let Some(caption) = &options.caption {
                            req = req.caption(caption.clone());
                        }
                        if let Some(mode) = options.parse_mode() {
                            req = req.parse_mode(mode);
                        }
                        if let Some(reply_to) = options.reply_to() {
                            req = req.reply_to_message_id(reply_to);
                        }
                        if let Some(kb) = &keyboard {
                            req = req.reply_markup(kb.clone());
                        }
                        req
                    })
                    .await?;
                to_json(&copied)
            }
            Method::ChatAction => {
                let action = chat_action(call.required(0)?)?;
                let chat = current_chat(update)?;
                self.with_retry(|| bot.send_chat_action(chat.clone(), action))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::Ban => {
                let until = unix_time(call.arg(0)?);
                let revoke = call.arg::<bool>(1)?;
                let user = target_user(update, call.arg(2)?)?;
                let chat = current_chat(update)?;
                self.with_retry(|| {
                    let mut req = bot.ban_chat_member(chat.clone(), user);
                    if let Some(until) = until {
                        req = req.until_date(until);
                    }
                    if let Some(revoke) = revoke {
                        req = req.revoke_messages(revoke);
                    }
                    req
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::Unban => {
                let only_if_banned = call.arg::<bool>(0)?.unwrap_or(false);
                let user = target_user(update, call.arg(1)?)?;
                let chat = current_chat(update)?;
                self.with_retry(|| {
                    bot.unban_chat_member(chat.clone(), user)
                        .only_if_banned(only_if_banned)
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::Restrict => {
                let permissions: ChatPermissions = call.required(0)?;
                let user = target_user(update, call.arg(1)?)?;
                let chat = chat_or_current(update, call.arg(2)?)?;
                let until = unix_time(call.arg(3)?);
                self.with_retry(|| {
                    let mut req = bot.restrict_chat_member(chat.clone(), user, permissions);
                    if let Some(until) = until {
                        req = req.until_date(until);
                    }
                    req
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::Promote => {
                let rights: PromoteRights = call.required(0)?;
                let user = target_user(update, call.arg(1)?)?;
                let chat = current_chat(update)?;
                self.with_retry(|| rights.apply(bot.promote_chat_member(chat.clone(), user)))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::AdminTitle => {
                let title: String = call.required(0)?;
                let user = target_user(update, call.arg(1)?)?;
                let chat = current_chat(update)?;
                self.with_retry(|| {
                    bot.set_chat_administrator_custom_title(chat.clone(), user, title.clone())
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::ApproveJoinRequest | Method::DeclineJoinRequest => {
                let user = target_user(update, call.arg(0)?)?;
                let chat = chat_or_current(update, call.arg(1)?)?;
                if call.method == Method::ApproveJoinRequest {
                    self.with_retry(|| bot.approve_chat_join_request(chat.clone(), user))
                        .await?;
                } else {
                    self.with_retry(|| bot.decline_chat_join_request(chat.clone(), user))
                        .await?;
                }
                Ok(Value::Bool(true))
            }
            Method::SaveFile => {
                let path: String = call.required(0)?;
                let file_id = match call.arg::<String>(1)? {
                    Some(id) => id,
                    None => update
                        .message()
                        .and_then(|m| m.file_id())
                        .ok_or(Error::MissingContext("file id"))?
                        .to_string(),
                };
                self.save_to(&file_id, &path).await?;
                Ok(Value::Bool(true))
            }
            Method::SaveProfilePhoto => {
                let path: String = call.required(0)?;
                let index = call.arg::<u32>(1)?.unwrap_or(0);
                let user = target_user(update, None)?;
                let photos = self
                    .with_retry(|| bot.get_user_profile_photos(user).offset(index).limit(1))
                    .await?;
                // Sizes come smallest first.
                let Some(largest) = photos.photos.first().and_then(|sizes| sizes.last()) else {
                    return Ok(Value::Bool(false));
                };
                self.save_to(&largest.file.id, &path).await?;
                Ok(Value::Bool(true))
            }
            Method::SetChatStickerSet => {
                let name: String = call.required(0)?;
                let chat = chat_or_current(update, call.arg(1)?)?;
                self.with_retry(|| bot.set_chat_sticker_set(chat.clone(), name.clone()))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::SetChatPhoto => {
                let photo: Media = call.required(0)?;
                let chat = chat_or_current(update, call.arg(1)?)?;
                // setChatPhoto only takes uploads, so fetch the stored file first.
                let mut bytes = Vec::new();
                self.download(&photo.file_id, &mut bytes).await?;
                let upload = InputFile::memory(bytes);
                self.with_retry(|| bot.set_chat_photo(chat.clone(), upload.clone()))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::DeleteChatPhoto => {
                let chat = chat_or_current(update, call.arg(0)?)?;
                self.with_retry(|| bot.delete_chat_photo(chat.clone()))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::DeleteChatStickerSet => {
                let chat = chat_or_current(update, call.arg(0)?)?;
                self.with_retry(|| bot.delete_chat_sticker_set(chat.clone()))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::Leave => {
                let chat = chat_or_current(update, call.arg(0)?)?;
                self.with_retry(|| bot.leave_chat(chat.clone())).await?;
                Ok(Value::Bool(true))
            }
            Method::SetMenuButton => {
                let button: MenuButton = call.required(0)?;
                let chat = match chat_or_current(update, call.arg(1)?)? {
                    teloxide::types::Recipient::Id(id) => id,
                    teloxide::types::Recipient::ChannelUsername(_) => {
                        return Err(Error::InvalidArgument {
                            method: call.method.as_str(),
                            index: 1,
                            reason: "menu buttons need a numeric chat id".to_string(),
                        })
                    }
                };
                self.with_retry(|| {
                    bot.set_chat_menu_button()
                        .chat_id(chat)
                        .menu_button(button.clone())
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::SetMyDefaultAdminRights => {
                let rights: ChatAdministratorRights = call.required(0)?;
                let for_channels = call.arg::<bool>(1)?;
                self.with_retry(|| {
                    let mut req = bot.set_my_default_administrator_rights().rights(rights.clone());
                    if let Some(for_channels) = for_channels {
                        req = req.for_channels(for_channels);
                    }
                    req
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::SetChatTitle => {
                let title: String = call.required(0)?;
                let chat = chat_or_current(update, call.arg(1)?)?;
                self.with_retry(|| bot.set_chat_title(chat.clone(), title.clone()))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::SetChatDescription => {
                let description: String = call.required(0)?;
                let chat = chat_or_current(update, call.arg(1)?)?;
                self.with_retry(|| {
                    bot.set_chat_description(chat.clone())
                        .description(description.clone())
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::SetChatPermissions => {
                let permissions: ChatPermissions = call.required(0)?;
                let chat = current_chat(update)?;
                self.with_retry(|| bot.set_chat_permissions(chat.clone(), permissions))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::SetMyCommands => {
                let commands: Vec<BotCommand> = call.required(0)?;
                let scope = call.arg::<BotCommandScope>(1)?;
                let language = call.arg::<String>(2)?;
                let commands: Vec<teloxide::types::BotCommand> = commands
                    .into_iter()
                    .map(|c| teloxide::types::BotCommand::new(c.command, c.description))
                    .collect();
                self.with_retry(|| {
                    let mut req = bot.set_my_commands(commands.clone());
                    if let Some(scope) = &scope {
                        req = req.scope(scope.clone());
                    }
                    if let Some(lang) = &language {
                        req = req.language_code(lang.clone());
                    }
                    req
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::DeleteMyCommands => {
                let scope = call.arg::<BotCommandScope>(0)?;
                let language = call.arg::<String>(1)?;
                self.with_retry(|| {
                    let mut req = bot.delete_my_commands();
                    if let Some(scope) = &scope {
                        req = req.scope(scope.clone());
                    }
                    if let Some(lang) = &language {
                        req = req.language_code(lang.clone());
                    }
                    req
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::Pin => {
                let id = message_or_current(update, call.arg(0)?)?;
                let chat = chat_or_current(update, call.arg(1)?)?;
                let silent = call.arg::<bool>(2)?.unwrap_or(false);
                self.with_retry(|| {
                    bot.pin_chat_message(chat.clone(), id)
                        .disable_notification(silent)
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::Unpin => {
                let id = call.arg::<MessageId>(0)?.map(tg_message_id);
                let chat = chat_or_current(update, call.arg(1)?)?;
                self.with_retry(|| {
                    let mut req = bot.unpin_chat_message(chat.clone());
                    if let Some(id) = id {
                        req = req.message_id(id);
                    }
                    req
                })
                .await?;
                Ok(Value::Bool(true))
            }
            Method::Delete => {
                let id = message_or_current(update, call.arg(0)?)?;
                let chat = chat_or_current(update, call.arg(1)?)?;
                self.with_retry(|| bot.delete_message(chat.clone(), id))
                    .await?;
                Ok(Value::Bool(true))
            }
            Method::StopPoll => {
                let keyboard = call.arg::<Keyboard>(0)?.map(markup);
                let id = message_or_current(update, call.arg(1)?)?;
                let chat = chat_or_current(update, call.arg(2)?)?;
                let poll = self
                    .with_retry(|| {
                        let mut req = bot.stop_poll(chat.clone(), id);
                        if let Some(kb) = &keyboard {
                            req = req.reply_markup(kb.clone());
                        }
                        req
                    })
                    .await?;
                to_json(&poll)
            }
            Method::Edit => {
                let content: Content = call.required(0)?;
                let keyboard = call.arg::<Keyboard>(1)?.map(markup);
                let options = CallOptions::decode(&call, 2)?;
                let id = message_or_current(update, call.arg(3)?)?;
                let chat = current_chat(update)?;
                let Content::Text(text) = content else {
                    return Err(Error::Unsupported("edit with media content"));
                };
                let msg = self
                    .with_retry(|| {
                        let mut req = bot.edit_message_text(chat.clone(), id, text.clone());
                        if let Some(mode) = options.parse_mode() {
                            req = req.parse_mode(mode);
                        }
                        if let Some(disable) = options.disable_web_page_preview {
                            req = req.disable_web_page_preview(disable);
                        }
                        if let Some(kb) = &keyboard {
                            req = req.reply_markup(kb.clone());
                        }
                        req
                    })
                    .await?;
                to_json(&msg)
            }
        }
    }
}

/// Bot API options carried in a call's `options` slot. Unknown keys are
/// ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CallOptions {
    parse_mode: Option<String>,
    disable_notification: Option<bool>,
    protect_content: Option<bool>,
    disable_web_page_preview: Option<bool>,
    reply_to_message_id: Option<i32>,
    caption: Option<String>,
    url: Option<String>,
    cache_time: Option<u32>,
}

impl CallOptions {
    fn decode(call: &OutboundCall, index: usize) -> Result<Self> {
        Ok(call.arg(index)?.unwrap_or_default())
    }

    fn parse_mode(&self) -> Option<ParseMode> {
        match self.parse_mode.as_deref() {
            Some(m) if m.eq_ignore_ascii_case("html") => Some(ParseMode::Html),
            Some(m) if m.eq_ignore_ascii_case("markdownv2") => Some(ParseMode::MarkdownV2),
            _ => None,
        }
    }

    fn silent(&self) -> bool {
        self.disable_notification.unwrap_or(false)
    }

    fn protected(&self) -> bool {
        self.protect_content.unwrap_or(false)
    }

    fn reply_to(&self) -> Option<teloxide::types::MessageId> {
        self.reply_to_message_id.map(teloxide::types::MessageId)
    }
}

/// `promoteChatMember` flags; absent ones are left to Telegram's defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct PromoteRights {
    is_anonymous: Option<bool>,
    can_manage_chat: Option<bool>,
    can_post_messages: Option<bool>,
    can_edit_messages: Option<bool>,
    can_delete_messages: Option<bool>,
    can_manage_video_chats: Option<bool>,
    can_restrict_members: Option<bool>,
    can_promote_members: Option<bool>,
    can_change_info: Option<bool>,
    can_invite_users: Option<bool>,
    can_pin_messages: Option<bool>,
}

impl PromoteRights {
    fn apply<R>(&self, mut req: R) -> R
    where
        R: teloxide::payloads::PromoteChatMemberSetters,
    {
        macro_rules! flags {
            ($($flag:ident),*) => {
                $(if let Some(v) = self.$flag {
                    req = req.$flag(v);
                })*
            };
        }
        flags!(
            is_anonymous,
            can_manage_chat,
            can_post_messages,
            can_edit_messages,
            can_delete_messages,
            can_manage_video_chats,
            can_restrict_members,
            can_promote_members,
            can_change_info,
            can_invite_users,
            can_pin_messages
        );
        req
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn unix_time(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

fn markup(keyboard: Keyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn recipient(r: Recipient) -> teloxide::types::Recipient {
    match r {
        Recipient::Id(id) => teloxide::types::Recipient::Id(teloxide::types::ChatId(id.0)),
        Recipient::Username(name) => teloxide::types::Recipient::ChannelUsername(name),
    }
}

fn tg_message_id(id: MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(id.0)
}

fn current_chat(update: &Update) -> Result<teloxide::types::Recipient> {
    let chat = update.chat_id().ok_or(Error::MissingContext("chat id"))?;
    Ok(teloxide::types::Recipient::Id(teloxide::types::ChatId(chat.0)))
}

fn chat_or_current(
    update: &Update,
    explicit: Option<Recipient>,
) -> Result<teloxide::types::Recipient> {
    match explicit {
        Some(r) => Ok(recipient(r)),
        None => current_chat(update),
    }
}

fn current_message(update: &Update) -> Result<teloxide::types::MessageId> {
    update
        .message_id()
        .map(tg_message_id)
        .ok_or(Error::MissingContext("message id"))
}

fn message_or_current(
    update: &Update,
    explicit: Option<MessageId>,
) -> Result<teloxide::types::MessageId> {
    match explicit {
        Some(id) => Ok(tg_message_id(id)),
        None => current_message(update),
    }
}

fn target_user(update: &Update, explicit: Option<UserId>) -> Result<teloxide::types::UserId> {
    let user = explicit
        .or_else(|| update.user_id())
        .ok_or(Error::MissingContext("user id"))?;
    u64::try_from(user.0)
        .map(teloxide::types::UserId)
        .map_err(|_| Error::External(format!("invalid user id {}", user.0)))
}

fn chat_action(kind: ChatActionKind) -> Result<teloxide::types::ChatAction> {
    use teloxide::types::ChatAction as A;
    Ok(match kind {
        ChatActionKind::Typing => A::Typing,
        ChatActionKind::UploadPhoto => A::UploadPhoto,
        ChatActionKind::RecordVideo => A::RecordVideo,
        ChatActionKind::UploadVideo => A::UploadVideo,
        ChatActionKind::RecordVoice => A::RecordVoice,
        ChatActionKind::UploadVoice => A::UploadVoice,
        ChatActionKind::UploadDocument => A::UploadDocument,
        ChatActionKind::FindLocation => A::FindLocation,
        ChatActionKind::RecordVideoNote => A::RecordVideoNote,
        ChatActionKind::UploadVideoNote => A::UploadVideoNote,
        // Not in this Bot API binding.
        ChatActionKind::ChooseSticker => {
            return Err(Error::Unsupported("chatAction choose_sticker"))
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use nestbot_core::{domain::ChatId, Action};

    use super::*;
    use crate::testing::{click_update, text_update, FakeApi};

    async fn outbound() -> (FakeApi, TelegramOutbound) {
        let (api, bot) = FakeApi::start().await;
        (api, TelegramOutbound::new(bot))
    }

    #[test]
    fn every_chat_action_kind_is_mapped() {
        for kind in ChatActionKind::ALL {
            match chat_action(kind) {
                Ok(_) => assert_ne!(kind, ChatActionKind::ChooseSticker),
                Err(e) => {
                    assert_eq!(kind, ChatActionKind::ChooseSticker);
                    assert!(matches!(e, Error::Unsupported(_)));
                }
            }
        }
    }

    #[test]
    fn call_options_ignore_unknown_keys() {
        let call = Action::Send {
            content: "hi".into(),
            keyboard: None,
            options: Some(json!({"parse_mode": "html", "something_else": 1})),
        }
        .classify();
        let options = CallOptions::decode(&call, 2).unwrap();
        assert_eq!(options.parse_mode(), Some(ParseMode::Html));
        assert!(!options.silent());
    }

    #[tokio::test]
    async fn send_applies_message_options() {
        let (api, out) = outbound().await;
        let call = Action::Send {
            content: "<b>hi</b>".into(),
            keyboard: Some(Keyboard::new().button("Yes", "yes")),
            options: Some(json!({
                "parse_mode": "HTML",
                "reply_to_message_id": 3,
                "disable_notification": true,
            })),
        }
        .classify();
        out.perform(&text_update(1, 42, "x"), call).await.unwrap();

        let body = api.body_of("sendMessage").unwrap();
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["text"], "<b>hi</b>");
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(body["reply_to_message_id"], 3);
        assert_eq!(body["disable_notification"], true);
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "yes"
        );
    }

    #[tokio::test]
    async fn media_caption_carries_parse_mode() {
        let (api, out) = outbound().await;
        let call = Action::Send {
            content: Content::Media(Media::new(MediaKind::Photo, "photo-1").caption("*hi*")),
            keyboard: None,
            options: Some(json!({"parse_mode": "MarkdownV2"})),
        }
        .classify();
        out.perform(&text_update(1, 42, "x"), call).await.unwrap();

        let raw = api.call("sendPhoto").unwrap().raw;
        assert!(raw.contains("photo-1"));
        assert!(raw.contains("*hi*"));
        assert!(raw.contains("MarkdownV2"));
    }

    #[tokio::test]
    async fn forward_applies_call_options() {
        let (api, out) = outbound().await;
        let call = Action::Forward {
            to_chat_id: Recipient::Id(ChatId(-100)),
            options: Some(json!({"disable_notification": true, "protect_content": true})),
        }
        .classify();
        out.perform(&text_update(1, 42, "x"), call).await.unwrap();

        let body = api.body_of("forwardMessage").unwrap();
        assert_eq!(body["chat_id"], -100);
        assert_eq!(body["from_chat_id"], 42);
        assert_eq!(body["message_id"], 10);
        assert_eq!(body["disable_notification"], true);
        assert_eq!(body["protect_content"], true);
    }

    #[tokio::test]
    async fn copy_overrides_caption() {
        let (api, out) = outbound().await;
        let call = Action::Copy {
            to_chat_id: Recipient::Username("@archive".to_string()),
            keyboard: None,
            options: Some(json!({"caption": "archived"})),
        }
        .classify();
        out.perform(&text_update(1, 42, "x"), call).await.unwrap();

        let body = api.body_of("copyMessage").unwrap();
        assert_eq!(body["chat_id"], "@archive");
        assert_eq!(body["caption"], "archived");
    }

    #[tokio::test]
    async fn toast_sends_cache_time_and_url() {
        let (api, out) = outbound().await;
        let call = Action::Toast {
            text: "saved".to_string(),
            options: Some(json!({"cache_time": 30, "url": "https://t.me/nestbot?start=1"})),
        }
        .classify();
        out.perform(&click_update(1, 42, "save"), call).await.unwrap();

        let body = api.body_of("answerCallbackQuery").unwrap();
        assert_eq!(body["callback_query_id"], "cb-1");
        assert_eq!(body["text"], "saved");
        assert_eq!(body["show_alert"], false);
        assert_eq!(body["cache_time"], 30);
        assert_eq!(body["url"], "https://t.me/nestbot?start=1");
    }

    #[tokio::test]
    async fn alert_needs_a_callback_query() {
        let (api, out) = outbound().await;
        let err = out
            .perform(&text_update(1, 42, "x"), Action::alert("no").classify())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingContext("callback query")));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn commands_carry_scope_and_language() {
        let (api, out) = outbound().await;
        let update = text_update(1, 42, "x");
        let set = Action::SetMyCommands {
            commands: vec![BotCommand::new("start", "Start over")],
            scope: Some(json!({"type": "all_private_chats"})),
            language_code: Some("en".to_string()),
        }
        .classify();
        out.perform(&update, set).await.unwrap();
        let delete = Action::DeleteMyCommands {
            scope: Some(json!({"type": "chat", "chat_id": 42})),
            language_code: None,
        }
        .classify();
        out.perform(&update, delete).await.unwrap();

        let body = api.body_of("setMyCommands").unwrap();
        assert_eq!(body["commands"][0]["command"], "start");
        assert_eq!(body["scope"], json!({"type": "all_private_chats"}));
        assert_eq!(body["language_code"], "en");
        let body = api.body_of("deleteMyCommands").unwrap();
        assert_eq!(body["scope"], json!({"type": "chat", "chat_id": 42}));
        assert!(body.get("language_code").is_none());
    }

    #[tokio::test]
    async fn restrict_targets_the_given_member() {
        let (api, out) = outbound().await;
        let call = Action::Restrict {
            permissions: json!({"can_send_messages": true}),
            user_id: Some(UserId(7)),
            chat_id: Some(Recipient::Id(ChatId(-100))),
            until_date: Some(1_700_000_000),
        }
        .classify();
        out.perform(&text_update(1, 42, "x"), call).await.unwrap();

        let body = api.body_of("restrictChatMember").unwrap();
        assert_eq!(body["chat_id"], -100);
        assert_eq!(body["user_id"], 7);
        assert_eq!(body["until_date"], 1_700_000_000);
        assert_eq!(body["permissions"]["can_send_messages"], true);
    }

    #[tokio::test]
    async fn promote_sends_only_the_given_rights() {
        let (api, out) = outbound().await;
        let call = Action::Promote {
            permissions: json!({"can_pin_messages": true, "can_delete_messages": false}),
            user_id: Some(UserId(7)),
        }
        .classify();
        out.perform(&text_update(1, 42, "x"), call).await.unwrap();

        let body = api.body_of("promoteChatMember").unwrap();
        assert_eq!(body["user_id"], 7);
        assert_eq!(body["can_pin_messages"], true);
        assert_eq!(body["can_delete_messages"], false);
        assert!(body.get("can_invite_users").is_none());
    }

    #[tokio::test]
    async fn admin_title_and_chat_permissions() {
        let (api, out) = outbound().await;
        let update = text_update(1, 42, "x");
        let title = Action::AdminTitle {
            title: "keeper".to_string(),
            user_id: Some(UserId(7)),
        }
        .classify();
        out.perform(&update, title).await.unwrap();
        let perms = Action::SetChatPermissions {
            permissions: json!({"can_send_messages": true}),
        }
        .classify();
        out.perform(&update, perms).await.unwrap();

        let body = api.body_of("setChatAdministratorCustomTitle").unwrap();
        assert_eq!(body["custom_title"], "keeper");
        assert_eq!(body["user_id"], 7);
        let body = api.body_of("setChatPermissions").unwrap();
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["permissions"]["can_send_messages"], true);
    }

    #[tokio::test]
    async fn admin_rights_and_menu_button() {
        let (api, out) = outbound().await;
        let update = text_update(1, 42, "x");
        let rights = Action::SetMyDefaultAdminRights {
            rights: json!({
                "is_anonymous": false,
                "can_manage_chat": true,
                "can_delete_messages": true,
                "can_manage_video_chats": false,
                "can_restrict_members": true,
                "can_promote_members": false,
                "can_change_info": false,
                "can_invite_users": true
            }),
            for_channels: Some(true),
        }
        .classify();
        out.perform(&update, rights).await.unwrap();
        let menu = Action::SetMenuButton {
            menu_button: json!({"type": "commands"}),
            chat_id: None,
        }
        .classify();
        out.perform(&update, menu).await.unwrap();

        let body = api.body_of("setMyDefaultAdministratorRights").unwrap();
        assert_eq!(body["for_channels"], true);
        assert_eq!(body["rights"]["can_manage_chat"], true);
        let body = api.body_of("setChatMenuButton").unwrap();
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["menu_button"]["type"], "commands");
    }

    #[tokio::test]
    async fn menu_button_needs_a_numeric_chat() {
        let (api, out) = outbound().await;
        let call = Action::SetMenuButton {
            menu_button: json!({"type": "commands"}),
            chat_id: Some(Recipient::Username("@news".to_string())),
        }
        .classify();
        let err = out
            .perform(&text_update(1, 42, "x"), call)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { index: 1, .. }));
        assert!(api.calls().is_empty());
    }

    fn scratch_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("nestbot-telegram-{}-{name}", std::process::id()))
            .join("nested")
            .join("file.bin")
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn save_file_downloads_the_attached_file() {
        let (api, out) = outbound().await;
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "chat": {"id": 42, "type": "private"},
                "audio": {"file_id": "doc-1", "duration": 3}
            }
        }))
        .unwrap();
        let path = scratch_path("save-file");
        let call = Action::SaveFile {
            path: path.clone(),
            file_id: None,
        }
        .classify();
        out.perform(&update, call).await.unwrap();

        assert_eq!(api.body_of("getFile").unwrap()["file_id"], "doc-1");
        let saved = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(saved, "bytes of documents/doc-1.txt");
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn save_profile_photo_takes_the_largest_size() {
        let (api, out) = outbound().await;
        let path = scratch_path("profile");
        let call = Action::SaveProfilePhoto {
            path: path.clone(),
            index: Some(2),
        }
        .classify();
        let saved = out
            .perform(&text_update(1, 42, "x"), call)
            .await
            .unwrap();

        assert_eq!(saved, Value::Bool(true));
        let body = api.body_of("getUserProfilePhotos").unwrap();
        assert_eq!(body["user_id"], 42);
        assert_eq!(body["offset"], 2);
        assert_eq!(api.body_of("getFile").unwrap()["file_id"], "big");
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn chat_photo_is_uploaded_from_the_stored_file() {
        let (api, out) = outbound().await;
        let call = Action::SetChatPhoto {
            photo: Media::new(MediaKind::Photo, "doc-1"),
            chat_id: Some(Recipient::Id(ChatId(-100))),
        }
        .classify();
        out.perform(&text_update(1, 42, "x"), call).await.unwrap();

        let upload = api.call("setChatPhoto").unwrap();
        assert!(upload.raw.contains("bytes of documents/doc-1.txt"));
        assert!(upload.raw.contains("-100"));
    }

    #[tokio::test]
    async fn choose_sticker_is_rejected_before_any_request() {
        let (api, out) = outbound().await;
        let call = Action::ChatAction(ChatActionKind::ChooseSticker).classify();
        let err = out
            .perform(&text_update(1, 42, "x"), call)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(api.calls().is_empty());

        let typing = Action::ChatAction(ChatActionKind::Typing).classify();
        out.perform(&text_update(1, 42, "x"), typing).await.unwrap();
        assert_eq!(api.body_of("sendChatAction").unwrap()["action"], "typing");
    }
}
