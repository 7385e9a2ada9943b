//! Built-in routing middlewares.
//!
//! Each constructor returns a predicate that proceeds when the update has the
//! expected shape and rejects otherwise, handing the update to the next
//! candidate handler.

use crate::{
    chain::{middleware_fn, Flow, FnMiddleware},
    messaging::types::MediaKind,
    params::ParamsBag,
    update::{Message, Update},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageSubtype {
    Edit,
    Post,
    EditPost,
}

/// Boxed predicate middleware returned by the constructors below.
pub type Listener = FnMiddleware<Box<dyn Fn(&Update, &mut ParamsBag) -> Flow + Send + Sync>>;

fn listener<F>(f: F) -> Listener
where
    F: Fn(&Update, &mut ParamsBag) -> Flow + Send + Sync + 'static,
{
    middleware_fn(Box::new(f))
}

fn flow(ok: bool) -> Flow {
    if ok {
        Flow::Proceed
    } else {
        Flow::Reject
    }
}

/// Every update.
pub fn any() -> Listener {
    listener(|_: &Update, _: &mut ParamsBag| Flow::Proceed)
}

/// A bot command, optionally a specific one (`command(Some("start"))`).
pub fn command(name: Option<&str>) -> Listener {
    let expected = name.map(|n| format!("/{}", n.trim_start_matches('/')));
    listener(move |update: &Update, _: &mut ParamsBag| {
        let Some(msg) = update.message.as_ref().filter(|m| m.text.is_some()) else {
            return Flow::Reject;
        };
        let Some(entity) = msg.entity("bot_command") else {
            return Flow::Reject;
        };
        let Some(expected) = &expected else {
            return Flow::Proceed;
        };
        let token = msg.entity_text(entity).unwrap_or_default();
        let bare = token.split('@').next().unwrap_or_default();
        flow(bare == expected)
    })
}

/// A text message, optionally with exactly this text.
pub fn text(exact: Option<&str>) -> Listener {
    let exact = exact.map(str::to_string);
    listener(move |update: &Update, _: &mut ParamsBag| {
        let Some(text) = update.message.as_ref().and_then(|m| m.text.as_deref()) else {
            return Flow::Reject;
        };
        flow(exact.as_deref().map_or(true, |e| e == text))
    })
}

/// A text message carrying an entity, optionally of this kind (`"hashtag"`).
pub fn entity(kind: Option<&str>) -> Listener {
    let kind = kind.map(str::to_string);
    listener(move |update: &Update, _: &mut ParamsBag| {
        let Some(msg) = update.message.as_ref().filter(|m| m.text.is_some()) else {
            return Flow::Reject;
        };
        flow(match &kind {
            Some(k) => msg.entity(k).is_some(),
            None => !msg.entities.is_empty(),
        })
    })
}

/// A new message, or one of the edit/post subtypes.
pub fn message(subtype: Option<MessageSubtype>) -> Listener {
    listener(move |update: &Update, _: &mut ParamsBag| {
        flow(match subtype {
            None => update.message.is_some(),
            Some(MessageSubtype::Edit) => update.edited_message.is_some(),
            Some(MessageSubtype::Post) => update.channel_post.is_some(),
            Some(MessageSubtype::EditPost) => update.edited_channel_post.is_some(),
        })
    })
}

/// A click on an inline button with this callback data.
pub fn click(button_id: &str) -> Listener {
    let button_id = button_id.to_string();
    listener(move |update: &Update, _: &mut ParamsBag| {
        flow(update.callback_data() == Some(button_id.as_str()))
    })
}

fn has_media(msg: &Message, kind: MediaKind) -> bool {
    match kind {
        MediaKind::Photo => msg.photo.is_some(),
        MediaKind::Video => msg.video.is_some(),
        MediaKind::Audio => msg.audio.is_some(),
        MediaKind::Document => msg.document.is_some(),
        MediaKind::Voice => msg.voice.is_some(),
        MediaKind::Animation => msg.animation.is_some(),
        MediaKind::VideoNote => msg.video_note.is_some(),
        MediaKind::Sticker => msg.sticker.is_some(),
    }
}

/// A message with this media kind; any of audio/video/photo when unspecified.
pub fn media(kind: Option<MediaKind>) -> Listener {
    listener(move |update: &Update, _: &mut ParamsBag| {
        let Some(msg) = update.message.as_ref() else {
            return Flow::Reject;
        };
        flow(match kind {
            Some(k) => has_media(msg, k),
            None => [MediaKind::Audio, MediaKind::Video, MediaKind::Photo]
                .into_iter()
                .any(|k| has_media(msg, k)),
        })
    })
}

/// A forwarded message.
pub fn forward() -> Listener {
    listener(|update: &Update, _: &mut ParamsBag| {
        flow(
            update
                .message
                .as_ref()
                .and_then(|m| m.forward_date)
                .is_some(),
        )
    })
}
