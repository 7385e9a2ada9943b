//! In-process stand-in for the Bot API, for adapter tests.

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::Uri,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use teloxide::Bot;
use tokio::net::TcpListener;

use nestbot_core::update::Update;

pub(crate) const TOKEN: &str = "123:TEST";

/// One request the fake server received. `method` is lowercased; `body` is
/// `Null` for multipart uploads, which only keep `raw`.
#[derive(Clone, Debug)]
pub(crate) struct Recorded {
    pub method: String,
    pub body: Value,
    pub raw: String,
}

#[derive(Clone, Default)]
pub(crate) struct FakeApi {
    calls: Arc<Mutex<Vec<Recorded>>>,
    pending: Arc<Mutex<Vec<Value>>>,
}

impl FakeApi {
    /// Serve on an ephemeral port; the returned bot talks to it.
    pub async fn start() -> (Self, Bot) {
        let api = FakeApi::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(serve).with_state(api.clone());
        tokio::spawn(async move { axum::serve(listener, app).await });
        let url = reqwest::Url::parse(&format!("http://{addr}/")).unwrap();
        (api, Bot::new(TOKEN).set_api_url(url))
    }

    /// Queue updates for the next `getUpdates`.
    pub fn push_updates(&self, updates: Vec<Value>) {
        self.pending.lock().unwrap().extend(updates);
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    /// First call to `method` (case-insensitive).
    pub fn call(&self, method: &str) -> Option<Recorded> {
        let method = method.to_ascii_lowercase();
        self.calls().into_iter().find(|c| c.method == method)
    }

    pub fn body_of(&self, method: &str) -> Option<Value> {
        self.call(method).map(|c| c.body)
    }

    fn result_for(&self, method: &str) -> Value {
        match method {
            "getupdates" => Value::Array(std::mem::take(&mut *self.pending.lock().unwrap())),
            "sendmessage" | "sendphoto" | "forwardmessage" | "editmessagetext" => json!({
                "message_id": 77,
                "date": 0,
                "chat": {"id": 42, "type": "private", "first_name": "Test"},
                "text": "ok"
            }),
            "copymessage" => json!({"message_id": 78}),
            "getfile" => json!({
                "file_id": "doc-1",
                "file_unique_id": "u-doc-1",
                "file_size": 5,
                "file_path": "documents/doc-1.txt"
            }),
            "getuserprofilephotos" => json!({
                "total_count": 1,
                "photos": [[
                    {"file_id": "small", "file_unique_id": "s", "width": 90, "height": 90},
                    {"file_id": "big", "file_unique_id": "b", "width": 640, "height": 640}
                ]]
            }),
            _ => Value::Bool(true),
        }
    }
}

async fn serve(State(api): State<FakeApi>, uri: Uri, body: Bytes) -> Response {
    let path = uri.path();
    if let Some(file) = path.strip_prefix(&format!("/file/bot{TOKEN}/")) {
        return format!("bytes of {file}").into_response();
    }
    let method = path.rsplit('/').next().unwrap_or_default().to_ascii_lowercase();
    api.calls.lock().unwrap().push(Recorded {
        method: method.clone(),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        raw: String::from_utf8_lossy(&body).into_owned(),
    });
    Json(json!({"ok": true, "result": api.result_for(&method)})).into_response()
}

/// Text message from user `user` in their private chat.
pub(crate) fn text_update(update_id: i64, user: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "message": {
            "message_id": 10,
            "date": 0,
            "from": {"id": user, "is_bot": false, "first_name": "Test"},
            "chat": {"id": user, "type": "private"},
            "text": text
        }
    }))
    .unwrap()
}

/// Inline button press by `user` on message 5 of their private chat.
pub(crate) fn click_update(update_id: i64, user: i64, data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "callback_query": {
            "id": format!("cb-{update_id}"),
            "from": {"id": user, "is_bot": false, "first_name": "Test"},
            "message": {
                "message_id": 5,
                "date": 0,
                "chat": {"id": user, "type": "private"}
            },
            "data": data
        }
    }))
    .unwrap()
}
