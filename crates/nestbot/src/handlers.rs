//! Demo bot: a start menu, a per-user counter and a small checkout flow.

use async_trait::async_trait;
use tracing::debug;

use nestbot_core::{
    action::{Action, Reply},
    chain::{handler_fn, middleware_fn, Flow, HandlerContext, Middleware},
    dispatcher::DispatcherBuilder,
    listen,
    messaging::{port::Answer, types::Keyboard},
    params::ParamsBag,
    registry::HandlerRecord,
    update::Update,
    Result,
};

const CHECKOUT: &str = "checkout";
const ITEMS: [&str; 3] = ["apples", "pears", "plums"];

/// Proceeds for callback data `<prefix><value>`, leaving `value` under
/// `key` in the params bag.
struct CallbackArg {
    prefix: &'static str,
    key: &'static str,
}

#[async_trait]
impl Middleware for CallbackArg {
    async fn handle(
        &self,
        update: &Update,
        _answer: &Answer,
        params: &mut ParamsBag,
    ) -> Result<Flow> {
        let Some(value) = update
            .callback_data()
            .and_then(|d| d.strip_prefix(self.prefix))
        else {
            return Ok(Flow::Reject);
        };
        params.insert(self.key, value)?;
        Ok(Flow::Proceed)
    }
}

fn menu() -> Keyboard {
    Keyboard::new().button("Count", "count").button("Shop", "shop")
}

fn item_keyboard() -> Keyboard {
    let options: Vec<(String, String)> = ITEMS
        .iter()
        .map(|item| (item.to_string(), format!("item:{item}")))
        .collect();
    let mut keyboard = Keyboard::one_per_row(&options, 20);
    keyboard.rows.push(Vec::new());
    keyboard.button("Done", "done")
}

pub fn register(builder: DispatcherBuilder) -> DispatcherBuilder {
    builder
        .scope(CHECKOUT)
        .handler(
            HandlerRecord::new(
                "trace",
                handler_fn(|cx: HandlerContext| async move {
                    debug!(user = ?cx.update().user_id(), "update seen");
                    Ok(None)
                }),
            )
            .middleware(listen::any())
            .continue_after_match(),
        )
        .handler(
            HandlerRecord::new(
                "start",
                handler_fn(|_cx: HandlerContext| async move {
                    Ok(Some(Reply::new(Action::send_with_keyboard(
                        "Hi! Pick something.",
                        menu(),
                    ))))
                }),
            )
            .middleware(listen::command(Some("start"))),
        )
        .handler(
            HandlerRecord::new(
                "help",
                handler_fn(|_cx: HandlerContext| async move {
                    Ok(Some(Reply::text(
                        "/start - menu\n/shop - start shopping\n/cancel - leave the shop",
                    )))
                }),
            )
            .middleware(listen::command(Some("help"))),
        )
        .handler(
            HandlerRecord::new(
                "count",
                handler_fn(|cx: HandlerContext| async move {
                    let state = cx.state()?;
                    let count = state.get_as::<u64>("count").await.unwrap_or(0) + 1;
                    state.set("count", count).await?;
                    Ok(Some(
                        Reply::new(Action::toast(format!("Count: {count}")))
                            .then(Action::edit(format!("You pressed Count {count} time(s)."))),
                    ))
                }),
            )
            .middleware(listen::click("count"))
            .with_state(),
        )
        .handler(
            HandlerRecord::new(
                "shop",
                handler_fn(|cx: HandlerContext| async move {
                    cx.enter_scope(CHECKOUT).await?;
                    Ok(None)
                }),
            )
            .middleware(middleware_fn(|update: &Update, _: &mut ParamsBag| {
                let by_command = update.command().as_deref() == Some("/shop");
                if by_command || update.callback_data() == Some("shop") {
                    Flow::Proceed
                } else {
                    Flow::Reject
                }
            })),
        )
        .handler(
            HandlerRecord::new(
                "echo",
                handler_fn(|cx: HandlerContext| async move {
                    Ok(cx.update().text().map(Reply::text))
                }),
            )
            .middleware(listen::text(None)),
        )
        // Checkout scope.
        .handler(
            HandlerRecord::new(
                "checkout_welcome",
                handler_fn(|cx: HandlerContext| async move {
                    cx.state()?.set("cart", Vec::<String>::new()).await?;
                    Ok(Some(Reply::new(Action::send_with_keyboard(
                        "What would you like?",
                        item_keyboard(),
                    ))))
                }),
            )
            .scope(CHECKOUT)
            .on_enter()
            .with_state(),
        )
        .handler(
            HandlerRecord::new(
                "checkout_item",
                handler_fn(|cx: HandlerContext| async move {
                    let item: String = cx.params().get_as("item").unwrap_or_default();
                    let state = cx.state()?;
                    let mut cart: Vec<String> = state.get_as("cart").await.unwrap_or_default();
                    cart.push(item.clone());
                    state.set("cart", &cart).await?;
                    Ok(Some(Reply::new(Action::toast(format!(
                        "Added {item} ({} in cart)",
                        cart.len()
                    )))))
                }),
            )
            .scope(CHECKOUT)
            .middleware(CallbackArg {
                prefix: "item:",
                key: "item",
            })
            .with_state(),
        )
        .handler(
            HandlerRecord::new(
                "checkout_done",
                handler_fn(|cx: HandlerContext| async move {
                    let cart: Vec<String> = cx.state()?.get_as("cart").await.unwrap_or_default();
                    cx.leave_scope().await?;
                    let summary = if cart.is_empty() {
                        "Nothing bought.".to_string()
                    } else {
                        format!("Bought: {}", cart.join(", "))
                    };
                    Ok(Some(Reply::new(Action::toast("Thanks!")).then(Action::edit(summary))))
                }),
            )
            .scope(CHECKOUT)
            .middleware(listen::click("done"))
            .with_state(),
        )
        .handler(
            HandlerRecord::new(
                "checkout_cancel",
                handler_fn(|cx: HandlerContext| async move {
                    cx.leave_scope().await?;
                    Ok(Some(Reply::text("Left the shop.")))
                }),
            )
            .scope(CHECKOUT)
            .middleware(listen::command(Some("cancel"))),
        )
        .handler(
            HandlerRecord::new(
                "checkout_hint",
                handler_fn(|_cx: HandlerContext| async move {
                    Ok(Some(Reply::text("Pick an item, or /cancel.")))
                }),
            )
            .scope(CHECKOUT)
            .middleware(listen::any()),
        )
}
