use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use tgb_core::{model::Update, params::SendMessageParams};
use tgb_http::BotClient;

/// The reply for an update, if it is a text message.
pub fn reply_for(update: &Update) -> Option<SendMessageParams> {
    let message = update.message()?;
    let text = message.text.as_deref()?;
    Some(
        SendMessageParams::new(message.chat.id, format!("Echo {text}"))
            .reply_to(message.message_id.0),
    )
}

/// Seconds between the message being sent and `now`.
pub fn lag_secs(update: &Update, now: DateTime<Utc>) -> Option<i64> {
    let sent = update.message()?.sent_at()?;
    Some((now - sent).num_seconds().max(0))
}

/// Answer every text message until the channel closes.
///
/// A flood-controlled reply is dropped, not retried.
pub async fn run(client: &BotClient, mut updates: mpsc::Receiver<Update>) {
    while let Some(update) = updates.recv().await {
        let Some(reply) = reply_for(&update) else {
            tracing::debug!(
                update_id = update.update_id,
                kind = update.payload.field_name().unwrap_or("none"),
                "skipping update"
            );
            continue;
        };

        tracing::info!(
            update_id = update.update_id,
            chat_id = reply.chat_id.0,
            lag_secs = lag_secs(&update, Utc::now()).unwrap_or_default(),
            "echoing message"
        );

        match client.send_message(&reply).await {
            Ok(_) => {}
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(
                    chat_id = reply.chat_id.0,
                    retry_after = ?e.retry_after(),
                    "reply dropped by flood control"
                );
            }
            Err(e) => tracing::warn!(chat_id = reply.chat_id.0, "sendMessage failed: {e}"),
        }
    }
}
