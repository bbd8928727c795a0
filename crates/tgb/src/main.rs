mod echo;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tgb_core::{config::Config, polling::Poller};
use tgb_http::BotClient;

/// Wait used when flood control gives no `retry_after`.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tgb_core::logging::init("tgb")?;

    // Optional first argument: path to a file holding the bot token.
    let token_file = std::env::args_os().nth(1).map(PathBuf::from);
    let cfg =
        Config::load_with_token_file(token_file.as_deref()).context("loading configuration")?;

    let client = Arc::new(BotClient::from_config(&cfg)?);
    let me = client.get_me().await.context("getMe")?;
    tracing::info!(bot = %me.display_name(), api = client.redacted_url(), "tgb started");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                cancel.cancel();
            }
        }
    });

    let poller = Poller::new(client.clone());
    let mut params = cfg.poll_params();
    loop {
        let (tx, rx) = mpsc::channel(cfg.channel_capacity);
        let session = tokio::spawn({
            let poller = poller.clone();
            let params = params.clone();
            let cancel = cancel.clone();
            async move { poller.poll_to_channel(params, tx, cancel).await }
        });

        echo::run(&client, rx).await;
        let report = session.await.context("polling task failed")?;
        params.offset = report.offset.or(params.offset);

        if report.is_rate_limited() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let wait = report.retry_after().unwrap_or(DEFAULT_BACKOFF);
            tracing::warn!(
                wait_secs = wait.as_secs(),
                offset = ?params.offset,
                "flood control, restarting polling later"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(wait) => continue,
            }
        }

        let offset = report.into_result().context("polling stopped")?;
        tracing::info!(?offset, "tgb stopped");
        return Ok(());
    }
}
