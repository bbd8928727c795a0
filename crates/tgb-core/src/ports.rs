use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{model::Update, params::PollParams, Result};

/// Outcome of one `getUpdates` round trip as seen by the transport.
#[derive(Debug)]
pub struct Fetch {
    /// HTTP status of the response; `None` when no response arrived at all.
    pub status: Option<u16>,
    pub result: Result<Vec<Update>>,
}

impl Fetch {
    pub fn ok(updates: Vec<Update>) -> Self {
        Self {
            status: Some(200),
            result: Ok(updates),
        }
    }

    pub fn failed(status: Option<u16>, error: crate::Error) -> Self {
        Self {
            status,
            result: Err(error),
        }
    }
}

/// Port for executing one poll round trip (transport + envelope decoding).
///
/// Implementations must not retry internally: flood control and failures are
/// reported back so the poll loop can decide.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch_updates(&self, params: &PollParams) -> Fetch;
}

#[async_trait]
impl<T: UpdateSource + ?Sized> UpdateSource for Arc<T> {
    async fn fetch_updates(&self, params: &PollParams) -> Fetch {
        (**self).fetch_updates(params).await
    }
}

/// Structured events emitted by the polling engine.
#[derive(Clone, Debug, PartialEq)]
pub enum PollEvent {
    RoundStarted {
        offset: Option<i64>,
        timeout: u32,
        limit: u32,
        acknowledgement: bool,
    },
    RoundFinished {
        status: Option<u16>,
        updates: usize,
    },
    RoundFailed {
        status: Option<u16>,
        error: String,
    },
    RateLimited {
        retry_after: Option<Duration>,
    },
    OffsetAdvanced {
        from: Option<i64>,
        to: i64,
    },
    Acknowledged {
        offset: Option<i64>,
    },
    StreamClosed {
        delivered: u64,
    },
    SessionEnded {
        offset: Option<i64>,
        status: Option<u16>,
        error: Option<String>,
    },
}

/// Observability hook for the polling engine, kept out of its control flow.
pub trait PollObserver: Send + Sync {
    fn on_event(&self, event: &PollEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl PollObserver for NoopObserver {
    fn on_event(&self, _event: &PollEvent) {}
}

/// Forwards engine events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl PollObserver for TracingObserver {
    fn on_event(&self, event: &PollEvent) {
        match event {
            PollEvent::RoundStarted {
                offset,
                timeout,
                limit,
                acknowledgement,
            } => tracing::debug!(?offset, timeout, limit, acknowledgement, "poll round started"),
            PollEvent::RoundFinished { status, updates } => {
                tracing::debug!(?status, updates, "poll round finished")
            }
            PollEvent::RoundFailed { status, error } => {
                tracing::error!(?status, %error, "poll round failed")
            }
            PollEvent::RateLimited { retry_after } => {
                tracing::warn!(
                    retry_after_secs = retry_after.map(|d| d.as_secs()),
                    "poll round rate limited"
                )
            }
            PollEvent::OffsetAdvanced { from, to } => {
                tracing::debug!(?from, to, "offset advanced")
            }
            PollEvent::Acknowledged { offset } => {
                tracing::debug!(?offset, "offset acknowledged")
            }
            PollEvent::StreamClosed { delivered } => {
                tracing::info!(delivered, "update stream closed")
            }
            PollEvent::SessionEnded {
                offset,
                status,
                error,
            } => match error {
                Some(error) => tracing::warn!(?offset, ?status, %error, "polling session ended"),
                None => tracing::info!(?offset, ?status, "polling session ended"),
            },
        }
    }
}
