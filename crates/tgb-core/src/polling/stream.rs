use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    model::Update,
    params::PollParams,
    polling::{
        driver::{run_session, BatchHandler, PollReport, Step},
        offset::OffsetTracker,
    },
    ports::{PollEvent, PollObserver, TracingObserver, UpdateSource},
};

/// Batch handler that publishes updates one at a time onto a channel.
///
/// Cancellation is checked at the start of every batch and before every
/// hand-off. A hand-off blocked on a full channel also yields to it; the update
/// in hand is then dropped. On an early stop the offset never passes the lowest
/// undelivered identifier, even in an unordered batch. A consumer that drops its
/// receiver counts as cancellation.
pub struct ChannelSink<'a> {
    output: Option<mpsc::Sender<Update>>,
    cancel: CancellationToken,
    observer: &'a dyn PollObserver,
    delivered: u64,
}

impl<'a> ChannelSink<'a> {
    pub fn new(
        output: mpsc::Sender<Update>,
        cancel: CancellationToken,
        observer: &'a dyn PollObserver,
    ) -> Self {
        Self {
            output: Some(output),
            cancel,
            observer,
            delivered: 0,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_closed(&self) -> bool {
        self.output.is_none()
    }

    fn close(&mut self) {
        if let Some(tx) = self.output.take() {
            drop(tx);
            self.observer.on_event(&PollEvent::StreamClosed {
                delivered: self.delivered,
            });
        }
    }

    async fn deliver(&mut self, update: Update) -> bool {
        let Some(tx) = self.output.as_ref() else {
            return false;
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = tx.send(update) => sent.is_ok(),
        }
    }
}

#[async_trait]
impl<'a> BatchHandler for ChannelSink<'a> {
    async fn handle(&mut self, updates: Vec<Update>, offset: Option<i64>) -> Step {
        let mut tracker = OffsetTracker::new(offset);
        let ids: Vec<i64> = updates.iter().map(|u| u.update_id).collect();

        if self.cancel.is_cancelled() || self.is_closed() {
            self.close();
            return Step::Stop(stop_offset(tracker.current(), &ids));
        }

        for (i, update) in updates.into_iter().enumerate() {
            if self.cancel.is_cancelled() || !self.deliver(update).await {
                self.close();
                return Step::Stop(stop_offset(tracker.current(), &ids[i..]));
            }
            self.delivered += 1;
            tracker.observe(ids[i]);
        }

        Step::Continue(tracker.current())
    }

    async fn finish(&mut self) {
        self.close();
    }
}

/// Offset to stop at: never past the lowest update still undelivered.
fn stop_offset(running: Option<i64>, undelivered: &[i64]) -> Option<i64> {
    match (running, undelivered.iter().min()) {
        (Some(r), Some(&lowest)) => Some(r.min(lowest)),
        (running, _) => running,
    }
}

/// Stream updates onto `output` until `cancel` fires, using the tracing observer.
pub async fn poll_to_channel(
    source: &dyn UpdateSource,
    params: PollParams,
    output: mpsc::Sender<Update>,
    cancel: CancellationToken,
) -> PollReport {
    let observer = TracingObserver;
    let mut sink = ChannelSink::new(output, cancel, &observer);
    run_session(source, &observer, params, &mut sink).await
}
