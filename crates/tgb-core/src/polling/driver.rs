use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::Error,
    model::Update,
    params::PollParams,
    polling::{
        offset::OffsetTracker,
        round::{round, RoundOutcome},
        stream::ChannelSink,
    },
    ports::{PollEvent, PollObserver, TracingObserver, UpdateSource},
    Result,
};

/// Decision returned by a batch handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue(Option<i64>),
    Stop(Option<i64>),
}

impl Step {
    /// Continue past every update in `batch` (highest id + 1), or stay at `current`.
    pub fn continue_after(batch: &[Update], current: Option<i64>) -> Self {
        Step::Continue(OffsetTracker::boundary(batch).or(current))
    }

    pub fn offset(self) -> Option<i64> {
        match self {
            Step::Continue(o) | Step::Stop(o) => o,
        }
    }

    pub fn should_continue(self) -> bool {
        matches!(self, Step::Continue(_))
    }
}

/// Caller-supplied reducer: owns per-update business logic and the stop decision.
///
/// The loop never looks inside payloads; it only stores the offset the handler
/// returns (clamped so it never moves backwards).
#[async_trait]
pub trait BatchHandler: Send {
    async fn handle(&mut self, updates: Vec<Update>, offset: Option<i64>) -> Step;

    /// Called exactly once when the session leaves the polling state, before
    /// the acknowledgement round.
    async fn finish(&mut self) {}
}

/// Adapter turning a plain closure into a [`BatchHandler`].
pub struct FnHandler<F>(F);

pub fn from_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(Vec<Update>, Option<i64>) -> Step + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F> BatchHandler for FnHandler<F>
where
    F: FnMut(Vec<Update>, Option<i64>) -> Step + Send,
{
    async fn handle(&mut self, updates: Vec<Update>, offset: Option<i64>) -> Step {
        (self.0)(updates, offset)
    }
}

/// How a polling session ended.
#[derive(Debug)]
pub struct PollReport {
    /// Last committed offset; seed the next session with it.
    pub offset: Option<i64>,
    /// Transport status of the last round issued (acknowledgement included).
    pub status: Option<u16>,
    /// Polling rounds issued, not counting the acknowledgement.
    pub rounds: u32,
    /// Terminal error of the polling state, if any.
    pub error: Option<Error>,
    /// Failure of the acknowledgement round, kept apart from `error`.
    pub ack_error: Option<Error>,
}

impl PollReport {
    pub fn is_rate_limited(&self) -> bool {
        self.error.as_ref().is_some_and(Error::is_rate_limited)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.error.as_ref().and_then(Error::retry_after)
    }

    /// Collapse into a single result; an acknowledgement failure never hides the primary cause.
    pub fn into_result(self) -> Result<Option<i64>> {
        match (self.error, self.ack_error) {
            (None, None) => Ok(self.offset),
            (Some(cause), None) => Err(cause),
            (None, Some(ack)) => Err(Error::Unacknowledged(Box::new(ack))),
            (Some(cause), Some(ack)) => Err(Error::AlsoUnacknowledged {
                cause: Box::new(cause),
                ack: Box::new(ack),
            }),
        }
    }
}

/// Drives polling sessions against one update source.
#[derive(Clone)]
pub struct Poller {
    source: Arc<dyn UpdateSource>,
    observer: Arc<dyn PollObserver>,
}

impl Poller {
    pub fn new(source: Arc<dyn UpdateSource>) -> Self {
        Self {
            source,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PollObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Poll until `handler` stops or a round fails.
    pub async fn poll_with(
        &self,
        params: PollParams,
        handler: &mut (dyn BatchHandler + '_),
    ) -> PollReport {
        run_session(&*self.source, &*self.observer, params, handler).await
    }

    /// Poll and publish updates one by one on `output` until `cancel` fires.
    ///
    /// `output` is closed exactly once when the session ends, whatever the reason.
    pub async fn poll_to_channel(
        &self,
        params: PollParams,
        output: mpsc::Sender<Update>,
        cancel: CancellationToken,
    ) -> PollReport {
        let mut sink = ChannelSink::new(output, cancel, &*self.observer);
        run_session(&*self.source, &*self.observer, params, &mut sink).await
    }
}

/// Callback-driven polling with the default tracing observer.
pub async fn poll_with_callback(
    source: &dyn UpdateSource,
    params: PollParams,
    handler: &mut (dyn BatchHandler + '_),
) -> PollReport {
    run_session(source, &TracingObserver, params, handler).await
}

pub(crate) async fn run_session(
    source: &dyn UpdateSource,
    observer: &dyn PollObserver,
    mut params: PollParams,
    handler: &mut (dyn BatchHandler + '_),
) -> PollReport {
    let mut tracker = OffsetTracker::new(params.offset);

    if let Err(e) = params.validate() {
        handler.finish().await;
        return end_session(
            observer,
            PollReport {
                offset: tracker.current(),
                status: None,
                rounds: 0,
                error: Some(e),
                ack_error: None,
            },
        );
    }

    let mut status = None;
    let mut rounds: u32 = 0;
    let mut error = None;

    loop {
        rounds = rounds.saturating_add(1);
        match round(source, &params, observer, false).await {
            RoundOutcome::Delivered {
                status: s,
                updates,
            } => {
                status = s;
                let before = tracker.current();
                let step = handler.handle(updates, before).await;
                if tracker.commit(step.offset()) {
                    if let Some(to) = tracker.current() {
                        observer.on_event(&PollEvent::OffsetAdvanced { from: before, to });
                    }
                }
                params.offset = tracker.current();
                if !step.should_continue() {
                    break;
                }
            }
            RoundOutcome::RateLimited { status: s, error: e }
            | RoundOutcome::Failed { status: s, error: e } => {
                status = s;
                error = Some(e);
                break;
            }
        }
    }

    handler.finish().await;

    // Another request right after flood control would only earn a longer ban.
    let rate_limited = error.as_ref().is_some_and(Error::is_rate_limited);
    let mut ack_error = None;
    if !rate_limited {
        let ack = params.acknowledgement();
        match round(source, &ack, observer, true).await {
            RoundOutcome::Delivered { status: s, .. } => {
                status = s;
                observer.on_event(&PollEvent::Acknowledged { offset: ack.offset });
            }
            RoundOutcome::RateLimited { status: s, error: e }
            | RoundOutcome::Failed { status: s, error: e } => {
                status = s;
                ack_error = Some(e);
            }
        }
    }

    end_session(
        observer,
        PollReport {
            offset: tracker.current(),
            status,
            rounds,
            error,
            ack_error,
        },
    )
}

fn end_session(observer: &dyn PollObserver, report: PollReport) -> PollReport {
    let error = match (&report.error, &report.ack_error) {
        (Some(e), _) => Some(e.to_string()),
        (None, Some(ack)) => Some(format!("failed to acknowledge offset: {ack}")),
        (None, None) => None,
    };
    observer.on_event(&PollEvent::SessionEnded {
        offset: report.offset,
        status: report.status,
        error,
    });
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::testing::{ids, updates, RecordingObserver, ScriptedSource};
    use crate::ports::Fetch;
    use std::time::Duration;

    fn poller(source: &Arc<ScriptedSource>, observer: &Arc<RecordingObserver>) -> Poller {
        Poller::new(source.clone()).with_observer(observer.clone())
    }

    #[tokio::test]
    async fn advances_to_max_plus_one_not_last_plus_one() {
        let source = Arc::new(ScriptedSource::new(vec![
            Fetch::ok(updates(&[10, 12, 11])),
            Fetch::ok(updates(&[13])),
        ]));
        let observer = Arc::new(RecordingObserver::default());

        let mut batches = 0;
        let mut handler = from_fn(|batch: Vec<Update>, current| {
            batches += 1;
            let step = Step::continue_after(&batch, current);
            if batches == 2 {
                Step::Stop(step.offset())
            } else {
                step
            }
        });
        let report = poller(&source, &observer)
            .poll_with(PollParams::default(), &mut handler)
            .await;

        let seen = source.seen();
        assert_eq!(seen[0].offset, None);
        assert_eq!(seen[1].offset, Some(13));
        assert_eq!(report.offset, Some(14));
        assert_eq!(report.rounds, 2);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn offsets_seen_by_the_source_never_decrease() {
        let source = Arc::new(ScriptedSource::new(vec![
            Fetch::ok(updates(&[3, 4])),
            Fetch::ok(Vec::new()),
            Fetch::ok(updates(&[5])),
            Fetch::ok(updates(&[6, 7])),
        ]));
        let observer = Arc::new(RecordingObserver::default());

        // A misbehaving reducer that tries to rewind every other round.
        let mut n = 0;
        let mut handler = from_fn(|batch: Vec<Update>, current| {
            n += 1;
            match n {
                4 => Step::Stop(OffsetTracker::boundary(&batch)),
                _ if n % 2 == 0 => Step::Continue(Some(0)),
                _ => Step::continue_after(&batch, current),
            }
        });
        let report = poller(&source, &observer)
            .poll_with(PollParams::default(), &mut handler)
            .await;

        let offsets: Vec<Option<i64>> = source.seen().iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![None, Some(5), Some(5), Some(6), Some(8)]);
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(report.offset, Some(8));
    }

    #[tokio::test]
    async fn empty_rounds_keep_the_offset() {
        let source = Arc::new(ScriptedSource::new(vec![
            Fetch::ok(Vec::new()),
            Fetch::ok(Vec::new()),
        ]));
        let observer = Arc::new(RecordingObserver::default());

        let mut calls = 0;
        let mut handler = from_fn(|batch: Vec<Update>, current| {
            calls += 1;
            assert!(batch.is_empty());
            if calls == 2 {
                Step::Stop(current)
            } else {
                Step::continue_after(&batch, current)
            }
        });
        let report = poller(&source, &observer)
            .poll_with(PollParams::default().with_offset(7), &mut handler)
            .await;

        assert!(source.seen().iter().all(|p| p.offset == Some(7)));
        assert_eq!(report.offset, Some(7));
        assert_eq!(
            observer.count(|e| matches!(e, PollEvent::OffsetAdvanced { .. })),
            0
        );
    }

    #[tokio::test]
    async fn stop_issues_exactly_one_acknowledgement_with_latest_offset() {
        let source = Arc::new(ScriptedSource::new(vec![Fetch::ok(updates(&[20, 21]))]));
        let observer = Arc::new(RecordingObserver::default());

        let mut handler =
            from_fn(|batch: Vec<Update>, _| Step::Stop(OffsetTracker::boundary(&batch)));
        let report = poller(&source, &observer)
            .poll_with(PollParams::default().with_timeout(25), &mut handler)
            .await;

        let acks = source.acknowledgements();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].offset, Some(22));
        assert_eq!(source.seen().len(), 2);
        assert_eq!(report.status, Some(200));
        assert!(report.into_result().is_ok());
        assert_eq!(
            observer.count(|e| matches!(e, PollEvent::Acknowledged { offset: Some(22) })),
            1
        );
    }

    #[tokio::test]
    async fn rate_limit_stops_without_acknowledgement() {
        let source = Arc::new(ScriptedSource::new(vec![
            Fetch::ok(updates(&[1])),
            Fetch::failed(
                Some(429),
                Error::RateLimited {
                    retry_after: Some(Duration::from_secs(9)),
                    description: "Too Many Requests: retry after 9".to_string(),
                },
            ),
        ]));
        let observer = Arc::new(RecordingObserver::default());

        let mut handler = from_fn(|batch: Vec<Update>, current| {
            Step::continue_after(&batch, current)
        });
        let report = poller(&source, &observer)
            .poll_with(PollParams::default(), &mut handler)
            .await;

        assert_eq!(source.seen().len(), 2, "no rounds after flood control");
        assert!(source.acknowledgements().is_empty());
        assert!(report.is_rate_limited());
        assert_eq!(report.retry_after(), Some(Duration::from_secs(9)));
        assert_eq!(report.status, Some(429));
        assert_eq!(report.offset, Some(2));
        assert!(report.ack_error.is_none());
    }

    #[tokio::test]
    async fn bare_429_status_is_rate_limited() {
        let source = Arc::new(ScriptedSource::new(vec![Fetch {
            status: Some(429),
            result: Ok(Vec::new()),
        }]));
        let observer = Arc::new(RecordingObserver::default());

        let mut handler = from_fn(|_: Vec<Update>, current| Step::Continue(current));
        let report = poller(&source, &observer)
            .poll_with(PollParams::default(), &mut handler)
            .await;

        assert!(report.is_rate_limited());
        assert_eq!(source.seen().len(), 1);
        assert_eq!(
            observer.count(|e| matches!(e, PollEvent::RateLimited { retry_after: None })),
            1
        );
    }

    #[tokio::test]
    async fn hard_error_aborts_and_still_acknowledges() {
        let source = Arc::new(ScriptedSource::new(vec![
            Fetch::ok(updates(&[40])),
            Fetch::failed(None, Error::Transport("connection reset".to_string())),
        ]));
        let observer = Arc::new(RecordingObserver::default());

        let mut handler = from_fn(|batch: Vec<Update>, current| {
            Step::continue_after(&batch, current)
        });
        let report = poller(&source, &observer)
            .poll_with(PollParams::default(), &mut handler)
            .await;

        let acks = source.acknowledgements();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].offset, Some(41));
        assert!(matches!(report.error, Some(Error::Transport(_))));
        assert_eq!(report.rounds, 2);
    }

    #[tokio::test]
    async fn acknowledgement_failure_does_not_mask_primary_cause() {
        let source = Arc::new(ScriptedSource::new(vec![
            Fetch::failed(
                Some(401),
                Error::Rejected {
                    status: Some(401),
                    error_code: Some(401),
                    description: "Unauthorized".to_string(),
                },
            ),
            Fetch::failed(None, Error::Transport("connection refused".to_string())),
        ]));
        let observer = Arc::new(RecordingObserver::default());

        let mut handler = from_fn(|_: Vec<Update>, current| Step::Continue(current));
        let report = poller(&source, &observer)
            .poll_with(PollParams::default(), &mut handler)
            .await;

        assert!(matches!(report.error, Some(Error::Rejected { .. })));
        assert!(matches!(report.ack_error, Some(Error::Transport(_))));
        match report.into_result() {
            Err(Error::AlsoUnacknowledged { cause, ack }) => {
                assert!(matches!(*cause, Error::Rejected { .. }));
                assert!(matches!(*ack, Error::Transport(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn acknowledgement_failure_alone_is_reported() {
        let source = Arc::new(ScriptedSource::new(vec![
            Fetch::ok(updates(&[1])),
            Fetch::failed(None, Error::Transport("timed out".to_string())),
        ]));
        let observer = Arc::new(RecordingObserver::default());

        let mut handler =
            from_fn(|batch: Vec<Update>, _| Step::Stop(OffsetTracker::boundary(&batch)));
        let report = poller(&source, &observer)
            .poll_with(PollParams::default(), &mut handler)
            .await;

        assert!(report.error.is_none());
        assert!(matches!(
            report.into_result(),
            Err(Error::Unacknowledged(_))
        ));
    }

    #[tokio::test]
    async fn invalid_params_fail_before_any_round() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let observer = Arc::new(RecordingObserver::default());

        let mut handler = from_fn(|_: Vec<Update>, current| Step::Continue(current));
        let report = poller(&source, &observer)
            .poll_with(PollParams::default().with_limit(0), &mut handler)
            .await;

        assert!(source.seen().is_empty());
        assert!(matches!(report.error, Some(Error::Config(_))));
        assert_eq!(report.rounds, 0);
    }

    #[tokio::test]
    async fn observer_sees_session_lifecycle() {
        let source = Arc::new(ScriptedSource::new(vec![Fetch::ok(updates(&[5]))]));
        let observer = Arc::new(RecordingObserver::default());

        let mut handler =
            from_fn(|batch: Vec<Update>, _| Step::Stop(OffsetTracker::boundary(&batch)));
        let _ = poller(&source, &observer)
            .poll_with(PollParams::default(), &mut handler)
            .await;

        let events = observer.events();
        assert!(matches!(
            events.first(),
            Some(PollEvent::RoundStarted {
                acknowledgement: false,
                ..
            })
        ));
        assert!(events.contains(&PollEvent::OffsetAdvanced {
            from: None,
            to: 6
        }));
        assert!(events.contains(&PollEvent::RoundStarted {
            offset: Some(6),
            timeout: 0,
            limit: 1,
            acknowledgement: true,
        }));
        assert!(matches!(
            events.last(),
            Some(PollEvent::SessionEnded {
                offset: Some(6),
                error: None,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn free_function_entry_point_polls() {
        let source = ScriptedSource::new(vec![Fetch::ok(updates(&[1, 2]))]);
        let mut seen = Vec::new();
        let mut handler = from_fn(|batch: Vec<Update>, _| {
            seen.extend(ids(&batch));
            Step::Stop(OffsetTracker::boundary(&batch))
        });
        let report = poll_with_callback(&source, PollParams::default(), &mut handler).await;
        drop(handler);

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(report.offset, Some(3));
    }
}
