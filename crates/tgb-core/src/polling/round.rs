use crate::{
    errors::Error,
    model::{
        response::{STATUS_OK, STATUS_TOO_MANY_REQUESTS},
        Update,
    },
    params::PollParams,
    ports::{Fetch, PollEvent, PollObserver, UpdateSource},
    Result,
};

/// Classified result of one poll round.
#[derive(Debug)]
pub enum RoundOutcome {
    /// Updates in server order, possibly none.
    Delivered {
        status: Option<u16>,
        updates: Vec<Update>,
    },
    /// Flood control; the session must stop and leave retrying to the caller.
    RateLimited { status: Option<u16>, error: Error },
    Failed { status: Option<u16>, error: Error },
}

impl RoundOutcome {
    pub fn status(&self) -> Option<u16> {
        match self {
            RoundOutcome::Delivered { status, .. }
            | RoundOutcome::RateLimited { status, .. }
            | RoundOutcome::Failed { status, .. } => *status,
        }
    }

    pub fn classify(status: Option<u16>, result: Result<Vec<Update>>) -> Self {
        let flood_status = status == Some(STATUS_TOO_MANY_REQUESTS);
        match result {
            Err(error) if error.is_rate_limited() => RoundOutcome::RateLimited { status, error },
            Err(error) if flood_status => RoundOutcome::RateLimited {
                status,
                error: Error::RateLimited {
                    retry_after: None,
                    description: error.to_string(),
                },
            },
            Err(error) => RoundOutcome::Failed { status, error },
            Ok(_) if flood_status => RoundOutcome::RateLimited {
                status,
                error: Error::RateLimited {
                    retry_after: None,
                    description: "HTTP 429 Too Many Requests".to_string(),
                },
            },
            Ok(_) if status.is_some_and(|s| s != STATUS_OK) => RoundOutcome::Failed {
                status,
                error: Error::Rejected {
                    status,
                    error_code: None,
                    description: "unexpected HTTP status for a decoded batch".to_string(),
                },
            },
            Ok(updates) => RoundOutcome::Delivered { status, updates },
        }
    }
}

/// Run exactly one request/response cycle against `source` and classify it.
pub async fn run_round(
    source: &dyn UpdateSource,
    params: &PollParams,
    observer: &dyn PollObserver,
) -> RoundOutcome {
    round(source, params, observer, false).await
}

pub(crate) async fn round(
    source: &dyn UpdateSource,
    params: &PollParams,
    observer: &dyn PollObserver,
    acknowledgement: bool,
) -> RoundOutcome {
    observer.on_event(&PollEvent::RoundStarted {
        offset: params.offset,
        timeout: params.timeout,
        limit: params.limit,
        acknowledgement,
    });

    let Fetch { status, result } = source.fetch_updates(params).await;
    let outcome = RoundOutcome::classify(status, result);

    match &outcome {
        RoundOutcome::Delivered { status, updates } => observer.on_event(&PollEvent::RoundFinished {
            status: *status,
            updates: updates.len(),
        }),
        RoundOutcome::RateLimited { error, .. } => observer.on_event(&PollEvent::RateLimited {
            retry_after: error.retry_after(),
        }),
        RoundOutcome::Failed { status, error } => observer.on_event(&PollEvent::RoundFailed {
            status: *status,
            error: error.to_string(),
        }),
    }

    outcome
}
