//! Fakes shared by the polling engine tests.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;

use crate::{
    model::{Update, UpdatePayload},
    params::PollParams,
    ports::{Fetch, PollEvent, PollObserver, UpdateSource},
};

/// Replays a fixed list of fetch outcomes, then reports empty batches forever.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    script: Mutex<VecDeque<Fetch>>,
    seen: Mutex<Vec<PollParams>>,
}

impl ScriptedSource {
    pub(crate) fn new(script: Vec<Fetch>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Parameters of every round issued so far, in order.
    pub(crate) fn seen(&self) -> Vec<PollParams> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn acknowledgements(&self) -> Vec<PollParams> {
        self.seen()
            .into_iter()
            .filter(|p| p.timeout == 0 && p.limit == 1)
            .collect()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn fetch_updates(&self, params: &PollParams) -> Fetch {
        self.seen.lock().unwrap().push(params.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(fetch) => fetch,
            None => {
                // Stand-in for a long-poll wait so other tasks get to run.
                tokio::task::yield_now().await;
                Fetch::ok(Vec::new())
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<PollEvent>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<PollEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&PollEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl PollObserver for RecordingObserver {
    fn on_event(&self, event: &PollEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub(crate) fn updates(ids: &[i64]) -> Vec<Update> {
    ids.iter()
        .map(|&id| {
            Update::new(
                id,
                UpdatePayload::Opaque {
                    kind: "message".to_string(),
                    raw: serde_json::json!({ "n": id }),
                },
            )
        })
        .collect()
}

pub(crate) fn ids(updates: &[Update]) -> Vec<i64> {
    updates.iter().map(|u| u.update_id).collect()
}
