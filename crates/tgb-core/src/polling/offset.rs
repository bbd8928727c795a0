use crate::model::Update;

/// The next update identifier the server should deliver.
///
/// Only ever moves forward: once an identifier has been passed it is never
/// requested again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OffsetTracker {
    next: Option<i64>,
}

impl OffsetTracker {
    /// `None` lets the server start from the oldest unconfirmed update.
    pub fn new(initial: Option<i64>) -> Self {
        Self { next: initial }
    }

    pub fn current(&self) -> Option<i64> {
        self.next
    }

    /// Offset that confirms every update in `batch`: highest identifier plus one.
    ///
    /// Batches are not assumed to be sorted.
    pub fn boundary(batch: &[Update]) -> Option<i64> {
        batch
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id.saturating_add(1))
    }

    /// Mark `update_id` as consumed.
    pub fn observe(&mut self, update_id: i64) -> bool {
        self.commit(Some(update_id.saturating_add(1)))
    }

    pub fn observe_batch(&mut self, batch: &[Update]) -> bool {
        self.commit(Self::boundary(batch))
    }

    /// Move to `offset` if it lies ahead; returns whether the tracker moved.
    pub fn commit(&mut self, offset: Option<i64>) -> bool {
        match (self.next, offset) {
            (_, None) => false,
            (Some(cur), Some(proposed)) if proposed <= cur => false,
            (_, proposed) => {
                self.next = proposed;
                true
            }
        }
    }
}
