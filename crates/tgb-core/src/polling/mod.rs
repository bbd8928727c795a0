//! Update-polling engine.
//!
//! Turns the stateless `getUpdates` round trip into an ordered stream of
//! updates: one round in flight at a time, offsets only move forward, and every
//! session that made progress ends with a zero-wait acknowledgement round.

pub mod driver;
pub mod offset;
pub mod round;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{from_fn, poll_with_callback, BatchHandler, FnHandler, Poller, PollReport, Step};
pub use offset::OffsetTracker;
pub use round::{run_round, RoundOutcome};
pub use stream::{poll_to_channel, ChannelSink};
