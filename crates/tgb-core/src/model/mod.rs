//! Bot API wire model.
//!
//! Only what the polling engine and the common text-message flow need is fully
//! typed; every other payload is carried as raw JSON.

pub mod message;
pub mod response;
pub mod update;

pub use message::{Chat, File, Message, MessageEntity, User};
pub use response::{Envelope, ResponseParameters};
pub use update::{Update, UpdateKind, UpdatePayload};
