//! The hierarchical domain model: `User` owns `ExternalSession`s, which own
//! `InternalSession`s, which own `Checkpoint`s.

mod checkpoint;
mod external_session;
mod internal_session;
mod user;

pub use checkpoint::Checkpoint;
pub use external_session::ExternalSession;
pub use internal_session::{HistoryEntry, InternalSession, Role};
pub use user::{User, ROOT_USERNAME};
