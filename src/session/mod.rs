//! Session registry and background expiry.

mod store;
mod sweeper;

pub use store::{InMemorySessionStore, SessionEntry, SessionStore};
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};
