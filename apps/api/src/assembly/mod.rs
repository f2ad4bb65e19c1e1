// Slide assembly: per-slide actors merge producer contributions into ordered update events.
// One actor owns each slide's state; producers reach it by message passing only.

pub mod actor;
pub mod cancellation;
pub mod contribution;
pub mod event;
pub mod handlers;
pub mod merge;
pub mod producer;
pub mod session;
pub mod state;

pub use session::{SessionRegistry, SessionSettings};
