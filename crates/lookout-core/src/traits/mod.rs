//! Collaborator traits consumed by the tracker and the scheduler.

pub mod clock;
pub mod delivery;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use delivery::Delivery;
pub use store::{JobStore, RuleStore};
