//! Engine events and the bus that fans them out

mod bus;
mod memory;
mod types;

pub use bus::{EventBus, EventSeq};
pub use memory::{DEFAULT_HISTORY_LIMIT, MemoryEventBus};
pub use types::{ProctorEvent, ViolationNotice};
