//! Application layer - engine orchestration and use cases

pub mod dispatcher;
pub mod engine;
pub mod fanout;
pub mod ports;
pub mod registry;
pub mod signal;
pub mod state_machine;

pub use engine::{CallControlEngine, RegisterParams};
pub use ports::{AttributeServer, CallCallbacks, CharacteristicId, PeerId, Scheduler};
pub use registry::{AllocationError, BearerRegistry, CallIndexAllocator};
