//! The execution engine (§4): state store, message bus, node runner, and
//! the superstep scheduler that ties them together.

pub mod message_bus;
pub mod runner;
pub mod scheduler;
pub mod state_store;

pub use message_bus::MessageBus;
pub use runner::{run_node, RunOutcome};
pub use scheduler::Engine;
pub use state_store::StateStore;
