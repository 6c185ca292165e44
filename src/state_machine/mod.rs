// State machine module for the message record lifecycle
//
// Every queue status change made by the delivery coordinator (and the manual
// retry override) is validated against this transition table before it is
// written to the message store.

pub mod errors;
pub mod events;
pub mod message_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::MessageEvent;
pub use message_state_machine::MessageStateMachine;
pub use states::QueueStatus;
