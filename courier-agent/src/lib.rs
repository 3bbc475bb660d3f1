//! Relay logic: prompt assembly, completion invocation, history updates

pub mod relay;
pub mod relay_loop;

pub use relay::{ChatRelay, FALLBACK_REPLY};
pub use relay_loop::{RelayLoop, RESET_REPLY};
