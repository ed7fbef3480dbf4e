//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! the reducer computes the next state plus a list of effects, and the
//! runtime is the only place effects are carried out.

mod action;
mod effect;
pub mod state;
pub(crate) mod transition;


pub use action::Action;
pub use effect::Effect;
pub use state::{ConvContext, ConversationError, State, TaskHandle, ToolCall};
pub use transition::{transition, Outcome, TransitionResult};
