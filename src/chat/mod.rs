//! Streaming chat sessions.

pub mod controller;
pub mod events;
pub mod parts;

pub use controller::{ChatController, ChatStream, SessionPhase};
pub use events::ChatEvent;
pub use parts::UserContent;
