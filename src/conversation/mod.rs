//! Per-sender conversation state machine.
//!
//! `machine` and `admin` hold the pure transitions, `engine` runs their
//! side effects against the stores, and `dispatch` serializes work per
//! sender.

pub mod admin;
pub mod command;
pub mod dispatch;
pub mod engine;
pub mod machine;
pub mod replies;
pub mod session;
pub mod state;

pub use dispatch::Dispatcher;
pub use engine::{CLOSING_WINDOW_KEY, Conversation};
pub use session::{InMemorySessionStore, SenderLocks, SessionStore};
pub use state::{AdminFlow, SessionState, UserFlow};
