//! Process session management for driving an interactive installer binary.
//!
//! [`session::ProcessSession`] owns a spawned child process end to end: its
//! stdin queue (`producer`), its stdout poller (`consumer`), the append-only
//! record of everything it has written (`buffer`), and a streaming decoder
//! (`decoder`) that turns those raw bytes into text under a charset that can
//! be changed mid-session. Lifecycle notifications are delivered through
//! `events::SessionEvent` over a broadcast channel.

mod buffer;
mod consumer;
pub mod decoder;
pub mod error;
pub mod events;
mod process;
mod producer;
mod session;

pub use buffer::RawOutputBuffer;
pub use decoder::{Charset, DecodePolicy, StreamingDecoder};
pub use error::{SessionError, SessionExit};
pub use events::SessionEvent;
pub use session::ProcessSession;
