//! Authentication session management for Gatehouse.
//!
//! This crate owns the state behind conference authentication:
//!
//! 1. **Sessions**: who authenticated, from which device, for which
//!    conference ([`Session`])
//! 2. **Registry**: every live session, looked up by token, identity, or
//!    peer address ([`SessionRegistry`])
//! 3. **Expiry**: a background task evicting idle sessions ([`Sweeper`])
//! 4. **Events**: created/destroyed notifications for an external sink
//!    ([`EventSink`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Authority (above)  ← runs the join/logout protocol against the registry
//!     ↕
//! Session Layer (this crate)  ← owns sessions and their expiry
//!     ↕
//! Protocol Layer (below)  ← provides SessionToken, PeerAddress
//! ```

mod events;
mod registry;
mod session;
mod sweeper;

pub use events::{EventSink, Properties, RemovalReason, SessionEvent};
pub use registry::{SessionRegistry, SharedRegistry};
pub use session::{Session, SessionConfig};
pub use sweeper::Sweeper;
