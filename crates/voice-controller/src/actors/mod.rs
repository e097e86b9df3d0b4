//! Actor-based concurrency for call session management.
//!
//! # Architecture
//!
//! ```text
//! CallControllerActor (1 per instance)
//! ├── CallSessionActor (1 per call session)
//! ├── CallSessionActor
//! └── ...
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per session**: every operation on a session flows through
//!   its mailbox, so check-then-act sequences (capacity checks, speaker
//!   slots, lifecycle transitions) are serialized without locks.
//! - **Handles route around the controller**: the controller resolves a
//!   session id to an actor handle once; per-session traffic then goes to
//!   the session mailbox directly and busy sessions cannot starve others.
//! - **Commit before notify**: signal fan-out happens after state has
//!   changed, never before, and failed operations publish nothing.
//! - **Cancellation cascade**: session actors hold child tokens of the
//!   controller token, so one cancel drains the whole tree.
//!
//! # Modules
//!
//! - [`controller`]: Top-level controller actor
//! - [`call`]: Per-session actor owning one call's state
//! - [`messages`]: Message types for actor communication
//! - [`metrics`]: Actor pool metrics and mailbox monitoring

pub mod call;
pub mod controller;
pub mod messages;
pub mod metrics;

pub use call::{CallSessionActor, CallSessionActorHandle, SessionContext};
pub use controller::{CallControllerActor, CallControllerActorHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
