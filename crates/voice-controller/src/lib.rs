//! Voice Controller (VC) Service Library
//!
//! Core functionality for the Muster Voice Controller, the stateful engine
//! behind voice calls and voice channels:
//!
//! - Call lifecycle state machine (pending -> accepted -> active -> ended/rejected)
//! - Participant rosters with per-kind capacity limits frozen at creation
//! - Speaker slot arbitration with an append-only promotion audit trail
//! - Post-commit signal fan-out to per-room subscribers
//! - Call history queries over archived terminal sessions
//!
//! # Architecture
//!
//! Uses an actor model hierarchy:
//!
//! ```text
//! CallControllerActorHandle (cloneable, cheap)
//!         |
//!         v
//! CallControllerActor (singleton per VC instance)
//!   - admits or sheds new calls against the session cap
//!   - validates call targets against the directory
//!   - reaps finished and panicked session actors
//!         |
//!         v
//! CallSessionActor (one per live call session)
//!   - owns the session state machine, roster, and audit logs
//!   - serializes every operation through its mailbox
//!   - publishes committed changes to the signal bus
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per session**: capacity checks, speaker arbitration, and
//!   status transitions all serialize through one mailbox, so no locks and
//!   no lost-update races between concurrent joins or promotions
//! - **Commit before notify**: signal events are published only after the
//!   state change they describe has been applied, and in commit order
//! - **Frozen limits**: a session captures its capacity limits at creation;
//!   later policy changes never affect live calls
//! - **Archive off the hot path**: history queries read the archive directly
//!   and never touch an actor mailbox
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation (controller + session actors)
//! - [`config`] - Environment-based configuration
//! - [`directory`] - Call target lookups (users and channels)
//! - [`errors`] - Error types and wire error codes
//! - [`history`] - Terminal session archive and history queries
//! - [`model`] - Call session domain model and state machine
//! - [`observability`] - Health endpoints and Prometheus metrics
//! - [`policy`] - Per-kind capacity limits
//! - [`signal`] - Per-room signal fan-out bus

pub mod actors;
pub mod config;
pub mod directory;
pub mod errors;
pub mod history;
pub mod model;
pub mod observability;
pub mod policy;
pub mod signal;
