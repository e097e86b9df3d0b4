//! `CallControllerActor` - top-level actor managing session lifecycle.
//!
//! The controller:
//! - Creates session actors on `initiate`, enforcing the instance cap
//! - Validates call targets against the read-only directory first
//! - Hands out session actor handles, so per-session traffic never queues
//!   behind another session in the controller mailbox
//! - Reaps session actors that stopped on their own and detects panics
//! - Coordinates graceful shutdown of every live session

use crate::config::Config;
use crate::directory::TargetDirectory;
use crate::errors::CallError;
use crate::history::{CallArchive, CallSummary};
use crate::model::{CallSession, CallTarget};
use crate::policy;
use crate::signal::{RoomId, SignalBus, SignalEvent};

use super::call::{CallSessionActor, CallSessionActorHandle, SessionContext};
use super::messages::{ControllerMessage, ControllerStatus, EndedCall, InitiatedCall};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::Utc;
use common::types::{MediaChannelId, SessionId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// Per-session join timeout during controller shutdown.
const SHUTDOWN_SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `CallControllerActor`.
///
/// During shutdown the controller closes its mailbox and answers every
/// queued request before draining sessions, so requests racing a
/// shutdown resolve to `Unavailable` rather than a dropped channel.
#[derive(Clone)]
pub struct CallControllerActorHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
    archive: Arc<CallArchive>,
}

impl CallControllerActorHandle {
    /// Create a new controller actor and return a handle to it.
    #[must_use]
    pub fn new(
        config: &Config,
        directory: Arc<dyn TargetDirectory>,
        signal_bus: Arc<SignalBus>,
        archive: Arc<CallArchive>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let session_ctx = SessionContext {
            signal_bus,
            archive: Arc::clone(&archive),
            metrics: Arc::clone(&metrics),
            ring_timeout: Duration::from_secs(config.pending_call_timeout_seconds),
            linger: Duration::from_secs(config.ended_session_linger_seconds),
        };

        let actor = CallControllerActor {
            instance_id: config.instance_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            sessions: HashMap::new(),
            directory,
            session_ctx,
            accepting_new: true,
            max_sessions: config.max_sessions as usize,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Controller, config.instance_id.clone()),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            archive,
        }
    }

    /// Create a new pending session and ring its target.
    pub async fn initiate(
        &self,
        owner_id: UserId,
        target: CallTarget,
    ) -> Result<InitiatedCall, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::Initiate {
                owner_id,
                target,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::Unavailable("controller is shutting down".to_string()))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the actor handle for a live session.
    pub async fn session(
        &self,
        session_id: SessionId,
    ) -> Result<CallSessionActorHandle, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::Unavailable("controller is shutting down".to_string()))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Accept a ringing call.
    pub async fn accept(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<CallSession, CallError> {
        self.session(session_id).await?.accept(user_id).await
    }

    /// Decline a ringing call.
    pub async fn reject(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<CallSession, CallError> {
        self.session(session_id).await?.reject(user_id).await
    }

    /// End a live call.
    pub async fn end(&self, session_id: SessionId, user_id: UserId) -> Result<EndedCall, CallError> {
        self.session(session_id).await?.end(user_id).await
    }

    /// Join a call's roster as a listener.
    pub async fn join(&self, session_id: SessionId, user_id: UserId) -> Result<(), CallError> {
        self.session(session_id).await?.join(user_id).await
    }

    /// Leave a call's roster.
    pub async fn leave(&self, session_id: SessionId, user_id: UserId) -> Result<(), CallError> {
        self.session(session_id).await?.leave(user_id).await
    }

    /// Raise a hand in a call.
    pub async fn raise_hand(&self, session_id: SessionId, user_id: UserId) -> Result<(), CallError> {
        self.session(session_id).await?.raise_hand(user_id).await
    }

    /// Signal a mute state change in a call.
    pub async fn set_muted(
        &self,
        session_id: SessionId,
        user_id: UserId,
        muted: bool,
    ) -> Result<(), CallError> {
        self.session(session_id).await?.set_muted(user_id, muted).await
    }

    /// Grant a speaker slot in a call.
    pub async fn promote_speaker(
        &self,
        session_id: SessionId,
        actor_id: UserId,
        target_user_id: UserId,
    ) -> Result<(), CallError> {
        self.session(session_id)
            .await?
            .promote_speaker(actor_id, target_user_id)
            .await
    }

    /// Revoke a speaker slot in a call.
    pub async fn demote_speaker(
        &self,
        session_id: SessionId,
        actor_id: UserId,
        target_user_id: UserId,
    ) -> Result<(), CallError> {
        self.session(session_id)
            .await?
            .demote_speaker(actor_id, target_user_id)
            .await
    }

    /// Current snapshot of a session: live state while the actor runs, the
    /// archived snapshot once it has gone terminal.
    pub async fn snapshot(&self, session_id: SessionId) -> Result<CallSession, CallError> {
        if let Ok(handle) = self.session(session_id).await {
            if let Ok(session) = handle.snapshot().await {
                return Ok(session);
            }
        }
        self.archive
            .get(session_id)
            .await
            .ok_or(CallError::SessionNotFound(session_id))
    }

    /// A user's call history, newest first.
    ///
    /// Reads the archive directly; history queries never touch the actor
    /// mailboxes.
    pub async fn history(&self, user_id: UserId, page: usize, limit: usize) -> Vec<CallSummary> {
        self.archive.history(user_id, page, limit).await
    }

    /// Get controller status.
    pub async fn status(&self) -> Result<ControllerStatus, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|_| CallError::Unavailable("controller is shutting down".to_string()))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown of the controller and all sessions.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::Unavailable("controller is shutting down".to_string()))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the controller (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the controller is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Child token that is cancelled with the controller; used to tie other
    /// service tasks (health server) to the controller's lifetime.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// A managed session actor with its task handle.
struct ManagedSession {
    /// Handle to the session actor.
    handle: CallSessionActorHandle,
    /// Task handle for panic detection and reaping.
    task_handle: JoinHandle<()>,
    /// Creation timestamp (epoch seconds).
    created_at: i64,
}

/// The `CallControllerActor` implementation.
pub struct CallControllerActor {
    /// Unique identifier for this controller instance.
    instance_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Cancellation token; session actors hold children of it.
    cancel_token: CancellationToken,
    /// Live session actors by session id.
    sessions: HashMap<SessionId, ManagedSession>,
    /// Existence and capability checks for call targets.
    directory: Arc<dyn TargetDirectory>,
    /// Collaborators and tuning handed to each session actor.
    session_ctx: SessionContext,
    /// Whether new sessions are accepted (false while draining).
    accepting_new: bool,
    /// Cap on concurrent sessions before initiate sheds load.
    max_sessions: usize,
    /// Shared actor metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl CallControllerActor {
    /// Run the controller message loop.
    #[instrument(skip_all, name = "vc.actor.controller", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "vc.actor.controller",
            instance_id = %self.instance_id,
            max_sessions = self.max_sessions,
            "CallControllerActor started"
        );

        // Reaps stopped session actors and refreshes gauges
        let mut reap_check = tokio::time::interval(Duration::from_secs(5));

        loop {
            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "vc.actor.controller",
                        instance_id = %self.instance_id,
                        "CallControllerActor received cancellation signal"
                    );
                    self.refuse_queued_messages().await;
                    self.graceful_shutdown().await;
                    break;
                }

                // Reap and refresh gauges
                _ = reap_check.tick() => {
                    self.check_session_health().await;
                    self.publish_gauges();
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "vc.actor.controller",
                                instance_id = %self.instance_id,
                                "CallControllerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "vc.actor.controller",
            instance_id = %self.instance_id,
            remaining_sessions = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            "CallControllerActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: ControllerMessage) {
        let operation = message.operation_name();
        let started = std::time::Instant::now();

        match message {
            ControllerMessage::Initiate {
                owner_id,
                target,
                respond_to,
            } => {
                let result = self.handle_initiate(owner_id, target).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetSession {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_session(session_id));
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ControllerMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline);
                let _ = respond_to.send(result);
            }
        }

        crate::observability::metrics::record_operation_duration(operation, started.elapsed());
    }

    /// Create a session actor for a validated target and ring it.
    async fn handle_initiate(
        &mut self,
        owner_id: UserId,
        target: CallTarget,
    ) -> Result<InitiatedCall, CallError> {
        if !self.accepting_new {
            warn!(
                target: "vc.actor.controller",
                instance_id = %self.instance_id,
                "Rejecting initiate: controller is draining"
            );
            return Err(CallError::Unavailable("controller is draining".to_string()));
        }

        if self.sessions.len() >= self.max_sessions {
            warn!(
                target: "vc.actor.controller",
                instance_id = %self.instance_id,
                max_sessions = self.max_sessions,
                "Rejecting initiate: session capacity reached"
            );
            return Err(CallError::Unavailable(
                "session capacity reached".to_string(),
            ));
        }

        self.validate_target(target)?;

        let kind = target.call_kind();
        let session_id = SessionId::new();
        let media_channel = MediaChannelId::new();
        let session = CallSession::new(
            session_id,
            kind,
            owner_id,
            target.context_ref(),
            media_channel.clone(),
            policy::limits_for(kind),
            Utc::now(),
        );

        let session_token = self.cancel_token.child_token();
        let (handle, task_handle) =
            CallSessionActor::spawn(session, session_token, self.session_ctx.clone());

        self.sessions.insert(
            session_id,
            ManagedSession {
                handle,
                task_handle,
                created_at: Utc::now().timestamp(),
            },
        );
        self.metrics.session_created();

        info!(
            target: "vc.actor.controller",
            instance_id = %self.instance_id,
            session_id = %session_id,
            kind = %kind,
            owner_id = %owner_id,
            active_sessions = self.sessions.len(),
            "Session created"
        );

        // Ring only after the session is committed to the map.
        let ring_room = match target {
            CallTarget::User(callee) => RoomId::User(callee),
            CallTarget::Channel { id, .. } => RoomId::Channel(id),
            CallTarget::Global => RoomId::Global,
        };
        self.session_ctx
            .signal_bus
            .publish(
                ring_room,
                SignalEvent::IncomingCall {
                    session_id,
                    caller_id: owner_id,
                    channel_id: media_channel.clone(),
                },
            )
            .await;

        Ok(InitiatedCall {
            session_id,
            channel_id: media_channel,
        })
    }

    /// Check that a target exists and can host a call.
    fn validate_target(&self, target: CallTarget) -> Result<(), CallError> {
        match target {
            CallTarget::User(callee) => {
                if self.directory.user_exists(callee) {
                    Ok(())
                } else {
                    Err(CallError::TargetNotFound(format!("user {callee}")))
                }
            }
            CallTarget::Channel { id, kind } => {
                let entry = self
                    .directory
                    .channel(id)
                    .ok_or_else(|| CallError::TargetNotFound(format!("channel {id}")))?;
                if !entry.voice {
                    return Err(CallError::TargetNotFound(format!(
                        "channel {id} cannot host voice calls"
                    )));
                }
                if entry.kind != kind {
                    return Err(CallError::TargetNotFound(format!(
                        "channel {id} is not a {kind:?} channel"
                    )));
                }
                Ok(())
            }
            CallTarget::Global => Ok(()),
        }
    }

    /// Clone the handle for a live session.
    ///
    /// A session whose actor has already stopped (linger elapsed, panic)
    /// but is not yet reaped reports not-found rather than a dead handle.
    fn get_session(&self, session_id: SessionId) -> Result<CallSessionActorHandle, CallError> {
        match self.sessions.get(&session_id) {
            Some(managed) if !managed.task_handle.is_finished() => Ok(managed.handle.clone()),
            _ => Err(CallError::SessionNotFound(session_id)),
        }
    }

    /// Get current controller status.
    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            session_count: self.sessions.len(),
            participant_count: self.metrics.participant_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Stop accepting sessions and cancel every child actor.
    fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), CallError> {
        info!(
            target: "vc.actor.controller",
            instance_id = %self.instance_id,
            deadline_seconds = deadline.as_secs(),
            active_sessions = self.sessions.len(),
            "Initiating graceful shutdown"
        );
        self.accepting_new = false;
        self.cancel_token.cancel();
        Ok(())
    }

    /// Close the mailbox and answer every request still queued in it.
    ///
    /// Cancellation can win the select while requests sit in the mailbox;
    /// their response channels must not drop unanswered. Closing first
    /// keeps new sends out, then the queued remainder is answered before
    /// the session drain begins.
    async fn refuse_queued_messages(&mut self) {
        self.accepting_new = false;
        self.receiver.close();

        let mut refused = 0_usize;
        while let Some(message) = self.receiver.recv().await {
            match message {
                ControllerMessage::Initiate { respond_to, .. } => {
                    let _ = respond_to.send(Err(CallError::Unavailable(
                        "controller is draining".to_string(),
                    )));
                    refused += 1;
                }
                ControllerMessage::GetSession { respond_to, .. } => {
                    let _ = respond_to.send(Err(CallError::Unavailable(
                        "controller is draining".to_string(),
                    )));
                    refused += 1;
                }
                ControllerMessage::GetStatus { respond_to } => {
                    let _ = respond_to.send(self.get_status());
                }
                ControllerMessage::Shutdown { respond_to, .. } => {
                    let _ = respond_to.send(Ok(()));
                }
            }
        }

        if refused > 0 {
            info!(
                target: "vc.actor.controller",
                instance_id = %self.instance_id,
                refused,
                "Refused queued requests during shutdown"
            );
        }
    }

    /// Reap session actors that stopped on their own and detect panics.
    async fn check_session_health(&mut self) {
        let finished: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for session_id in finished {
            let Some(managed) = self.sessions.remove(&session_id) else {
                continue;
            };
            let age_seconds = Utc::now().timestamp() - managed.created_at;

            match managed.task_handle.await {
                Ok(()) => {
                    debug!(
                        target: "vc.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        age_seconds,
                        "Session actor exited cleanly, reaped"
                    );
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(
                        target: "vc.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        age_seconds,
                        "Session actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Call);
                    // A panicked actor never ran its room cleanup.
                    self.session_ctx
                        .signal_bus
                        .remove_room(RoomId::Session(session_id))
                        .await;
                }
                Err(join_error) => {
                    warn!(
                        target: "vc.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        error = %join_error,
                        "Session actor join failed"
                    );
                }
            }

            self.metrics.session_removed();
        }
    }

    /// Push point-in-time gauges to the metrics recorder.
    fn publish_gauges(&self) {
        let snapshot = self.metrics.snapshot();
        crate::observability::metrics::set_sessions_active(snapshot.sessions);
        crate::observability::metrics::set_participants_active(snapshot.participants);
        crate::observability::metrics::set_actor_mailbox_depth(
            ActorType::Controller.as_str(),
            self.mailbox.current_depth(),
        );
    }

    /// Shut down all session actors, waiting up to a per-session timeout.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "vc.actor.controller",
            instance_id = %self.instance_id,
            active_sessions = self.sessions.len(),
            "Shutting down session actors"
        );

        for managed in self.sessions.values() {
            managed.handle.cancel();
        }

        for (session_id, managed) in self.sessions.drain() {
            match tokio::time::timeout(SHUTDOWN_SESSION_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "vc.actor.controller",
                        session_id = %session_id,
                        "Session actor shut down cleanly"
                    );
                }
                Ok(Err(join_error)) if join_error.is_panic() => {
                    error!(
                        target: "vc.actor.controller",
                        session_id = %session_id,
                        "Session actor panicked during shutdown"
                    );
                    self.metrics.record_panic(ActorType::Call);
                }
                Ok(Err(join_error)) => {
                    warn!(
                        target: "vc.actor.controller",
                        session_id = %session_id,
                        error = %join_error,
                        "Session actor join failed during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "vc.actor.controller",
                        session_id = %session_id,
                        "Session actor did not stop within timeout"
                    );
                }
            }
            self.metrics.session_removed();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::directory::{ChannelEntry, StaticDirectory};
    use crate::model::{CallKind, CallStatus, ChannelKind};
    use common::types::ChannelId;

    struct TestHarness {
        handle: CallControllerActorHandle,
        directory: Arc<StaticDirectory>,
        bus: Arc<SignalBus>,
        archive: Arc<CallArchive>,
    }

    fn test_config() -> Config {
        Config::from_vars(&HashMap::new()).unwrap()
    }

    fn harness() -> TestHarness {
        harness_with_config(test_config())
    }

    fn harness_with_config(config: Config) -> TestHarness {
        let directory = Arc::new(StaticDirectory::new());
        let bus = Arc::new(SignalBus::new());
        let archive = Arc::new(CallArchive::new());
        let metrics = ActorMetrics::new();
        let handle = CallControllerActorHandle::new(
            &config,
            Arc::clone(&directory) as Arc<dyn TargetDirectory>,
            Arc::clone(&bus),
            Arc::clone(&archive),
            metrics,
        );
        TestHarness {
            handle,
            directory,
            bus,
            archive,
        }
    }

    #[tokio::test]
    async fn test_initiate_private_call_creates_pending_session() {
        let h = harness();
        let owner = UserId::new();
        let callee = UserId::new();
        h.directory.register_user(callee);

        let initiated = h
            .handle
            .initiate(owner, CallTarget::User(callee))
            .await
            .unwrap();

        let snapshot = h.handle.snapshot(initiated.session_id).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::Pending);
        assert_eq!(snapshot.kind, CallKind::Private);
        assert_eq!(snapshot.owner_id, owner);
        assert_eq!(snapshot.media_channel, initiated.channel_id);

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.session_count, 1);
        assert!(!status.is_draining);

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_initiate_unknown_user_fails() {
        let h = harness();

        let result = h
            .handle
            .initiate(UserId::new(), CallTarget::User(UserId::new()))
            .await;
        assert!(matches!(result, Err(CallError::TargetNotFound(_))));

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.session_count, 0);

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_initiate_rejects_text_channel() {
        let h = harness();
        let channel = ChannelId::new();
        h.directory.register_channel(
            channel,
            ChannelEntry {
                kind: ChannelKind::Clan,
                voice: false,
            },
        );

        let result = h
            .handle
            .initiate(
                UserId::new(),
                CallTarget::Channel {
                    id: channel,
                    kind: ChannelKind::Clan,
                },
            )
            .await;
        assert!(matches!(result, Err(CallError::TargetNotFound(_))));

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_initiate_rejects_channel_kind_mismatch() {
        let h = harness();
        let channel = ChannelId::new();
        h.directory.register_channel(
            channel,
            ChannelEntry {
                kind: ChannelKind::Clan,
                voice: true,
            },
        );

        let result = h
            .handle
            .initiate(
                UserId::new(),
                CallTarget::Channel {
                    id: channel,
                    kind: ChannelKind::Federation,
                },
            )
            .await;
        assert!(matches!(result, Err(CallError::TargetNotFound(_))));

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_initiate_global_needs_no_directory_entry() {
        let h = harness();

        let initiated = h
            .handle
            .initiate(UserId::new(), CallTarget::Global)
            .await
            .unwrap();
        let snapshot = h.handle.snapshot(initiated.session_id).await.unwrap();
        assert_eq!(snapshot.kind, CallKind::Global);
        assert_eq!(snapshot.user_limit, 10);
        assert_eq!(snapshot.speaker_limit, 5);

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_initiate_rings_the_target_room() {
        let h = harness();
        let owner = UserId::new();
        let callee = UserId::new();
        h.directory.register_user(callee);

        let mut ring = h.bus.subscribe(RoomId::User(callee)).await;

        let initiated = h
            .handle
            .initiate(owner, CallTarget::User(callee))
            .await
            .unwrap();

        let event = ring.recv().await.unwrap();
        assert_eq!(
            event,
            SignalEvent::IncomingCall {
                session_id: initiated.session_id,
                caller_id: owner,
                channel_id: initiated.channel_id,
            }
        );

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_max_sessions_sheds_load() {
        let mut vars = HashMap::new();
        vars.insert("VC_MAX_SESSIONS".to_string(), "2".to_string());
        let h = harness_with_config(Config::from_vars(&vars).unwrap());

        h.handle
            .initiate(UserId::new(), CallTarget::Global)
            .await
            .unwrap();
        h.handle
            .initiate(UserId::new(), CallTarget::Global)
            .await
            .unwrap();

        let third = h.handle.initiate(UserId::new(), CallTarget::Global).await;
        match third {
            Err(err @ CallError::Unavailable(_)) => assert_eq!(err.error_code(), 7),
            other => assert!(other.is_err(), "expected load shedding, got {other:?}"),
        }

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_concurrent_initiates_respect_max_sessions() {
        let mut vars = HashMap::new();
        vars.insert("VC_MAX_SESSIONS".to_string(), "4".to_string());
        let h = harness_with_config(Config::from_vars(&vars).unwrap());

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let handle = h.handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.initiate(UserId::new(), CallTarget::Global).await
            }));
        }

        let mut admitted = 0;
        let mut shed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(err) => {
                    assert!(matches!(err, CallError::Unavailable(_)));
                    shed += 1;
                }
            }
        }
        assert_eq!(admitted, 4);
        assert_eq!(shed, 6);

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_operations_route_to_the_live_session() {
        let h = harness();
        let owner = UserId::new();
        let callee = UserId::new();
        h.directory.register_user(callee);

        let initiated = h
            .handle
            .initiate(owner, CallTarget::User(callee))
            .await
            .unwrap();
        let session_id = initiated.session_id;

        h.handle.accept(session_id, callee).await.unwrap();
        h.handle.join(session_id, owner).await.unwrap();
        h.handle.join(session_id, callee).await.unwrap();
        h.handle.set_muted(session_id, callee, true).await.unwrap();
        h.handle
            .promote_speaker(session_id, owner, callee)
            .await
            .unwrap();

        let snapshot = h.handle.snapshot(session_id).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::Active);
        assert_eq!(snapshot.participants.len(), 2);
        assert!(snapshot.participant(callee).unwrap().is_speaker);

        let ended = h.handle.end(session_id, owner).await.unwrap();
        assert!(ended.duration_seconds >= 0);

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_unknown_session_reports_not_found() {
        let h = harness();

        let result = h.handle.accept(SessionId::new(), UserId::new()).await;
        assert!(matches!(result, Err(CallError::SessionNotFound(_))));

        let result = h.handle.snapshot(SessionId::new()).await;
        assert!(matches!(result, Err(CallError::SessionNotFound(_))));

        h.handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_session_reaped_and_served_from_archive() {
        let mut vars = HashMap::new();
        vars.insert(
            "VC_ENDED_SESSION_LINGER_SECONDS".to_string(),
            "0".to_string(),
        );
        let h = harness_with_config(Config::from_vars(&vars).unwrap());

        let owner = UserId::new();
        let callee = UserId::new();
        h.directory.register_user(callee);

        let initiated = h
            .handle
            .initiate(owner, CallTarget::User(callee))
            .await
            .unwrap();
        h.handle.accept(initiated.session_id, callee).await.unwrap();
        h.handle.end(initiated.session_id, owner).await.unwrap();

        // The session actor stops on its next sweep; the controller reaps
        // it on the one after.
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let session = h.handle.session(initiated.session_id).await;
        assert!(matches!(session, Err(CallError::SessionNotFound(_))));

        let snapshot = h.handle.snapshot(initiated.session_id).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::Ended);

        let history = h.handle.history(owner, 1, 10).await;
        assert_eq!(history.len(), 1);

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.session_count, 0);

        h.handle.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_ends_live_sessions() {
        let h = harness();
        let owner = UserId::new();
        let callee = UserId::new();
        h.directory.register_user(callee);

        let initiated = h
            .handle
            .initiate(owner, CallTarget::User(callee))
            .await
            .unwrap();
        h.handle.accept(initiated.session_id, callee).await.unwrap();

        h.handle.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(h.handle.is_cancelled());

        // The drain runs inside the actor loop after the shutdown reply.
        let mut archived = None;
        for _ in 0..50 {
            if let Some(session) = h.archive.get(initiated.session_id).await {
                archived = Some(session);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let archived = archived.expect("session should be archived on shutdown");
        assert_eq!(archived.status, CallStatus::Ended);
        assert!(archived.duration_seconds.is_some());
    }

    #[tokio::test]
    async fn test_initiate_after_shutdown_is_unavailable() {
        let h = harness();
        let owner = UserId::new();
        let callee = UserId::new();
        h.directory.register_user(callee);

        let initiated = h
            .handle
            .initiate(owner, CallTarget::User(callee))
            .await
            .unwrap();
        h.handle.accept(initiated.session_id, callee).await.unwrap();

        h.handle.shutdown(Duration::from_secs(5)).await.unwrap();

        // Whether the request lands in the draining loop, the queued
        // remainder, or a closed mailbox, the refusal stays typed.
        for _ in 0..5 {
            let refused = h.handle.initiate(UserId::new(), CallTarget::Global).await;
            assert!(
                matches!(refused, Err(CallError::Unavailable(_))),
                "expected Unavailable, got {refused:?}"
            );
            let err = refused.unwrap_err();
            assert_eq!(err.error_code(), 7);
        }
    }
}
