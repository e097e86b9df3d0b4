//! `CallSessionActor` - per-session actor that owns one call's state.
//!
//! Each `CallSessionActor`:
//! - Owns the session state machine, roster, and audit logs
//! - Serializes every operation through its mailbox, so check-then-act
//!   sequences (capacity, speaker slots, transitions) are atomic
//! - Publishes committed changes to the signal bus, never before commit
//! - Archives the final snapshot when the session reaches a terminal state
//!
//! # Deadlines
//!
//! Two deadlines are swept on a 5-second interval:
//! 1. Ring timeout: a session still `Pending` past the deadline is rejected,
//!    exactly as an explicit reject.
//! 2. Terminal linger: after `Ended`/`Rejected` the actor keeps answering
//!    (with `InvalidState`) for a grace window, then stops and is reaped by
//!    the controller.

use crate::errors::CallError;
use crate::history::CallArchive;
use crate::model::{CallSession, CallStatus};
use crate::signal::{RoomId, SignalBus, SignalEvent};

use super::messages::{CallSessionMessage, EndedCall};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::Utc;
use common::types::{SessionId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const CALL_CHANNEL_BUFFER: usize = 500;

/// Shared collaborators and tuning handed to every session actor.
#[derive(Clone)]
pub struct SessionContext {
    /// Signal bus for post-commit fan-out.
    pub signal_bus: Arc<SignalBus>,
    /// Archive receiving terminal snapshots.
    pub archive: Arc<CallArchive>,
    /// Shared actor metrics.
    pub metrics: Arc<ActorMetrics>,
    /// How long a pending call may ring before it expires.
    pub ring_timeout: Duration,
    /// How long a terminal session keeps answering before the actor stops.
    pub linger: Duration,
}

/// Handle to a `CallSessionActor`.
///
/// Once the actor has stopped (linger elapsed or cancellation), every
/// operation on a retained handle answers `SessionNotFound`, the same
/// view the controller gives after reaping the finished task.
#[derive(Clone, Debug)]
pub struct CallSessionActorHandle {
    sender: mpsc::Sender<CallSessionMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
}

impl CallSessionActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Accept the ringing call.
    ///
    /// Returns the updated session snapshot with `start_time` set.
    pub async fn accept(&self, user_id: UserId) -> Result<CallSession, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::Accept {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// Decline the ringing call.
    pub async fn reject(&self, user_id: UserId) -> Result<CallSession, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::Reject {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// End a live call.
    ///
    /// Returns the final snapshot and the whole-second duration.
    pub async fn end(&self, user_id: UserId) -> Result<EndedCall, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::End {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// Join the roster as a listener.
    pub async fn join(&self, user_id: UserId) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::Join {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// Leave the roster.
    pub async fn leave(&self, user_id: UserId) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::Leave {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// Raise a hand to request a speaker slot.
    pub async fn raise_hand(&self, user_id: UserId) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::RaiseHand {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// Signal a mute state change.
    pub async fn set_muted(&self, user_id: UserId, muted: bool) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::SetMuted {
                user_id,
                muted,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// Grant a speaker slot to a participant.
    ///
    /// Only the session owner or a current speaker may promote.
    pub async fn promote_speaker(
        &self,
        actor_id: UserId,
        target_user_id: UserId,
    ) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::PromoteSpeaker {
                actor_id,
                target_user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// Revoke a speaker slot.
    pub async fn demote_speaker(
        &self,
        actor_id: UserId,
        target_user_id: UserId,
    ) -> Result<(), CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::DemoteSpeaker {
                actor_id,
                target_user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?
    }

    /// Get the current session state.
    pub async fn snapshot(&self) -> Result<CallSession, CallError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CallSessionMessage::GetSnapshot { respond_to: tx })
            .await
            .map_err(|_| CallError::SessionNotFound(self.session_id))?;

        rx.await
            .map_err(|_| CallError::SessionNotFound(self.session_id))
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `CallSessionActor` implementation.
pub struct CallSessionActor {
    /// Authoritative session state.
    session: CallSession,
    /// Message receiver.
    receiver: mpsc::Receiver<CallSessionMessage>,
    /// Cancellation token (child of the controller's token).
    cancel_token: CancellationToken,
    /// Shared collaborators and tuning.
    ctx: SessionContext,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
    /// Deadline for answering a pending call.
    ring_deadline: Instant,
    /// Set when the session turns terminal; actor stops once it passes.
    linger_until: Option<Instant>,
}

impl CallSessionActor {
    /// Spawn a new session actor for an already-created pending session.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        session: CallSession,
        cancel_token: CancellationToken,
        ctx: SessionContext,
    ) -> (CallSessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CALL_CHANNEL_BUFFER);
        let session_id = session.id;

        let ring_deadline = Instant::now() + ctx.ring_timeout;
        let mailbox = MailboxMonitor::new(ActorType::Call, session_id.to_string());

        let actor = Self {
            session,
            receiver,
            cancel_token: cancel_token.clone(),
            ctx,
            mailbox,
            ring_deadline,
            linger_until: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = CallSessionActorHandle {
            sender,
            cancel_token,
            session_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "vc.actor.call", fields(session_id = %self.session.id))]
    async fn run(mut self) {
        info!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            kind = %self.session.kind,
            owner_id = %self.session.owner_id,
            "CallSessionActor started"
        );

        // Drives the ring-timeout and linger sweeps
        let mut sweep = tokio::time::interval(Duration::from_secs(5));

        loop {
            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "vc.actor.call",
                        session_id = %self.session.id,
                        "CallSessionActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                // Check deadlines
                _ = sweep.tick() => {
                    if self.check_deadlines().await {
                        break;
                    }
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.ctx.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "vc.actor.call",
                                session_id = %self.session.id,
                                "CallSessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        // The session room dies with the actor.
        self.ctx
            .signal_bus
            .remove_room(RoomId::Session(self.session.id))
            .await;

        info!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            status = %self.session.status,
            participants = self.session.participants.len(),
            messages_processed = self.mailbox.messages_processed(),
            "CallSessionActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: CallSessionMessage) {
        let operation = message.operation_name();
        let started = std::time::Instant::now();

        match message {
            CallSessionMessage::Accept {
                user_id,
                respond_to,
            } => {
                let result = self.handle_accept(user_id).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::Reject {
                user_id,
                respond_to,
            } => {
                let result = self.handle_reject(user_id).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::End {
                user_id,
                respond_to,
            } => {
                let result = self.handle_end(user_id).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::Join {
                user_id,
                respond_to,
            } => {
                let result = self.handle_join(user_id).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::Leave {
                user_id,
                respond_to,
            } => {
                let result = self.handle_leave(user_id).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::RaiseHand {
                user_id,
                respond_to,
            } => {
                let result = self.handle_raise_hand(user_id).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::SetMuted {
                user_id,
                muted,
                respond_to,
            } => {
                let result = self.handle_set_muted(user_id, muted).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::PromoteSpeaker {
                actor_id,
                target_user_id,
                respond_to,
            } => {
                let result = self.handle_promote_speaker(actor_id, target_user_id).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::DemoteSpeaker {
                actor_id,
                target_user_id,
                respond_to,
            } => {
                let result = self.handle_demote_speaker(actor_id, target_user_id).await;
                let _ = respond_to.send(result);
            }

            CallSessionMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.session.clone());
            }
        }

        crate::observability::metrics::record_operation_duration(operation, started.elapsed());
    }

    async fn handle_accept(&mut self, user_id: UserId) -> Result<CallSession, CallError> {
        self.session.accept(Utc::now())?;

        info!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            user_id = %user_id,
            "Call accepted"
        );

        let accepted = SignalEvent::CallAccepted {
            session_id: self.session.id,
        };
        self.ctx
            .signal_bus
            .publish(RoomId::User(self.session.owner_id), accepted.clone())
            .await;
        self.ctx
            .signal_bus
            .publish(RoomId::Session(self.session.id), accepted)
            .await;

        Ok(self.session.clone())
    }

    async fn handle_reject(&mut self, user_id: UserId) -> Result<CallSession, CallError> {
        self.session.reject()?;
        self.commit_terminal().await;

        info!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            user_id = %user_id,
            "Call rejected"
        );

        self.ctx
            .signal_bus
            .publish(
                RoomId::User(self.session.owner_id),
                SignalEvent::CallRejected {
                    session_id: self.session.id,
                },
            )
            .await;

        Ok(self.session.clone())
    }

    async fn handle_end(&mut self, user_id: UserId) -> Result<EndedCall, CallError> {
        let duration_seconds = self.session.end(Utc::now())?;
        self.commit_terminal().await;

        info!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            user_id = %user_id,
            duration_seconds,
            "Call ended"
        );

        let ended = SignalEvent::CallEnded {
            session_id: self.session.id,
            duration: duration_seconds,
        };
        self.ctx
            .signal_bus
            .publish(RoomId::Session(self.session.id), ended.clone())
            .await;
        self.ctx
            .signal_bus
            .publish(RoomId::User(self.session.owner_id), ended)
            .await;

        Ok(EndedCall {
            session: self.session.clone(),
            duration_seconds,
        })
    }

    async fn handle_join(&mut self, user_id: UserId) -> Result<(), CallError> {
        self.session.join(user_id, Utc::now())?;
        self.ctx.metrics.participant_joined();

        debug!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            user_id = %user_id,
            participants = self.session.participants.len(),
            "Participant joined"
        );

        self.ctx
            .signal_bus
            .publish(
                RoomId::Session(self.session.id),
                SignalEvent::ParticipantJoined {
                    session_id: self.session.id,
                    user_id,
                },
            )
            .await;

        Ok(())
    }

    async fn handle_leave(&mut self, user_id: UserId) -> Result<(), CallError> {
        self.session.leave(user_id, Utc::now())?;
        self.ctx.metrics.participant_left();

        debug!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            user_id = %user_id,
            participants = self.session.participants.len(),
            "Participant left"
        );

        self.ctx
            .signal_bus
            .publish(
                RoomId::Session(self.session.id),
                SignalEvent::ParticipantLeft {
                    session_id: self.session.id,
                    user_id,
                },
            )
            .await;

        Ok(())
    }

    async fn handle_raise_hand(&mut self, user_id: UserId) -> Result<(), CallError> {
        self.session.raise_hand(user_id, Utc::now())?;

        self.ctx
            .signal_bus
            .publish(
                RoomId::Session(self.session.id),
                SignalEvent::HandRaised {
                    session_id: self.session.id,
                    user_id,
                },
            )
            .await;

        Ok(())
    }

    async fn handle_set_muted(&mut self, user_id: UserId, muted: bool) -> Result<(), CallError> {
        self.session.set_muted(user_id, muted, Utc::now())?;

        self.ctx
            .signal_bus
            .publish(
                RoomId::Session(self.session.id),
                SignalEvent::MuteChanged {
                    session_id: self.session.id,
                    user_id,
                    muted,
                },
            )
            .await;

        Ok(())
    }

    async fn handle_promote_speaker(
        &mut self,
        actor_id: UserId,
        target_user_id: UserId,
    ) -> Result<(), CallError> {
        self.session
            .promote_speaker(actor_id, target_user_id, Utc::now())?;

        info!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            actor_id = %actor_id,
            target_user_id = %target_user_id,
            speakers = self.session.speaker_count(),
            "Speaker promoted"
        );

        self.ctx
            .signal_bus
            .publish(
                RoomId::Session(self.session.id),
                SignalEvent::PromotedSpeaker {
                    session_id: self.session.id,
                    user_id: target_user_id,
                },
            )
            .await;

        Ok(())
    }

    async fn handle_demote_speaker(
        &mut self,
        actor_id: UserId,
        target_user_id: UserId,
    ) -> Result<(), CallError> {
        self.session
            .demote_speaker(actor_id, target_user_id, Utc::now())?;

        info!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            actor_id = %actor_id,
            target_user_id = %target_user_id,
            speakers = self.session.speaker_count(),
            "Speaker demoted"
        );

        self.ctx
            .signal_bus
            .publish(
                RoomId::Session(self.session.id),
                SignalEvent::DemotedSpeaker {
                    session_id: self.session.id,
                    user_id: target_user_id,
                },
            )
            .await;

        Ok(())
    }

    /// Archive the final snapshot and start the linger countdown.
    ///
    /// Runs exactly once per session: terminal transitions are one-way.
    async fn commit_terminal(&mut self) {
        for _ in 0..self.session.participants.len() {
            self.ctx.metrics.participant_left();
        }
        self.ctx.archive.record(self.session.clone()).await;
        self.linger_until = Some(Instant::now() + self.ctx.linger);
    }

    /// Sweep the ring-timeout and linger deadlines.
    ///
    /// Returns `true` when the actor should stop.
    async fn check_deadlines(&mut self) -> bool {
        if self.session.status == CallStatus::Pending && Instant::now() >= self.ring_deadline {
            self.expire_pending().await;
        }

        if let Some(until) = self.linger_until {
            if Instant::now() >= until {
                debug!(
                    target: "vc.actor.call",
                    session_id = %self.session.id,
                    status = %self.session.status,
                    "Terminal linger elapsed, stopping"
                );
                return true;
            }
        }

        false
    }

    /// Reject a pending call that rang past its deadline.
    async fn expire_pending(&mut self) {
        if self.session.reject().is_err() {
            return;
        }
        self.ctx.metrics.record_session_expired();
        self.commit_terminal().await;

        warn!(
            target: "vc.actor.call",
            session_id = %self.session.id,
            timeout_seconds = self.ctx.ring_timeout.as_secs(),
            "Pending call expired without an answer"
        );

        self.ctx
            .signal_bus
            .publish(
                RoomId::User(self.session.owner_id),
                SignalEvent::CallRejected {
                    session_id: self.session.id,
                },
            )
            .await;
    }

    /// Close out the session during shutdown: reject if still ringing, end
    /// if live. Already-terminal sessions have been archived and need nothing.
    async fn graceful_shutdown(&mut self) {
        match self.session.status {
            CallStatus::Pending => {
                if self.session.reject().is_ok() {
                    self.commit_terminal().await;
                    info!(
                        target: "vc.actor.call",
                        session_id = %self.session.id,
                        "Pending call rejected during shutdown"
                    );
                    self.ctx
                        .signal_bus
                        .publish(
                            RoomId::User(self.session.owner_id),
                            SignalEvent::CallRejected {
                                session_id: self.session.id,
                            },
                        )
                        .await;
                }
            }
            CallStatus::Accepted | CallStatus::Active => {
                if let Ok(duration) = self.session.end(Utc::now()) {
                    self.commit_terminal().await;
                    info!(
                        target: "vc.actor.call",
                        session_id = %self.session.id,
                        duration_seconds = duration,
                        "Live call ended during shutdown"
                    );
                    let ended = SignalEvent::CallEnded {
                        session_id: self.session.id,
                        duration,
                    };
                    self.ctx
                        .signal_bus
                        .publish(RoomId::Session(self.session.id), ended.clone())
                        .await;
                    self.ctx
                        .signal_bus
                        .publish(RoomId::User(self.session.owner_id), ended)
                        .await;
                }
            }
            CallStatus::Ended | CallStatus::Rejected => {}
        }
    }
}
