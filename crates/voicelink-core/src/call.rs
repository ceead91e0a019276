//! Call lifecycle state machine.
//!
//! This module implements the call-establishment layer: driving a call from
//! request through the human-verified code handshake to an active, timed
//! session and a guaranteed teardown.
//!
//! # Architecture: Action-Based State Machine
//!
//! This state machine follows the action pattern:
//! - Methods mutate state and return `Result<Vec<CallAction>, CallError>`
//! - Driver code executes actions (send backend requests, join media, manage
//!   the duration ticker)
//! - Backend responses are fed back in as further method calls
//!
//! This enables:
//! - Pure lifecycle logic (no I/O, no clock)
//! - Easy testing (no mocking of network or time)
//! - One canonical machine shared by every call-screen variant
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ initiate ┌────────────┐ initiated ┌───────────┐ verified ┌────────┐
//! │ Idle │─────────>│ Initiating │──────────>│ Initiated │─────────>│ Active │
//! └──────┘          └────────────┘           └───────────┘          └────────┘
//!    ▲                    │ abort                 │ cancel               │ end/ended
//!    │                    ▼                       ▼                      ▼
//!    │               ┌──────┐                ┌──────┐               ┌───────┐
//!    └───────────────│ Idle │                │ Idle │               │ Ended │
//!      grace elapsed └──────┘                └──────┘               └───────┘
//! ```
//!
//! Code confirmation immediately activates the call: "confirmed" and
//! "active" are one phase. Fullscreen video variants layer an orthogonal
//! `video_enabled` flag on `Active` without changing the primary phase.
//!
//! # Lifecycle
//!
//! 1. **Idle**: No call; `initiate` validates the recipient locally first
//! 2. **Initiating**: Backend request in flight, no session yet
//! 3. **Initiated**: Session persisted, verification code displayed
//! 4. **Active**: Code verified, media joined, duration ticking at 1 Hz
//! 5. **Ended**: Duration submitted; resets to Idle after a grace period
//!
//! Duration is counted client-side in whole seconds from the moment
//! `Active` is entered and is captured into the `SendEnd` action when `end`
//! is accepted, so a slow `end` round trip cannot inflate it.

use std::time::Duration;

use crate::error::CallError;

/// Phase of the call lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallPhase {
    /// No call in progress.
    #[default]
    Idle,
    /// Initiate request sent; waiting for the backend to create the call.
    Initiating,
    /// Call created; verification code awaiting human confirmation.
    Initiated,
    /// Code verified; call connected and duration ticking.
    Active,
    /// Call ended; session retained until the grace period elapses.
    Ended,
}

impl CallPhase {
    /// Whether the call is connected with duration ticking.
    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

/// The single call session owned by the machine.
///
/// At most one exists per client; it is created when the backend confirms
/// `initiate` and destroyed when the ended-state grace period elapses or on
/// forced teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    /// Backend-assigned call identifier.
    pub call_id: String,
    /// Recipient user id the call was placed to.
    pub recipient_id: String,
    /// Human-verified handshake code issued by the backend.
    pub verification_code: String,
    /// Epoch milliseconds at which `Active` was entered, if it was.
    pub started_at_ms: Option<i64>,
    /// Whole seconds spent in `Active`, advanced by the 1 Hz ticker.
    pub duration_seconds: u64,
}

/// Actions returned by the call state machine.
///
/// The driver (call controller or test harness) executes these actions:
/// backend requests, media channel operations, and ticker management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    /// Send the backend `initiate` request for this recipient.
    SendInitiate {
        /// Recipient user id (validated non-empty numeric).
        recipient_id: String,
    },

    /// Send the backend `confirm-code` request.
    SendConfirm {
        /// Call to confirm.
        call_id: String,
        /// Code entered by the user.
        code: String,
    },

    /// Send the backend `end` request with the elapsed duration.
    ///
    /// The duration is the value counted at the moment `end` was accepted;
    /// it must be submitted as-is, never recomputed at send time.
    SendEnd {
        /// Call to end.
        call_id: String,
        /// Whole seconds the call was active.
        duration_seconds: u64,
    },

    /// Join the media channel for this call.
    JoinMedia {
        /// Channel identifier (the call id).
        call_id: String,
    },

    /// Leave the media channel.
    LeaveMedia,

    /// Start the 1 Hz duration ticker.
    StartTicker,

    /// Stop the duration ticker. Must be honored exactly once.
    StopTicker,

    /// Schedule the ended-state reset after the grace period.
    ScheduleReset {
        /// Delay before `grace_elapsed` should be delivered.
        after: Duration,
    },
}

/// Call machine configuration.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// How long an ended call lingers before the session resets to idle.
    pub ended_grace: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self { ended_grace: Duration::from_millis(1500) }
    }
}

/// Observation-only projection of the machine state for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallSnapshot {
    /// Current phase.
    pub phase: CallPhase,
    /// Call id, when a session exists.
    pub call_id: Option<String>,
    /// Verification code, when a session exists.
    pub verification_code: Option<String>,
    /// Whole seconds spent active.
    pub duration_seconds: u64,
    /// Whether the orthogonal video layer is enabled (Active only).
    pub video_enabled: bool,
}

/// Call lifecycle state machine.
///
/// Owns the single [`CallSession`] exclusively; no other component mutates
/// it. This is a pure state machine - no I/O, no clock. Wall-clock inputs
/// (the activation timestamp) are passed in by the driver, and elapsed time
/// arrives as discrete [`CallMachine::tick`] events.
#[derive(Debug, Clone)]
pub struct CallMachine {
    phase: CallPhase,
    config: CallConfig,
    session: Option<CallSession>,
    /// Recipient carried through `Initiating`, before a session exists.
    pending_recipient: Option<String>,
    end_in_flight: bool,
    video_enabled: bool,
}

impl CallMachine {
    /// Create a new machine in `Idle`.
    pub fn new(config: CallConfig) -> Self {
        Self {
            phase: CallPhase::Idle,
            config,
            session: None,
            pending_recipient: None,
            end_in_flight: false,
            video_enabled: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    /// Current session, if one exists.
    #[must_use]
    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    /// Whether the video layer is enabled.
    #[must_use]
    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    /// Observation-only snapshot for the UI layer.
    #[must_use]
    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            phase: self.phase,
            call_id: self.session.as_ref().map(|s| s.call_id.clone()),
            verification_code: self.session.as_ref().map(|s| s.verification_code.clone()),
            duration_seconds: self.session.as_ref().map_or(0, |s| s.duration_seconds),
            video_enabled: self.video_enabled,
        }
    }

    /// Start a new call to `recipient_id`.
    ///
    /// Valid from `Idle`, and from `Ended` (the new-call path), where the
    /// stale session is discarded first.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidRecipient`] if the recipient is not a
    /// non-empty numeric string (local validation, never sent to the
    /// backend), or [`CallError::InvalidTransition`] from any other phase.
    pub fn initiate(&mut self, recipient_id: &str) -> Result<Vec<CallAction>, CallError> {
        if !matches!(self.phase, CallPhase::Idle | CallPhase::Ended) {
            return Err(CallError::InvalidTransition {
                phase: self.phase,
                operation: "initiate",
            });
        }
        // Validate before touching state: a rejected initiate from Ended
        // must leave the lingering session intact.
        if recipient_id.is_empty() || !recipient_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CallError::InvalidRecipient);
        }
        if self.phase == CallPhase::Ended {
            self.clear_session();
        }

        self.pending_recipient = Some(recipient_id.to_string());
        self.phase = CallPhase::Initiating;
        Ok(vec![CallAction::SendInitiate { recipient_id: recipient_id.to_string() }])
    }

    /// Backend confirmed `initiate`: persist the session.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidTransition`] if not `Initiating`.
    pub fn initiated(
        &mut self,
        call_id: &str,
        verification_code: &str,
    ) -> Result<Vec<CallAction>, CallError> {
        if self.phase != CallPhase::Initiating {
            return Err(CallError::InvalidTransition {
                phase: self.phase,
                operation: "initiated",
            });
        }

        let recipient_id = self.pending_recipient.take().unwrap_or_default();
        self.session = Some(CallSession {
            call_id: call_id.to_string(),
            recipient_id,
            verification_code: verification_code.to_string(),
            started_at_ms: None,
            duration_seconds: 0,
        });
        self.phase = CallPhase::Initiated;
        Ok(vec![])
    }

    /// Submit the verification code for confirmation.
    ///
    /// The phase is unchanged until the backend's verdict arrives via
    /// [`CallMachine::verified`].
    ///
    /// # Errors
    ///
    /// Returns [`CallError::EmptyCode`] for an empty code, or
    /// [`CallError::InvalidTransition`] if not `Initiated`.
    pub fn confirm(&mut self, code: &str) -> Result<Vec<CallAction>, CallError> {
        let CallPhase::Initiated = self.phase else {
            return Err(CallError::InvalidTransition { phase: self.phase, operation: "confirm" });
        };
        if code.is_empty() {
            return Err(CallError::EmptyCode);
        }

        let call_id = self.require_call_id();
        Ok(vec![CallAction::SendConfirm { call_id, code: code.to_string() }])
    }

    /// Backend verdict on the submitted code.
    ///
    /// A rejected code (`is_verified == false`) leaves the machine in
    /// `Initiated`; the user may retry. A verified code activates the call:
    /// the activation timestamp is recorded, the media channel is joined and
    /// the 1 Hz duration ticker starts.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidTransition`] if not `Initiated`.
    pub fn verified(
        &mut self,
        is_verified: bool,
        now_ms: i64,
    ) -> Result<Vec<CallAction>, CallError> {
        if self.phase != CallPhase::Initiated {
            return Err(CallError::InvalidTransition { phase: self.phase, operation: "verified" });
        }
        if !is_verified {
            return Ok(vec![]);
        }

        if let Some(session) = self.session.as_mut() {
            session.started_at_ms = Some(now_ms);
        }
        self.phase = CallPhase::Active;
        Ok(vec![
            CallAction::JoinMedia { call_id: self.require_call_id() },
            CallAction::StartTicker,
        ])
    }

    /// Cancel an unconfirmed call. No backend notification is required.
    ///
    /// Canceling in `Idle` is a documented no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidTransition`] from `Initiating`, `Active`
    /// or `Ended` (an active call must be ended, not canceled).
    pub fn cancel(&mut self) -> Result<Vec<CallAction>, CallError> {
        match self.phase {
            CallPhase::Idle => Ok(vec![]),
            CallPhase::Initiated => {
                self.clear_session();
                self.phase = CallPhase::Idle;
                Ok(vec![])
            },
            phase => Err(CallError::InvalidTransition { phase, operation: "cancel" }),
        }
    }

    /// One second of active call time has elapsed.
    ///
    /// A no-op outside `Active`: a ticker racing with `end` must never
    /// corrupt state.
    pub fn tick(&mut self) {
        if self.phase == CallPhase::Active
            && let Some(session) = self.session.as_mut()
        {
            session.duration_seconds += 1;
        }
    }

    /// End the active call.
    ///
    /// The elapsed duration is captured into the returned `SendEnd` action
    /// at this moment. A second `end` while the first is still pending is a
    /// documented no-op (returns no actions), preventing duplicate duration
    /// submissions.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidTransition`] if not `Active`.
    pub fn end(&mut self) -> Result<Vec<CallAction>, CallError> {
        if self.phase != CallPhase::Active {
            return Err(CallError::InvalidTransition { phase: self.phase, operation: "end" });
        }
        if self.end_in_flight {
            return Ok(vec![]);
        }

        self.end_in_flight = true;
        let duration_seconds = self.session.as_ref().map_or(0, |s| s.duration_seconds);
        Ok(vec![CallAction::SendEnd { call_id: self.require_call_id(), duration_seconds }])
    }

    /// Backend confirmed `end`: tear down the active call.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidTransition`] if not `Active`.
    pub fn ended(&mut self) -> Result<Vec<CallAction>, CallError> {
        if self.phase != CallPhase::Active {
            return Err(CallError::InvalidTransition { phase: self.phase, operation: "ended" });
        }

        self.phase = CallPhase::Ended;
        self.end_in_flight = false;
        self.video_enabled = false;
        Ok(vec![
            CallAction::LeaveMedia,
            CallAction::StopTicker,
            CallAction::ScheduleReset { after: self.config.ended_grace },
        ])
    }

    /// The ended-state grace period elapsed.
    ///
    /// Resets to `Idle` and clears the session. A no-op in any other phase,
    /// so a stale reset timer from a previous call cannot disturb a new one.
    pub fn grace_elapsed(&mut self) {
        if self.phase == CallPhase::Ended {
            self.clear_session();
            self.phase = CallPhase::Idle;
        }
    }

    /// Forced teardown (logout or backend failure): abort to `Idle`.
    ///
    /// Infallible and valid from every phase. Emits media/ticker cleanup
    /// actions only if the call was `Active`.
    pub fn abort(&mut self) -> Vec<CallAction> {
        let was_active = self.phase == CallPhase::Active;
        self.clear_session();
        self.phase = CallPhase::Idle;
        if was_active { vec![CallAction::LeaveMedia, CallAction::StopTicker] } else { vec![] }
    }

    /// Toggle the orthogonal video layer.
    ///
    /// Applies only while `Active`; returns whether the flag was applied.
    pub fn set_video(&mut self, enabled: bool) -> bool {
        if self.phase == CallPhase::Active {
            self.video_enabled = enabled;
            true
        } else {
            false
        }
    }

    fn clear_session(&mut self) {
        self.session = None;
        self.pending_recipient = None;
        self.end_in_flight = false;
        self.video_enabled = false;
    }

    // Session invariantly exists in Initiated/Active; empty id otherwise.
    fn require_call_id(&self) -> String {
        self.session.as_ref().map(|s| s.call_id.clone()).unwrap_or_default()
    }
}

impl Default for CallMachine {
    fn default() -> Self {
        Self::new(CallConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initiated_machine() -> CallMachine {
        let mut machine = CallMachine::default();
        machine.initiate("2").unwrap();
        machine.initiated("c1", "4821").unwrap();
        machine
    }

    fn active_machine() -> CallMachine {
        let mut machine = initiated_machine();
        machine.confirm("4821").unwrap();
        machine.verified(true, 1_700_000_000_000).unwrap();
        machine
    }

    #[test]
    fn call_lifecycle() {
        let mut machine = CallMachine::default();
        assert_eq!(machine.phase(), CallPhase::Idle);

        let actions = machine.initiate("2").unwrap();
        assert_eq!(machine.phase(), CallPhase::Initiating);
        assert_eq!(actions, vec![CallAction::SendInitiate { recipient_id: "2".into() }]);

        machine.initiated("c1", "4821").unwrap();
        assert_eq!(machine.phase(), CallPhase::Initiated);
        let session = machine.session().unwrap();
        assert_eq!(session.call_id, "c1");
        assert_eq!(session.verification_code, "4821");
        assert_eq!(session.duration_seconds, 0);

        let actions = machine.confirm("4821").unwrap();
        assert_eq!(actions, vec![CallAction::SendConfirm { call_id: "c1".into(), code: "4821".into() }]);
        assert_eq!(machine.phase(), CallPhase::Initiated);

        let actions = machine.verified(true, 1_700_000_000_000).unwrap();
        assert_eq!(machine.phase(), CallPhase::Active);
        assert_eq!(
            actions,
            vec![CallAction::JoinMedia { call_id: "c1".into() }, CallAction::StartTicker]
        );
        assert_eq!(machine.session().unwrap().started_at_ms, Some(1_700_000_000_000));

        machine.tick();
        let actions = machine.end().unwrap();
        assert_eq!(
            actions,
            vec![CallAction::SendEnd { call_id: "c1".into(), duration_seconds: 1 }]
        );

        let actions = machine.ended().unwrap();
        assert_eq!(machine.phase(), CallPhase::Ended);
        assert_eq!(
            actions,
            vec![
                CallAction::LeaveMedia,
                CallAction::StopTicker,
                CallAction::ScheduleReset { after: Duration::from_millis(1500) },
            ]
        );

        machine.grace_elapsed();
        assert_eq!(machine.phase(), CallPhase::Idle);
        assert!(machine.session().is_none());
    }

    #[test]
    fn recipient_validation_is_local() {
        let mut machine = CallMachine::default();
        assert_eq!(machine.initiate(""), Err(CallError::InvalidRecipient));
        assert_eq!(machine.initiate("abc"), Err(CallError::InvalidRecipient));
        assert_eq!(machine.initiate("12a"), Err(CallError::InvalidRecipient));
        // Failed validation leaves the machine untouched.
        assert_eq!(machine.phase(), CallPhase::Idle);
    }

    #[test]
    fn rejected_code_stays_initiated() {
        let mut machine = initiated_machine();
        let actions = machine.verified(false, 0).unwrap();
        assert!(actions.is_empty());
        assert_eq!(machine.phase(), CallPhase::Initiated);

        // The user may retry.
        machine.confirm("4821").unwrap();
        machine.verified(true, 0).unwrap();
        assert_eq!(machine.phase(), CallPhase::Active);
    }

    #[test]
    fn empty_code_rejected_locally() {
        let mut machine = initiated_machine();
        assert_eq!(machine.confirm(""), Err(CallError::EmptyCode));
        assert_eq!(machine.phase(), CallPhase::Initiated);
    }

    #[test]
    fn cancel_discards_session() {
        let mut machine = initiated_machine();
        machine.cancel().unwrap();
        assert_eq!(machine.phase(), CallPhase::Idle);
        assert!(machine.session().is_none());

        // Cancel in Idle is a no-op.
        assert_eq!(machine.cancel(), Ok(vec![]));

        // An active call cannot be canceled.
        let mut machine = active_machine();
        assert!(matches!(machine.cancel(), Err(CallError::InvalidTransition { .. })));
    }

    #[test]
    fn duration_counts_only_while_active() {
        let mut machine = initiated_machine();
        machine.tick();
        machine.tick();
        assert_eq!(machine.session().unwrap().duration_seconds, 0);

        machine.confirm("4821").unwrap();
        machine.verified(true, 0).unwrap();
        for _ in 0..125 {
            machine.tick();
        }
        let actions = machine.end().unwrap();
        assert_eq!(
            actions,
            vec![CallAction::SendEnd { call_id: "c1".into(), duration_seconds: 125 }]
        );

        // Late ticks while the end request is pending do not change the
        // captured duration.
        machine.tick();
        machine.ended().unwrap();
        machine.tick();
        assert_eq!(machine.phase(), CallPhase::Ended);
    }

    #[test]
    fn second_end_while_pending_is_noop() {
        let mut machine = active_machine();
        let first = machine.end().unwrap();
        assert_eq!(first.len(), 1);

        let second = machine.end().unwrap();
        assert!(second.is_empty());

        machine.ended().unwrap();
        assert_eq!(machine.phase(), CallPhase::Ended);
    }

    #[test]
    fn new_call_from_ended_discards_stale_session() {
        let mut machine = active_machine();
        machine.end().unwrap();
        machine.ended().unwrap();

        let actions = machine.initiate("7").unwrap();
        assert_eq!(machine.phase(), CallPhase::Initiating);
        assert_eq!(actions, vec![CallAction::SendInitiate { recipient_id: "7".into() }]);
        assert!(machine.session().is_none());
    }

    #[test]
    fn invalid_recipient_from_ended_preserves_the_session() {
        let mut machine = active_machine();
        machine.end().unwrap();
        machine.ended().unwrap();

        // A rejected initiate during the ended grace must not discard the
        // lingering session.
        assert_eq!(machine.initiate(""), Err(CallError::InvalidRecipient));
        assert_eq!(machine.phase(), CallPhase::Ended);
        assert!(machine.session().is_some());

        // The grace reset still completes normally afterwards.
        machine.grace_elapsed();
        assert_eq!(machine.phase(), CallPhase::Idle);
        assert!(machine.session().is_none());
    }

    #[test]
    fn stale_grace_timer_cannot_disturb_new_call() {
        let mut machine = active_machine();
        machine.end().unwrap();
        machine.ended().unwrap();
        machine.initiate("7").unwrap();

        // The previous call's reset fires late: nothing happens.
        machine.grace_elapsed();
        assert_eq!(machine.phase(), CallPhase::Initiating);
    }

    #[test]
    fn abort_tears_down_from_any_phase() {
        let mut machine = active_machine();
        let actions = machine.abort();
        assert_eq!(actions, vec![CallAction::LeaveMedia, CallAction::StopTicker]);
        assert_eq!(machine.phase(), CallPhase::Idle);
        assert!(machine.session().is_none());

        let mut machine = initiated_machine();
        assert!(machine.abort().is_empty());
        assert_eq!(machine.phase(), CallPhase::Idle);
    }

    #[test]
    fn video_layer_is_orthogonal_to_active() {
        let mut machine = initiated_machine();
        assert!(!machine.set_video(true));
        assert!(!machine.video_enabled());

        machine.confirm("4821").unwrap();
        machine.verified(true, 0).unwrap();
        assert!(machine.set_video(true));
        assert!(machine.video_enabled());
        assert_eq!(machine.phase(), CallPhase::Active);

        machine.end().unwrap();
        machine.ended().unwrap();
        assert!(!machine.video_enabled());
    }

    #[test]
    fn invalid_transitions_are_checked() {
        let mut machine = CallMachine::default();
        assert!(matches!(machine.confirm("1"), Err(CallError::InvalidTransition { .. })));
        assert!(matches!(machine.end(), Err(CallError::InvalidTransition { .. })));
        assert!(matches!(machine.ended(), Err(CallError::InvalidTransition { .. })));
        assert!(matches!(machine.initiated("c", "v"), Err(CallError::InvalidTransition { .. })));
        assert!(matches!(machine.verified(true, 0), Err(CallError::InvalidTransition { .. })));

        machine.initiate("2").unwrap();
        assert!(matches!(machine.initiate("3"), Err(CallError::InvalidTransition { .. })));
    }

    #[test]
    fn snapshot_reflects_machine_state() {
        let machine = CallMachine::default();
        assert_eq!(machine.snapshot(), CallSnapshot::default());

        let mut machine = active_machine();
        machine.tick();
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.phase, CallPhase::Active);
        assert_eq!(snapshot.call_id.as_deref(), Some("c1"));
        assert_eq!(snapshot.verification_code.as_deref(), Some("4821"));
        assert_eq!(snapshot.duration_seconds, 1);
    }
}
