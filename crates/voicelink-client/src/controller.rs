//! Call controller: drives the pure lifecycle machine against the world.
//!
//! The machine decides, the controller executes. Every public entry
//! point takes the machine lock, applies one transition, publishes the
//! new snapshot, then works through the returned actions. Action
//! execution may itself produce follow-up transitions (a backend reply
//! is fed straight back into the machine), so actions are drained from a
//! queue rather than recursed.
//!
//! Lock discipline: the machine sits behind a blocking mutex and is
//! never held across an await. Snapshots flow to observers over a watch
//! channel, so UI code subscribes instead of polling.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use voicelink_core::{CallAction, CallConfig, CallError, CallMachine, CallSnapshot};

use crate::api::{CallApi, MediaApi};
use crate::clock;
use crate::error::{CallFlowError, MediaError};
use crate::media::MediaChannel;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::vault::CredentialVault;

/// Machine plus its snapshot channel; shared with the ticker task.
struct ControllerShared {
    machine: Mutex<CallMachine>,
    updates: watch::Sender<CallSnapshot>,
}

impl ControllerShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, CallMachine> {
        // A panicked holder can only be a test; the machine itself never
        // panics, so the data is still coherent.
        match self.machine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, snapshot: CallSnapshot) {
        self.updates.send_replace(snapshot);
    }
}

/// Owns one call at a time, end to end.
pub struct CallController<V, T, M> {
    shared: Arc<ControllerShared>,
    calls: CallApi<V, T>,
    media_api: MediaApi<V, T>,
    session: Arc<SessionManager<V, T>>,
    media: Arc<M>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    reset: Mutex<Option<JoinHandle<()>>>,
}

impl<V, T, M> CallController<V, T, M>
where
    V: CredentialVault,
    T: Transport,
    M: MediaChannel,
{
    /// Create a controller over the given API surfaces and media engine.
    pub fn new(
        calls: CallApi<V, T>,
        media_api: MediaApi<V, T>,
        session: Arc<SessionManager<V, T>>,
        media: Arc<M>,
        config: CallConfig,
    ) -> Self {
        let machine = CallMachine::new(config);
        let (updates, _) = watch::channel(machine.snapshot());
        Self {
            shared: Arc::new(ControllerShared { machine: Mutex::new(machine), updates }),
            calls,
            media_api,
            session,
            media,
            ticker: Mutex::new(None),
            reset: Mutex::new(None),
        }
    }

    /// Subscribe to lifecycle snapshots. The receiver starts with the
    /// current snapshot and sees every subsequent transition.
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.shared.updates.subscribe()
    }

    /// The current lifecycle snapshot.
    pub fn snapshot(&self) -> CallSnapshot {
        self.shared.lock().snapshot()
    }

    /// Start a call to `recipient_id`.
    ///
    /// # Errors
    ///
    /// Invalid recipients and out-of-phase attempts surface as
    /// [`CallFlowError::Call`]; a backend or media failure aborts the
    /// attempt and surfaces as its own variant.
    pub async fn initiate_call(&self, recipient_id: &str) -> Result<(), CallFlowError> {
        self.cancel_reset();
        let actions = {
            let mut machine = self.shared.lock();
            let actions = machine.initiate(recipient_id)?;
            self.shared.publish(machine.snapshot());
            actions
        };
        self.run(actions).await
    }

    /// Submit the verification code for the pending call.
    ///
    /// # Errors
    ///
    /// [`CallFlowError::Call`] when no call is awaiting a code or the
    /// code is empty; backend failures abort the call.
    pub async fn confirm_code(&self, code: &str) -> Result<(), CallFlowError> {
        let actions = {
            let mut machine = self.shared.lock();
            machine.confirm(code)?
        };
        self.run(actions).await
    }

    /// Abandon a call that has not yet been verified.
    ///
    /// # Errors
    ///
    /// [`CallFlowError::Call`] when the call is past the point of
    /// cancellation.
    pub async fn cancel(&self) -> Result<(), CallFlowError> {
        let actions = {
            let mut machine = self.shared.lock();
            let actions = machine.cancel()?;
            self.shared.publish(machine.snapshot());
            actions
        };
        self.run(actions).await
    }

    /// End the active call, submitting its measured duration.
    ///
    /// Idempotent while the end submission is in flight: a second call
    /// is a no-op rather than a duplicate request.
    ///
    /// # Errors
    ///
    /// [`CallFlowError::Call`] when no call is active; backend failures
    /// abort the call locally.
    pub async fn end_call(&self) -> Result<(), CallFlowError> {
        let actions = {
            let mut machine = self.shared.lock();
            machine.end()?
        };
        self.run(actions).await
    }

    /// Toggle the local video flag. Returns the new value.
    ///
    /// # Errors
    ///
    /// [`CallFlowError::Call`] when no call is active.
    pub fn set_video(&self, enabled: bool) -> Result<bool, CallFlowError> {
        let mut machine = self.shared.lock();
        if !machine.set_video(enabled) {
            return Err(CallError::InvalidTransition {
                phase: machine.phase(),
                operation: "set_video",
            }
            .into());
        }
        self.shared.publish(machine.snapshot());
        Ok(enabled)
    }

    /// Mute or unmute the local microphone. A no-op unless a call is
    /// active.
    ///
    /// # Errors
    ///
    /// Propagates the media engine's failure.
    pub async fn mute_local_audio(&self, muted: bool) -> Result<(), MediaError> {
        if !self.shared.lock().phase().is_active() {
            return Ok(());
        }
        self.media.mute_local_audio(muted).await
    }

    /// Route audio to the speakerphone or the earpiece. A no-op unless a
    /// call is active.
    ///
    /// # Errors
    ///
    /// Propagates the media engine's failure.
    pub async fn set_speakerphone(&self, enabled: bool) -> Result<(), MediaError> {
        if !self.shared.lock().phase().is_active() {
            return Ok(());
        }
        self.media.set_speakerphone(enabled).await
    }

    /// Force the lifecycle back to idle, leaving media if joined. Used
    /// on logout and shutdown; never fails.
    pub async fn teardown(&self) {
        self.abort_internal().await;
    }

    async fn run(&self, actions: Vec<CallAction>) -> Result<(), CallFlowError> {
        let mut queue: VecDeque<CallAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                CallAction::SendInitiate { recipient_id } => {
                    let created = match self.calls.initiate(&recipient_id).await {
                        Ok(created) => created,
                        Err(error) => return self.fail(error.into()).await,
                    };
                    let mut machine = self.shared.lock();
                    let next =
                        machine.initiated(&created.call_id, &created.verification_code);
                    self.shared.publish(machine.snapshot());
                    drop(machine);
                    queue.extend(next.unwrap_or_default());
                },
                CallAction::SendConfirm { call_id, code } => {
                    let outcome = match self.calls.confirm_code(&call_id, &code).await {
                        Ok(outcome) => outcome,
                        Err(error) => return self.fail(error.into()).await,
                    };
                    let mut machine = self.shared.lock();
                    let next = machine.verified(outcome.is_verified, clock::epoch_ms());
                    self.shared.publish(machine.snapshot());
                    drop(machine);
                    queue.extend(next.unwrap_or_default());
                },
                CallAction::SendEnd { call_id, duration_seconds } => {
                    if let Err(error) = self.calls.end(&call_id, duration_seconds).await {
                        return self.fail(error.into()).await;
                    }
                    let mut machine = self.shared.lock();
                    let next = machine.ended();
                    self.shared.publish(machine.snapshot());
                    drop(machine);
                    queue.extend(next.unwrap_or_default());
                },
                CallAction::JoinMedia { call_id } => {
                    if let Err(error) = self.join_media(&call_id).await {
                        return self.fail(error).await;
                    }
                },
                CallAction::LeaveMedia => {
                    if let Err(error) = self.media.leave().await {
                        tracing::warn!(%error, "failed to leave media channel");
                    }
                },
                CallAction::StartTicker => self.start_ticker(),
                CallAction::StopTicker => self.stop_ticker(),
                CallAction::ScheduleReset { after } => self.schedule_reset(after),
            }
        }
        Ok(())
    }

    async fn join_media(&self, call_id: &str) -> Result<(), CallFlowError> {
        let uid = match self.session.user_id().await {
            Ok(Some(user_id)) => user_id.parse::<u32>().unwrap_or(0),
            _ => 0,
        };
        let grant = self.media_api.token(call_id, uid).await?;
        self.media.join(&grant.token, &grant.channel_name, grant.uid).await?;
        Ok(())
    }

    /// A failed action invalidates whatever the machine thinks is in
    /// flight; abort before surfacing the error.
    async fn fail(&self, error: CallFlowError) -> Result<(), CallFlowError> {
        tracing::warn!(%error, "call action failed; aborting call");
        self.abort_internal().await;
        Err(error)
    }

    async fn abort_internal(&self) {
        let cleanup = {
            let mut machine = self.shared.lock();
            let cleanup = machine.abort();
            self.shared.publish(machine.snapshot());
            cleanup
        };
        self.cancel_reset();
        for action in cleanup {
            match action {
                CallAction::LeaveMedia => {
                    if let Err(error) = self.media.leave().await {
                        tracing::warn!(%error, "failed to leave media channel");
                    }
                },
                CallAction::StopTicker => self.stop_ticker(),
                _ => {},
            }
        }
    }

    fn start_ticker(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            // The first tick fires immediately; consume it so the first
            // duration increment lands a full second in.
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut machine = shared.lock();
                machine.tick();
                shared.publish(machine.snapshot());
            }
        });
        self.replace_handle(&self.ticker, Some(handle));
    }

    fn stop_ticker(&self) {
        self.replace_handle(&self.ticker, None);
    }

    fn schedule_reset(&self, after: std::time::Duration) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let mut machine = shared.lock();
            machine.grace_elapsed();
            shared.publish(machine.snapshot());
        });
        self.replace_handle(&self.reset, Some(handle));
    }

    fn cancel_reset(&self) {
        self.replace_handle(&self.reset, None);
    }

    fn replace_handle(&self, slot: &Mutex<Option<JoinHandle<()>>>, next: Option<JoinHandle<()>>) {
        let mut guard = match slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = std::mem::replace(&mut *guard, next) {
            previous.abort();
        }
    }
}

impl<V, T, M> Drop for CallController<V, T, M> {
    fn drop(&mut self) {
        for slot in [&self.ticker, &self.reset] {
            let mut guard = match slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
