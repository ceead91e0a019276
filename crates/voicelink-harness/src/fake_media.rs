//! Recording media engine.

use std::sync::Mutex;

use async_trait::async_trait;
use voicelink_client::error::MediaError;
use voicelink_client::media::MediaChannel;

/// One observed media operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// Joined a channel.
    Joined {
        /// Channel joined.
        channel: String,
        /// Identity used.
        uid: u32,
    },
    /// Left the channel.
    Left,
    /// Microphone mute toggled.
    Muted(bool),
    /// Speakerphone routing toggled.
    Speakerphone(bool),
}

/// Records every operation; optionally fails the next join.
#[derive(Default)]
pub struct FakeMedia {
    events: Mutex<Vec<MediaEvent>>,
    fail_join: Mutex<Option<String>>,
}

impl FakeMedia {
    /// A fresh engine with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `join` fail with the given message.
    pub fn fail_next_join(&self, message: &str) {
        *self.lock_fail() = Some(message.to_owned());
    }

    /// Everything observed so far, in order.
    pub fn events(&self) -> Vec<MediaEvent> {
        self.lock_events().clone()
    }

    /// Whether the engine currently sits in a channel.
    pub fn joined(&self) -> bool {
        let events = self.lock_events();
        matches!(
            events.iter().rev().find(|event| {
                matches!(event, MediaEvent::Joined { .. } | MediaEvent::Left)
            }),
            Some(MediaEvent::Joined { .. })
        )
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, Vec<MediaEvent>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_fail(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.fail_join.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl MediaChannel for FakeMedia {
    async fn join(&self, _token: &str, channel_id: &str, uid: u32) -> Result<(), MediaError> {
        if let Some(message) = self.lock_fail().take() {
            return Err(MediaError(message));
        }
        self.lock_events().push(MediaEvent::Joined { channel: channel_id.to_owned(), uid });
        Ok(())
    }

    async fn leave(&self) -> Result<(), MediaError> {
        self.lock_events().push(MediaEvent::Left);
        Ok(())
    }

    async fn mute_local_audio(&self, muted: bool) -> Result<(), MediaError> {
        self.lock_events().push(MediaEvent::Muted(muted));
        Ok(())
    }

    async fn set_speakerphone(&self, enabled: bool) -> Result<(), MediaError> {
        self.lock_events().push(MediaEvent::Speakerphone(enabled));
        Ok(())
    }
}
