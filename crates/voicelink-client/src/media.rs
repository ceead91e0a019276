//! Media channel seam.

use async_trait::async_trait;

use crate::error::MediaError;

/// Real-time audio channel, implemented by the platform media engine.
///
/// The controller drives this trait from the call lifecycle: join after
/// verification, leave on end or abort. Implementations must make
/// `leave` safe to call when not joined.
#[async_trait]
pub trait MediaChannel: Send + Sync + 'static {
    /// Join `channel_id` as `uid`, authorized by `token`.
    async fn join(&self, token: &str, channel_id: &str, uid: u32) -> Result<(), MediaError>;

    /// Leave the current channel. A no-op when not joined.
    async fn leave(&self) -> Result<(), MediaError>;

    /// Mute or unmute the local microphone.
    async fn mute_local_audio(&self, muted: bool) -> Result<(), MediaError>;

    /// Route audio to the speakerphone or the earpiece.
    async fn set_speakerphone(&self, enabled: bool) -> Result<(), MediaError>;
}
