//! Client facade: wires the vault, transport, and media engine into the
//! session, pipeline, API surfaces, and call controller.

use std::sync::Arc;

use voicelink_core::CallConfig;

use crate::api::{AuthApi, CallApi, MediaApi, UserProfile};
use crate::controller::CallController;
use crate::device::DeviceIdentityProvider;
use crate::error::{ApiError, SessionError};
use crate::media::MediaChannel;
use crate::pipeline::RequestPipeline;
use crate::session::{SessionConfig, SessionManager};
use crate::transport::Transport;
use crate::vault::CredentialVault;

/// Top-level client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Session manager tuning.
    pub session: SessionConfig,
    /// Call lifecycle tuning.
    pub call: CallConfig,
}

/// The assembled client.
///
/// Generic over the three platform seams so tests can substitute all of
/// them; production code plugs in the platform keychain, the HTTP
/// transport, and the real media engine.
pub struct VoiceClient<V, T, M> {
    session: Arc<SessionManager<V, T>>,
    auth: AuthApi<V, T>,
    calls: CallController<V, T, M>,
}

impl<V, T, M> VoiceClient<V, T, M>
where
    V: CredentialVault,
    T: Transport,
    M: MediaChannel,
{
    /// Wire a client from its three platform seams.
    pub fn new(vault: Arc<V>, transport: Arc<T>, media: Arc<M>, config: ClientConfig) -> Self {
        let session = Arc::new(SessionManager::new(
            Arc::clone(&vault),
            Arc::clone(&transport),
            config.session,
        ));
        let device = Arc::new(DeviceIdentityProvider::new(vault));
        let pipeline =
            Arc::new(RequestPipeline::new(Arc::clone(&session), device, transport));
        let auth = AuthApi::new(Arc::clone(&pipeline), Arc::clone(&session));
        let calls = CallController::new(
            CallApi::new(Arc::clone(&pipeline)),
            MediaApi::new(pipeline),
            Arc::clone(&session),
            media,
            config.call,
        );
        Self { session, auth, calls }
    }

    /// Authentication endpoints.
    pub fn auth(&self) -> &AuthApi<V, T> {
        &self.auth
    }

    /// The call controller.
    pub fn calls(&self) -> &CallController<V, T, M> {
        &self.calls
    }

    /// The session manager.
    pub fn session(&self) -> &Arc<SessionManager<V, T>> {
        &self.session
    }

    /// Restore a persisted session, if one is present and still usable.
    ///
    /// Returns the authenticated user's profile, or `None` when the user
    /// must log in. A persisted session that cannot be revalidated is
    /// cleared and reported as `None`, never as an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Vault`] only for secure-store failures.
    pub async fn init(&self) -> Result<Option<UserProfile>, SessionError> {
        if self.session.init().await?.is_none() {
            return Ok(None);
        }
        match self.session.valid_access_token().await {
            Ok(Some(_)) => {},
            Ok(None) | Err(SessionError::Expired) => return Ok(None),
            Err(SessionError::TokenDecode(error)) => {
                tracing::warn!(%error, "persisted credential undecodable; clearing");
                self.session.clear_tokens().await;
                return Ok(None);
            },
            Err(error) => return Err(error),
        }
        match self.auth.me().await {
            Ok(profile) => Ok(Some(profile)),
            Err(ApiError::Vault(error)) => Err(error.into()),
            Err(error) => {
                tracing::warn!(%error, "persisted session failed revalidation");
                self.session.clear_tokens().await;
                Ok(None)
            },
        }
    }

    /// Tear the client down: abort any call, notify the backend, clear
    /// credentials. Never fails.
    pub async fn teardown(&self) {
        self.calls.teardown().await;
        self.auth.logout().await;
    }
}
