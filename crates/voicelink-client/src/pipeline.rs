//! Request pipeline: the single path every authenticated request takes.
//!
//! The pipeline decorates each outgoing request with a fresh bearer
//! token, the device identity, and a strictly monotonic timestamp, then
//! maps the response through one recovery pass: a single 401 triggers a
//! silent refresh and replay, a second 401 ends the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::Value;

use crate::clock;
use crate::device::DeviceIdentityProvider;
use crate::error::ApiError;
use crate::session::SessionManager;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};
use crate::vault::CredentialVault;

/// Fallback wait when a rate-limit response carries no retry hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Decorates, dispatches, and recovers authenticated requests.
pub struct RequestPipeline<V, T> {
    session: Arc<SessionManager<V, T>>,
    device: Arc<DeviceIdentityProvider<V>>,
    transport: Arc<T>,
    last_timestamp_ms: AtomicI64,
}

impl<V: CredentialVault, T: Transport> RequestPipeline<V, T> {
    /// Create a pipeline over an existing session and device provider.
    pub fn new(
        session: Arc<SessionManager<V, T>>,
        device: Arc<DeviceIdentityProvider<V>>,
        transport: Arc<T>,
    ) -> Self {
        Self { session, device, transport, last_timestamp_ms: AtomicI64::new(0) }
    }

    /// `GET path` through the pipeline.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Get, path, None).await
    }

    /// `POST path` through the pipeline.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Post, path, body).await
    }

    /// `PATCH path` through the pipeline.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn patch(&self, path: &str, body: Option<Value>) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Patch, path, body).await
    }

    /// `DELETE path` through the pipeline.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Delete, path, None).await
    }

    /// Send one request through the full decorate/dispatch/recover path.
    ///
    /// # Errors
    ///
    /// - [`ApiError::AuthenticationFailed`] when a 401 could not be
    ///   recovered; credentials are already cleared.
    /// - [`ApiError::RateLimited`] for a 429, with the backend's retry
    ///   hint when it sent one.
    /// - [`ApiError::Backend`] for any other non-2xx status.
    /// - Transport and session errors propagate as their own variants.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, ApiError> {
        let token = self.session.valid_access_token().await?;
        let response = self.dispatch(method, path, body.clone(), token.as_deref()).await?;
        if response.status != 401 {
            return Self::finish(response);
        }

        tracing::debug!(path, "request rejected with 401; attempting refresh and replay");
        let refreshed = self.session.refresh_access_token().await;
        let Ok(Some(new_token)) = refreshed else {
            self.session.clear_tokens().await;
            return Err(ApiError::AuthenticationFailed);
        };
        let replay = self.dispatch(method, path, body, Some(&new_token)).await?;
        if replay.status == 401 {
            tracing::warn!(path, "replay rejected with 401; ending session");
            self.session.clear_tokens().await;
            return Err(ApiError::AuthenticationFailed);
        }
        Self::finish(replay)
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = ApiRequest::new(method, path, body);
        if let Some(token) = token {
            request.headers.push(("Authorization".to_owned(), format!("Bearer {token}")));
        }
        let device_id = self.device.device_id().await?;
        request.headers.push(("X-Device-ID".to_owned(), device_id));
        request
            .headers
            .push(("X-Request-Timestamp".to_owned(), self.next_timestamp().to_string()));
        Ok(self.transport.send(request).await?)
    }

    fn finish(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.status == 429 {
            return Err(ApiError::RateLimited {
                retry_after_secs: response.retry_after_secs().unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            });
        }
        if !response.is_success() {
            return Err(ApiError::Backend { status: response.status, detail: response.detail() });
        }
        Ok(response)
    }

    /// Strictly increasing even when the wall clock stalls or steps back:
    /// each issued value is at least one past the previous.
    fn next_timestamp(&self) -> i64 {
        let mut prev = self.last_timestamp_ms.load(Ordering::Relaxed);
        loop {
            let next = clock::epoch_ms().max(prev + 1);
            match self.last_timestamp_ms.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}
