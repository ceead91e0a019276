//! Typed endpoint surfaces over the request pipeline.
//!
//! Each struct groups a backend resource's endpoints and deserializes
//! responses into owned types. Authentication endpoints also feed the
//! session manager so the credential record stays in step with the
//! backend's answers.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::pipeline::RequestPipeline;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::vault::CredentialVault;

/// The authenticated user's profile.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    /// Backend user id.
    pub id: u64,
    /// Login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Subscription plan, when the backend exposes one.
    #[serde(default)]
    pub plan: Option<String>,
    /// Whether the account is active.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Login and registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Access token.
    pub token: String,
    /// Refresh token, when issued.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// The authenticated user.
    pub user: UserProfile,
}

/// Payload returned when a call is created.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateCallResponse {
    /// Backend call id.
    pub call_id: String,
    /// Code the recipient must confirm.
    pub verification_code: String,
    /// When the code stops being accepted.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Payload returned from a code confirmation attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmCodeResponse {
    /// Whether the submitted code matched.
    pub is_verified: bool,
    /// Backend call status string, when present.
    #[serde(default)]
    pub status: Option<String>,
}

/// Acknowledgement of a call-end submission.
#[derive(Debug, Clone, Deserialize)]
pub struct EndCallResponse {
    /// Backend call status string, when present.
    #[serde(default)]
    pub status: Option<String>,
    /// Duration the backend recorded, when echoed.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
}

/// One past call.
#[derive(Debug, Clone, Deserialize)]
pub struct CallRecord {
    /// Backend call id.
    pub call_id: String,
    /// Caller user id.
    pub caller_id: u64,
    /// Recipient user id.
    pub recipient_id: u64,
    /// Backend call status string.
    pub status: String,
    /// Recorded duration, when the call completed.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    /// Creation timestamp, backend-formatted.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A page of past calls.
#[derive(Debug, Clone, Deserialize)]
pub struct CallHistory {
    /// Records in this page.
    pub calls: Vec<CallRecord>,
    /// Total records available.
    pub total: u64,
}

/// Acknowledgement of an abuse report.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportCallResponse {
    /// Backend report status string, when present.
    #[serde(default)]
    pub status: Option<String>,
}

/// Short-lived media channel credential.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaTokenResponse {
    /// Channel token.
    pub token: String,
    /// Media provider application id, when the backend supplies it.
    #[serde(default)]
    pub app_id: Option<String>,
    /// Channel this token is scoped to.
    pub channel_name: String,
    /// Numeric identity the token is bound to.
    pub uid: u32,
}

/// Authentication endpoints.
pub struct AuthApi<V, T> {
    pipeline: Arc<RequestPipeline<V, T>>,
    session: Arc<SessionManager<V, T>>,
}

impl<V: CredentialVault, T: Transport> AuthApi<V, T> {
    /// Create the surface over a shared pipeline and session.
    pub fn new(
        pipeline: Arc<RequestPipeline<V, T>>,
        session: Arc<SessionManager<V, T>>,
    ) -> Self {
        Self { pipeline, session }
    }

    /// Authenticate with email and password, persisting the resulting
    /// credential record before returning.
    ///
    /// # Errors
    ///
    /// Backend rejections surface as [`ApiError::Backend`]; a token the
    /// client cannot decode surfaces as [`ApiError::Session`].
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let response = self
            .pipeline
            .post("/auth/login", Some(json!({ "email": email, "password": password })))
            .await?;
        let auth: AuthResponse = serde_json::from_value(response.body)?;
        self.store_grant(&auth).await?;
        Ok(auth)
    }

    /// Create an account and authenticate in one step.
    ///
    /// # Errors
    ///
    /// Same surface as [`AuthApi::login`].
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = json!({
            "email": email,
            "password": password,
            "name": name,
            "gdpr_accepted": true,
        });
        let response = self.pipeline.post("/auth/register", Some(body)).await?;
        let auth: AuthResponse = serde_json::from_value(response.body)?;
        self.store_grant(&auth).await?;
        Ok(auth)
    }

    /// Fetch the authenticated user's profile.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        let response = self.pipeline.get("/users/me").await?;
        Ok(serde_json::from_value(response.body)?)
    }

    /// End the session: notify the backend, then clear local credentials.
    ///
    /// The notification is best-effort; local credentials are cleared even
    /// when the backend is unreachable.
    pub async fn logout(&self) {
        if let Err(error) = self.pipeline.post("/auth/logout", None).await {
            tracing::warn!(%error, "logout notification failed; clearing locally anyway");
        }
        self.session.clear_tokens().await;
    }

    async fn store_grant(&self, auth: &AuthResponse) -> Result<(), ApiError> {
        self.session
            .store_tokens(
                &auth.token,
                auth.refresh_token.as_deref(),
                Some(&auth.user.id.to_string()),
            )
            .await?;
        Ok(())
    }
}

/// Call endpoints.
pub struct CallApi<V, T> {
    pipeline: Arc<RequestPipeline<V, T>>,
}

impl<V: CredentialVault, T: Transport> CallApi<V, T> {
    /// Create the surface over a shared pipeline.
    pub fn new(pipeline: Arc<RequestPipeline<V, T>>) -> Self {
        Self { pipeline }
    }

    /// Create a call to the given recipient.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn initiate(&self, recipient_id: &str) -> Result<InitiateCallResponse, ApiError> {
        let response = self
            .pipeline
            .post("/calls/initiate", Some(json!({ "recipient_id": recipient_id })))
            .await?;
        Ok(serde_json::from_value(response.body)?)
    }

    /// Submit the verification code the recipient read out.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn confirm_code(
        &self,
        call_id: &str,
        code: &str,
    ) -> Result<ConfirmCodeResponse, ApiError> {
        let response = self
            .pipeline
            .post(&format!("/calls/{call_id}/confirm-code"), Some(json!({ "code": code })))
            .await?;
        Ok(serde_json::from_value(response.body)?)
    }

    /// Report a call finished, with its measured duration.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn end(
        &self,
        call_id: &str,
        duration_seconds: u64,
    ) -> Result<EndCallResponse, ApiError> {
        let response = self
            .pipeline
            .post(
                &format!("/calls/{call_id}/end"),
                Some(json!({ "duration_seconds": duration_seconds })),
            )
            .await?;
        Ok(serde_json::from_value(response.body)?)
    }

    /// Fetch a page of past calls.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn history(&self, limit: u32, offset: u32) -> Result<CallHistory, ApiError> {
        let response =
            self.pipeline.get(&format!("/calls/history?limit={limit}&offset={offset}")).await?;
        Ok(serde_json::from_value(response.body)?)
    }

    /// Report a call for abuse, with an optional free-text description.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn report(
        &self,
        call_id: &str,
        reason: &str,
        description: Option<&str>,
    ) -> Result<ReportCallResponse, ApiError> {
        let mut body = json!({ "reason": reason });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        let response =
            self.pipeline.post(&format!("/calls/{call_id}/report"), Some(body)).await?;
        Ok(serde_json::from_value(response.body)?)
    }
}

/// Media credential endpoint.
pub struct MediaApi<V, T> {
    pipeline: Arc<RequestPipeline<V, T>>,
}

impl<V: CredentialVault, T: Transport> MediaApi<V, T> {
    /// Create the surface over a shared pipeline.
    pub fn new(pipeline: Arc<RequestPipeline<V, T>>) -> Self {
        Self { pipeline }
    }

    /// Fetch a channel token for the given channel and numeric identity.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::execute`].
    pub async fn token(
        &self,
        channel_name: &str,
        uid: u32,
    ) -> Result<MediaTokenResponse, ApiError> {
        let response = self
            .pipeline
            .post(&format!("/agora/token?channel_name={channel_name}&uid={uid}"), None)
            .await?;
        Ok(serde_json::from_value(response.body)?)
    }
}
