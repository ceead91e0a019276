//! Scripted transport that records every request it sees.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use voicelink_client::error::TransportError;
use voicelink_client::transport::{ApiRequest, ApiResponse, Transport};

/// One scripted outcome.
pub enum Scripted {
    /// Respond with this status and body, after an optional delay.
    Respond {
        /// HTTP status.
        status: u16,
        /// JSON body.
        body: Value,
        /// Extra response headers, lowercase names.
        headers: Vec<(String, String)>,
        /// Virtual-time delay before the response lands.
        delay: Duration,
    },
    /// Fail at the transport layer.
    Fail(String),
}

/// Replays scripted outcomes in order and logs requests for assertions.
///
/// An exhausted script answers 200 with an empty object, so tests only
/// script the exchanges they care about.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    /// An empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a JSON response.
    pub fn push_json(&self, status: u16, body: Value) {
        self.push(Scripted::Respond { status, body, headers: Vec::new(), delay: Duration::ZERO });
    }

    /// Script a JSON response with extra headers (lowercase names).
    pub fn push_json_with_headers(&self, status: u16, body: Value, headers: &[(&str, &str)]) {
        self.push(Scripted::Respond {
            status,
            body,
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
            delay: Duration::ZERO,
        });
    }

    /// Script a response that lands only after `delay` of virtual time.
    pub fn push_delayed(&self, status: u16, body: Value, delay: Duration) {
        self.push(Scripted::Respond { status, body, headers: Vec::new(), delay });
    }

    /// Script a transport-level failure.
    pub fn push_error(&self, message: &str) {
        self.push(Scripted::Fail(message.to_owned()));
    }

    /// Script any outcome.
    pub fn push(&self, scripted: Scripted) {
        self.lock_script().push_back(scripted);
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock_log().clone()
    }

    /// How many requests hit the given path.
    pub fn requests_to(&self, path: &str) -> usize {
        self.lock_log().iter().filter(|request| request.path == path).count()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Vec<ApiRequest>> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.lock_log().push(request);
        let scripted = self.lock_script().pop_front();
        match scripted {
            Some(Scripted::Respond { status, body, headers, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(ApiResponse { status, body, headers: headers.into_iter().collect() })
            },
            Some(Scripted::Fail(message)) => Err(TransportError(message)),
            None => Ok(ApiResponse { status: 200, body: json!({}), headers: Default::default() }),
        }
    }
}
