//! Voicelink async client core
//!
//! The reusable, UI-free core of the voice-calling client: credential
//! lifecycle, authenticated request pipeline, and the call controller that
//! drives the pure state machine in [`voicelink_core`].
//!
//! # Architecture
//!
//! All I/O sits behind capability traits so the same orchestration code
//! runs against production implementations (platform keychain, HTTP,
//! real-time media engine) and against deterministic test doubles:
//!
//! - [`CredentialVault`]: scoped secure key/value persistence
//! - [`Transport`]: the backend HTTP boundary ([`HttpTransport`] in
//!   production)
//! - [`MediaChannel`]: the black-box audio/video engine
//!
//! Core state is owned by exactly one component: the [`SessionManager`]
//! owns the credential record, the [`CallController`] owns the call
//! session. The UI layer observes both through read-only snapshots and
//! mutates them only through the documented operations.
//!
//! # Components
//!
//! - [`session`]: Token lifecycle (store, validity, silent refresh, clear)
//! - [`device`]: Stable per-install device identity
//! - [`pipeline`]: Identity/timestamp injection, one-shot 401 retry, 429
//!   signaling
//! - [`api`]: Typed endpoint wrappers validated at the boundary
//! - [`controller`]: Call lifecycle orchestration and duration accounting
//! - [`monitor`]: Cancellable, restartable status subscriptions
//! - [`client`]: Assembled facade with explicit init/teardown lifecycle

pub mod api;
pub mod client;
mod clock;
pub mod controller;
pub mod device;
pub mod error;
pub mod media;
pub mod monitor;
pub mod pipeline;
pub mod session;
pub mod transport;
pub mod vault;

pub use api::{AuthApi, CallApi, MediaApi, UserProfile};
pub use client::{ClientConfig, VoiceClient};
pub use controller::CallController;
pub use device::DeviceIdentityProvider;
pub use error::{ApiError, CallFlowError, MediaError, SessionError, TransportError, VaultError};
pub use media::MediaChannel;
pub use monitor::{StatusFeed, StatusProbe};
pub use pipeline::RequestPipeline;
pub use session::{SessionConfig, SessionManager};
pub use transport::{ApiRequest, ApiResponse, HttpConfig, HttpTransport, Method, Transport};
pub use vault::CredentialVault;
