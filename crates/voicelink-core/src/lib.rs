//! Voicelink client core logic
//!
//! Pure state machine logic for the voice-calling client, completely
//! decoupled from I/O. This enables deterministic testing of the call
//! lifecycle without a network, a clock, or a runtime.
//!
//! # Architecture
//!
//! The call lifecycle is implemented as a deterministic state machine that
//! is isolated from I/O, time, randomness, and scheduling. All external
//! effects are supplied explicitly by the caller.
//!
//! State transitions produce declarative actions that describe intended
//! effects (send a backend request, join or leave the media channel, start
//! or stop the duration ticker) rather than executing them directly. A
//! runtime or test harness is responsible for interpreting and executing
//! these actions.
//!
//! # Components
//!
//! - [`call`]: Call lifecycle state machine (initiate, verify, active, end)
//! - [`token`]: Access token claim decoding (expiry, issue time, subject)
//! - [`error`]: Call and token error types

pub mod call;
pub mod error;
pub mod token;

pub use call::{CallAction, CallConfig, CallMachine, CallPhase, CallSession, CallSnapshot};
pub use error::{CallError, TokenDecodeError};
pub use token::{TokenClaims, decode_claims};
