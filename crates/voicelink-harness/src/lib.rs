//! Test doubles for the voicelink client's platform seams.
//!
//! Everything here is deterministic and in-memory: a vault backed by a
//! hash map, a transport that replays scripted responses while logging
//! every request, a media engine that records its event stream, and a
//! helper for minting decodable unsigned tokens.

pub mod fake_media;
pub mod jwt;
pub mod mem_vault;
pub mod mock_transport;

pub use fake_media::{FakeMedia, MediaEvent};
pub use jwt::{make_token, make_token_for};
pub use mem_vault::MemVault;
pub use mock_transport::{MockTransport, Scripted};
