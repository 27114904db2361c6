//! Shared types used across the requirements engine: session-id canonicalization,
//! the scope/decision vocabulary, and the fail-open error taxonomy.

pub mod error;
pub mod message;
pub mod scope;
pub mod session;
pub mod time;

pub use error::EngineError;
pub use message::{MessageBundle, MessageProvider};
pub use scope::Scope;
pub use session::normalize_session_id;
pub use time::{format_age, now_epoch};
