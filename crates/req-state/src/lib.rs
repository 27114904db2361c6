//! Branch-scoped requirement state (C2) and the cross-session registry (C3).

pub mod branch;
pub mod registry;

pub use branch::{BranchRequirements, BranchState, RequirementState, SessionRecord};
pub use registry::{RegisteredSession, cleanup_stale_sessions, get_active_sessions};
