//! Policy reading (C14) and engine-internal configuration (C17).

pub mod document;
pub mod engine_config;

pub use document::{
    BlockingView, DynamicView, GuardType, GuardView, PolicyDocument, ReqType, RequirementConfig, TriggerSpec,
};
pub use engine_config::{EngineConfig, EngineConfigLayer};
