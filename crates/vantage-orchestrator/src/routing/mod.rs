//! Model routing: capability registry and selection service.

pub mod registry;
pub mod selector;

pub use registry::{CapabilityRegistry, ModelCapability};
pub use selector::{
    Complexity, ModelRecommendation, ModelSelector, SelectionCriteria, SelectionError,
    SelectionPriority, SelectionTaskType,
};
