mod registry;
mod selectors;

pub use registry::{ModelKind, ModelRegistry, ModelSpec};
pub use selectors::{ModelSelection, ModelSelector};
