pub mod persistence;
pub mod registry;

pub use persistence::Persistence;
pub use registry::{default_models, demo_data, Collection, Collections, MemRegistry, ModelSpec};
