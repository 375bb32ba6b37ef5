pub mod env;
mod loader;

pub use env::{
    AppConfig, BackendConfig, BackendKind, DirectoryConfig, IoTarget, LoggingConfig, PipelineConfig,
    SimulatedConfig,
};
pub use loader::load_config;
