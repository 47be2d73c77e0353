pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::cli::LocalStorage;
pub use config::context::{CachingContextProvider, ContextFile};
pub use config::StackConfig;

#[cfg(feature = "cli")]
pub use config::CliConfig;

#[cfg(feature = "aws")]
pub use config::aws::{AwsContextProvider, S3Storage};

pub use core::{
    assembly::CloudAssembly,
    synth::{SynthEngine, SynthReport},
};
pub use utils::error::{Result, SynthError};
