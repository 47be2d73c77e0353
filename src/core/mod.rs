pub mod assembly;
pub mod logical_id;
pub mod lookup;
pub mod patch;
pub mod service;
pub mod synth;
pub mod template;

pub use crate::domain::ports::{ContextProvider, Storage};
pub use crate::utils::error::Result;
