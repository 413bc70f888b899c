//! Configuration and dependency initialization.

mod dependencies;
pub mod settings;

pub use dependencies::Dependencies;
pub use settings::{ConnectionMode, Settings};
