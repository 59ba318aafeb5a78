//! KDL configuration parsing for Rigging.
//!
//! This crate handles parsing of:
//! - Application definitions (rigging.kdl)
//! - Variable interpolation

pub mod application;
pub mod error;
pub mod variables;

pub use application::{load_application, parse_application};
pub use error::{ConfigError, ConfigResult};
pub use variables::{AppContext, GitContext, VariableContext, VariableContextBuilder};
