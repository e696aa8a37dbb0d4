pub mod config;
pub mod error;
pub mod fingerprint;
pub mod lang;
pub mod text;
pub mod types;

pub use config::Config;
pub use error::{FreightwireError, Result};
pub use types::*;
