// Public modules
pub mod construct;
pub mod dedup;
pub mod defaults;
pub mod error;
pub mod language;
pub mod lexer;
pub mod refactor;
pub mod search;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
