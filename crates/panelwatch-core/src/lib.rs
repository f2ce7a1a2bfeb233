pub mod capture;
pub mod config;
pub mod engine;
pub mod errors;
pub mod interpret;
pub mod model;
pub mod prompts;
pub mod providers;
pub mod query;
pub mod storage;

pub use engine::RunCoordinator;
pub use errors::{ConfigError, PipelineError};
pub use query::QueryInterpreter;
pub use storage::Store;
