pub mod config;
pub mod server;

pub use server::{build_router, AppState};
