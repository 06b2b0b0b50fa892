//! API module for the Coinwatch HTTP server

pub mod routes;
pub mod server;

pub use routes::AppState;
pub use server::{ApiServer, ApiServerConfig};
