pub mod connection;
pub mod http;

pub use connection::{ConnectionSettings, run_connection};
pub use http::{AppState, router};
