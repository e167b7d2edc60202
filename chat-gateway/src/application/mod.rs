pub mod commands;
pub mod handlers;

pub use handlers::{Hub, HubLoop};
