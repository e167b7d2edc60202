pub mod auth;
pub mod cache;
pub mod messaging;
pub mod object_store;
pub mod persistence;
