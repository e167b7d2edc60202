pub mod persistence;
pub mod retry;
