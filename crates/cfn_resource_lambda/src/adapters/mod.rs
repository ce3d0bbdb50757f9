pub mod callback;
pub mod log_store;
