pub mod context;
pub mod dispatcher;
pub mod log_retention;
pub mod resource;
pub mod transmitter;
