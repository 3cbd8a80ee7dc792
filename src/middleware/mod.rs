pub mod auth;
pub mod rate_limit;
pub mod request_logger;
pub mod validate;
