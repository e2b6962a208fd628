pub mod preview_handler;
pub mod rate_limit_handler;
