//! Route handlers and the helpers they share.

pub mod access_tokens;
pub mod health;
pub mod principal;
pub mod register;
pub mod types;
pub mod users;
pub mod utils;
