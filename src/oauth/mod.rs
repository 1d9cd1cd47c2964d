//! OAuth token acquisition: grants, internal JWT assertions and the
//! process-wide service token cache

pub mod client;
pub mod jwt;
pub mod manager;

pub use client::{Token, TokenClient};
pub use jwt::generate_jwt;
pub use manager::{TokenManager, TokenProvider};
