//! Platform Crate - Technical Infrastructure
//!
//! Technical foundations shared by the pipeline and the API binary:
//! - Cryptographic utilities (random bytes, Base64, hex)
//! - Password hashing (Argon2id) for admin credentials
//! - Client identification from request headers
//! - Cookie extraction
//! - Rate limiting abstractions and the named limiter quotas

pub mod client;
pub mod cookie;
pub mod crypto;
pub mod password;
pub mod rate_limit;
