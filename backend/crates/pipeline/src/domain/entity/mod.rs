//! Entity Module

pub mod access_log;
pub mod admin_account;
pub mod external_log;
pub mod principal;
