//! Value Object Module

pub mod account_state;
pub mod csp;
pub mod route;
