//! Shared Kernel - vocabulary every crate agrees on
//!
//! - Unified error type ([`error::app_error::AppError`]) and its HTTP mapping
//! - Typed identifiers for the entities the request pipeline touches
//!
//! Only things that are hard to change and mean the same thing in every
//! crate belong here.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
