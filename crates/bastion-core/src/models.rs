//! Domain models for Bastion.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod login_attempt;
pub mod password_history;
pub mod password_reset;
pub mod session;
pub mod tenant;
pub mod user;
