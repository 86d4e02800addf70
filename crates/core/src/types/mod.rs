//! Core types for Homeplate.
//!
//! This module provides type-safe wrappers for identity and access concepts.

pub mod application;
pub mod email;
pub mod id;
pub mod identity;
pub mod role;

pub use application::{ApplicationState, ApplicationStateError};
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::Identity;
pub use role::{Role, RoleError};
