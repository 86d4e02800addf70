//! Homeplate Core - Shared identity and role types.
//!
//! This crate provides the types shared by every Homeplate component:
//! - `access` - Role resolution and route gating
//! - `cli` - Operator tooling for inspecting access decisions
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no caches.
//! Loosely typed backend records are parsed into these types at the edge of
//! the access layer and never travel further as raw strings.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, emails, identities, roles and application states

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
