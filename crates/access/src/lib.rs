//! Homeplate access layer.
//!
//! Decides, for every navigation, whether the signed-in user may see a view
//! and where to send them otherwise. Three pieces, each owning one concern:
//!
//! - [`session::SessionStore`] - who is signed in
//! - [`resolver::RoleResolver`] - what role they hold and whether their
//!   application is approved
//! - [`gate::decide`] - what a route's [`gate::AccessPolicy`] means for them
//!
//! [`context::AccessContext`] wires the three together with a
//! [`routes::RouteTable`]; [`catalog::marketplace_routes`] is the
//! marketplace's route set.
//!
//! Lookups fail closed: a role that cannot be read is never guessed, and an
//! application that cannot be read counts as pending.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod resolver;
pub mod routes;
pub mod session;

pub use context::{AccessContext, ResolvedAccess};
pub use error::{AccessError, Result};
pub use gate::{AccessPolicy, Decision, Denial, decide};
pub use resolver::{AccessSnapshot, Resolution, ResolveFailure, RoleResolver};
pub use routes::{RouteError, RouteTable};
pub use session::{AuthEvent, SessionStore};
