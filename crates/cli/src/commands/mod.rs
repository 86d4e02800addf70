//! `hp-access` subcommands.

pub mod check;
pub mod routes;
