//! Route groups, split by the access policy applied to them in `create_router`.

/// Threads, comments and their interactions. Behind the soft gate.
pub mod board;

/// Routes that require a logged-in user. Behind hard gates.
pub mod authenticated;

/// Login flow, static pages and health check. No gate.
pub mod public;

/// Development-only maintenance.
pub mod admin;
