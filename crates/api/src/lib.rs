//! Ledgerlink HTTP surface.
//!
//! Exposes the engine workflows to the identity-aware web layer in front of
//! it: provider webhooks, device-flow authorization, on-demand sync and
//! credit scoring.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
