//! Realtime notification channel for recruiter workspaces.
//!
//! Layers, leaf to root: `transport` (one WebSocket connection) →
//! `channel` (typed events) → `initializer` (tenant lifecycle) →
//! `store` (client-side source of truth) → `views` (projections and
//! optimistic actions). `api` is the REST boundary used for backlog pages
//! and best-effort server sync.

pub mod api;
pub mod channel;
pub mod cli;
pub mod config;
pub mod errors;
pub mod initializer;
pub mod models;
pub mod store;
pub mod transport;
pub mod views;
