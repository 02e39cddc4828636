//! Media Lounge
//!
//! Media sharing and chat service. Users, messages, comments and likes are
//! JSON records kept in a flat object store; conversations are derived from
//! messages on read; signup goes through short-lived emailed codes.

pub mod api;
pub mod auth;
pub mod collections;
pub mod config;
pub mod context;
pub mod conversations;
pub mod error;
pub mod jobs;
pub mod mailer;
pub mod media;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod server;
pub mod store;
pub mod verification;
