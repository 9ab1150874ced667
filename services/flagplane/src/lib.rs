//! Flagplane service library crate.
//!
//! # Purpose
//! Exposes the feature-flag API surface, credential resolvers, authorization,
//! evaluation cache, configuration and storage backends for use by the
//! binary and tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod authz;
pub mod cache;
pub mod config;
pub mod model;
pub mod observability;
pub mod service;
pub mod store;
