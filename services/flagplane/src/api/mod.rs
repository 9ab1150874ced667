//! Flagplane HTTP API module.
//!
//! # Purpose
//! Route handlers, payload types, error mapping and the OpenAPI document.
//! Handlers resolve credentials, call one service operation and map its
//! result; they hold no business rules of their own.
pub mod auth;
pub mod error;
pub mod flags;
pub mod members;
pub mod openapi;
pub mod projects;
pub mod scopes;
pub mod sdk;
pub mod system;
pub mod types;
pub mod users;
