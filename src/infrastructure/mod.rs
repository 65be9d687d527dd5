//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `auth`: principal verification at the connection boundary (JWT)
//! - `config`: application configuration and settings
//! - `error`: unified error types

pub mod auth;
pub mod config;
pub mod error;
