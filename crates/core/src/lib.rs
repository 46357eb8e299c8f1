//! Marmalade Core - Shared types library.
//!
//! This crate provides common types used across all Marmalade components:
//! - `storefront` - Public-facing storefront service and cart engine
//! - `integration-tests` - End-to-end tests against a stub commerce backend
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and money amounts

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
