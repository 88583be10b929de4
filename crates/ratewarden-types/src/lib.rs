//! Shared types, store adapter trait, and core rules for the ratewarden rate limiter.
//!
//! This crate contains the foundational types that are shared between the
//! decision engine and all store adapter implementations. Keeping them in a
//! separate crate lets the adapters compile without pulling in the engine.

pub mod error;
pub mod policy;
pub mod prelude;
pub mod store_adapter;
pub mod types;

// vim: ts=4
