//! Caller-facing service access.

pub mod proxy;
