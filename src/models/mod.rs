//! Core data models for the resize proxy.
//!
//! Transform options and their canonical encoding, cache keys derived from
//! them, request decomposition, and the object shapes exchanged with stores.

pub mod cache_key;
pub mod object;
pub mod options;
pub mod request;
