//! Repository layer over the shared store.
//!
//! # Responsibility
//! - Give every component a typed, injected view of the store keys.
//! - Keep JSON encoding details inside the persistence boundary.
//!
//! # Invariants
//! - A missing key reads as an empty list (or no session), never an error.
//! - Undecodable payloads are reported, not silently replaced.

pub mod circulation_repo;
