//! Trusted provider discovery
//!
//! Discovery documents are signed JSON lists of VPN providers and federated
//! organizations published by a central authority. This module fetches
//! them, verifies their detached Ed25519 signatures, protects against
//! sequence-number rollback, persists the verified bytes verbatim, and
//! answers provider/organization lookups from the persisted state.
//!
//! # Module Layout
//!
//! - [`document`]  -- parsed document model (instances, organizations,
//!   localized display names)
//! - [`signature`] -- detached Ed25519 verification, fail-closed
//! - [`store`]     -- per-source last-known-good persistence with atomic
//!   replace
//! - [`fetcher`]   -- fetch → verify → parse → anti-rollback → persist
//! - [`directory`] -- total base-URI lookups and locale-aware sorted lists

pub mod directory;
pub mod document;
pub mod fetcher;
pub mod signature;
pub mod store;
