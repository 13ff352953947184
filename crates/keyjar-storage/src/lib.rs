//! Concrete storage implementations with encryption at rest.
//! Uses AES-256-GCM with a key persisted in a local key file (or test doubles).

pub mod cipher;
pub mod document;
pub mod encrypted_store;
pub mod key_provider;
