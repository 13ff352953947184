//! Core abstractions for keyjar: the stored record model, the encrypted record
//! store contract, and the caller-level key manager built on top of it.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod manager;
pub mod records;
pub mod storage;
