//! Types and traits that are used across multiple components of qbft_rs.
//!
//! Other types and traits, specific to single components, can be found in the "types" submodules of
//! their components, e.g., [`crate::qbft::types`].

pub mod committee;

pub mod crypto_primitives;

pub mod data_types;

pub mod message_id;
