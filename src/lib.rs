//! A Rust implementation of the QBFT Byzantine fault tolerant agreement protocol, for committees of
//! operators that jointly run validator duties.
//!
//! A committee of `n = 3f + 1` operators agrees on one value per height, tolerating up to `f`
//! arbitrarily faulty operators. Each duty of each validator is driven by its own
//! [`Controller`](controller::Controller), which runs one [`Instance`](qbft::Instance) per height.
//!
//! ## Pluggables
//!
//! qbft_rs does not do I/O, keep time, or implement cryptography itself. Library users provide:
//! - A [`Network`](networking::Network) to broadcast signed messages to the committee.
//! - A [`Storage`](storage::Storage) to persist decided messages.
//! - A [`ValueCheck`](app::ValueCheck) that decides which values may be agreed on.
//! - A [`SignatureScheme`](types::crypto_primitives::SignatureScheme) that signs, verifies, and
//!   aggregates signatures.
//!
//! They also drive the protocol: they feed every received message into
//! [`process_msg`](controller::Controller::process_msg), and call
//! [`upon_round_timeout`](controller::Controller::upon_round_timeout) when a round takes too long.

pub mod app;

pub mod controller;

pub mod errors;

pub(crate) mod event_bus;

pub mod events;

pub mod logging;

pub mod messages;

pub mod networking;

pub mod qbft;

pub mod router;

pub mod storage;

pub mod types;
