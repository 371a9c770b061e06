//! dBFT consensus state machine.
//!
//! The engine drives an ordered set of validators to agree on the next block
//! at each height. It is a PBFT descendant: a view's Primary proposes, the
//! Backups endorse, and a quorum of `M = 2f + 1` out of `N = 3f + 1`
//! validators commits. Faulty views are abandoned through coordinated view
//! changes; lagging nodes catch up through compact recovery bundles.
//!
//! # Architecture
//!
//! The engine is a synchronous, deterministic state machine with four
//! entrypoints:
//!
//! - [`Dbft::start`] — begin consensus at the next height
//! - [`Dbft::on_receive`] — a consensus payload arrived
//! - [`Dbft::on_transaction`] — a transaction arrived from the network
//! - [`Dbft::on_timeout`] — the view timer fired
//!
//! All I/O happens through the [`Host`] trait: fetching validators and
//! transactions, verifying and persisting blocks, broadcasting payloads.
//! The engine never blocks; host callbacks are expected to buffer.
//!
//! Entrypoints take `&mut self`. Callers that drive the engine from more
//! than one thread put it behind a mutex, which serializes every state
//! transition.
//!
//! # Determinism
//!
//! Given the same initial state and the same sequence of entrypoint calls
//! (with a deterministic [`Timer`]), the engine produces the same sequence
//! of broadcasts. Timestamps and nonces derive from the injected timer, not
//! from ambient clocks or RNGs.

mod cache;
mod check;
mod config;
mod context;
mod dbft;
mod host;
mod send;
mod timer;

pub use config::{Config, ConfigError};
pub use context::Context;
pub use dbft::Dbft;
pub use host::{resolve_key_pair, Host, VerifyError};
pub use timer::{HeightView, ManualTimer, ThreadTimer, Timer};
