//! Tapedeck - record and replay HTTP interactions from named tapes
//!
//! A [`Session`] inserts a named [`Tape`], an [`Interceptor`] serves each
//! request from it or from the live server depending on the tape's
//! [`TapeMode`], and ejecting the tape persists what was recorded.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hosts;
pub mod intercept;
pub mod interaction;
pub mod loader;
pub mod message;
pub mod mode;
pub mod naming;
pub mod rule;
pub mod session;
pub mod storage;
pub mod tape;

pub use config::Config;
pub use error::{Result, TapedeckError};
pub use intercept::{Dispatched, HttpUpstream, Interceptor, Outcome, Upstream};
pub use interaction::Interaction;
pub use loader::{FileTapeLoader, MemoryTapeLoader, TapeLoader};
pub use message::{Request, Response};
pub use mode::TapeMode;
pub use rule::{ComposedMatchRule, MatchRule};
pub use session::{InsertOptions, Session};
pub use tape::{Tape, TapeHandle};
