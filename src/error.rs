// src/error.rs
//! Error handling for the crate.
//!
//! The octree/visibility core itself is best-effort and does not return errors on its
//! hot paths (see SPEC_FULL.md §7) — a culled node, an empty volume, or a ray miss are
//! all represented in-band (zero glyphs, `material == 0`), not as an `Err`. The one place
//! this crate validates a precondition is `Volume::new`, since a malformed volume would
//! otherwise silently corrupt every later traversal.

use std::fmt;
use thiserror::Error;

/// Crate error type — lightweight, `Send + Sync + 'static`.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// `Volume::side_length` was not a power of two, or its height exceeded 31.
    #[error("invalid volume side length {side_length}: {reason}")]
    InvalidVolume { side_length: u32, reason: &'static str },

    /// JSON (de)serialization of a `VisibilityConfig`.
    #[error("config error: {0}")]
    Config(String),

    /// Simple custom message (allocation only when error happens).
    #[error("{0}")]
    Custom(String),

    /// Rich context chaining (like anyhow but zero-cost when you control the types).
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a custom error message (zero-cost when possible).
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    /// Create a formatted custom error (like `format!` but returns `Error`).
    #[inline]
    pub fn format(args: fmt::Arguments) -> Self {
        Self::Custom(fmt::format(args))
    }

    /// Add context to any error (chainable, like `.context()` in anyhow).
    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Quick static message (no allocation if you pass `&'static str`).
    #[inline]
    pub fn msg(msg: &'static str) -> Self {
        Self::Custom(msg.into())
    }

    // === Kind checks (branch prediction friendly) ===
    #[inline]
    pub fn is_invalid_volume(&self) -> bool {
        matches!(self, Error::InvalidVolume { .. })
    }

    #[inline]
    pub fn is_custom(&self) -> bool {
        matches!(self, Error::Custom(_))
    }
}

/// Convenient `Result` alias — use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;
