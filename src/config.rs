// src/config.rs
//! Tunable configuration for the visibility core.
//!
//! Mirrors how the rest of this codebase shapes a config struct: a plain data type with
//! a `Default` impl carrying the reference's hard-coded constants, plus optional JSON
//! (de)serialization for host applications that want to persist or hot-edit the tunables.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default visibility-mask resolution used by the reference implementation.
pub const DEFAULT_MASK_SIZE: u32 = 1024;

/// Default footprint threshold below which a node is drawn rather than subdivided.
pub const DEFAULT_MAX_FOOTPRINT_SIZE: f64 = 0.3;

/// Default glyph budget for a single `find_visible_octree_nodes` call.
pub const DEFAULT_MAX_GLYPHS: usize = 1 << 16;

/// Tunables for the [`crate::voxel::visibility::VisibilityCalculator`] and its
/// [`crate::voxel::mask::OcclusionMask`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Width of the occlusion mask in pixels. Must be a multiple of 8 (see
    /// SPEC_FULL.md §4.1 "Failure semantics"); a non-multiple is accepted but logged.
    pub mask_width: u32,
    /// Height of the occlusion mask in pixels. Must be a multiple of 8.
    pub mask_height: u32,
    /// Screen-space footprint at or below which a node is drawn instead of subdivided.
    pub max_footprint_size: f64,
    /// Maximum number of glyphs a single visibility pass may emit.
    pub max_glyphs: usize,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            mask_width: DEFAULT_MASK_SIZE,
            mask_height: DEFAULT_MASK_SIZE,
            max_footprint_size: DEFAULT_MAX_FOOTPRINT_SIZE,
            max_glyphs: DEFAULT_MAX_GLYPHS,
        }
    }
}

impl VisibilityConfig {
    /// Parse a config from a JSON string, falling back to [`Default::default`] fields
    /// that the caller omitted (via `serde`'s field defaults would require per-field
    /// `#[serde(default)]`; here we simply require a complete document).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serialize this config to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
