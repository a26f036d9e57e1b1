// src/lib.rs
//! Visibility calculation and ray traversal over a sparse voxel octree.
//!
//! The crate has two independent entry points, both described in full in
//! `SPEC_FULL.md`:
//!
//! - [`voxel::VisibilityCalculator::find_visible_octree_nodes`] walks a [`voxel::Volume`]
//!   front-to-back from a [`voxel::CameraView`], culling against a
//!   [`voxel::OcclusionMask`] and emitting [`voxel::Glyph`]s.
//! - [`voxel::ray_parameter`] traces a single [`voxel::Ray3d`] through a
//!   [`voxel::Volume`] and returns the first-hit [`voxel::RayVolumeIntersection`].
//!
//! Both operate purely against the [`voxel::NodeStore`] trait — there is no I/O, no
//! threading and no GPU resource of any kind in this crate; a host application owns the
//! volume's storage, the camera, and whatever it does with the resulting glyphs or hits.

pub mod config;
pub mod error;
pub mod voxel;

pub use config::VisibilityConfig;
pub use error::{Error, Result};
pub use voxel::{
    child_slot, ray_parameter, Camera, CameraView, Glyph, Node, NodeStore, OcclusionMask, Ray3d,
    RayVolumeIntersection, VecNodeStore, VisibilityCalculator, Volume, EMPTY_NODE_INDEX,
};
