// src/voxel/mod.rs
//! Sparse voxel octree visibility and ray traversal (SPEC_FULL.md §§2-4).
//!
//! Submodule layout mirrors the component table in SPEC_FULL.md §2: node storage,
//! tile-level bit math, the occlusion mask built on top of it, the camera contract, the
//! visibility walk, and the independent ray traverser.

pub mod camera;
pub mod mask;
pub mod node;
pub mod ray;
pub mod tile;
pub mod visibility;

pub use camera::{Camera, CameraView};
pub use mask::OcclusionMask;
pub use node::{child_slot, Node, NodeStore, VecNodeStore, Volume, EMPTY_NODE_INDEX};
pub use ray::{ray_parameter, Ray3d, RayVolumeIntersection};
pub use visibility::{Glyph, VisibilityCalculator};
