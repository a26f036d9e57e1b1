// src/voxel/visibility.rs
//! The visibility calculator: a front-to-back octree walk that culls, occludes and
//! emits glyphs (SPEC_FULL.md §4.2).
//!
//! Ported from `findVisibleOctreeNodes`/`processNode`/`buildGlyphFromNode`/
//! `getMaterialForNode`/`computeNodeNormal` in
//! `examples/original_source/src/library/rendering.cpp` (lines ~900-1260). The GPU
//! upload shape of [`Glyph`] is grounded on
//! `examples/gugu8intel-i9-Slop-Engine/src/camera.rs`'s `CameraUniform`
//! (`#[repr(C)]` + `bytemuck::Pod`/`Zeroable`, ready for a vertex/instance buffer).

use glam::{DVec2, DVec3, IVec2};

use crate::config::VisibilityConfig;
use crate::voxel::camera::CameraView;
use crate::voxel::mask::OcclusionMask;
use crate::voxel::node::{NodeStore, Volume};
use crate::voxel::tile::{FrontFaces, PolygonVertexArray};

/// The near-first child-visit permutation XORed with the nearest-child bitmask
/// (SPEC_FULL.md §4.2 step 1). `4` is deliberately visited before `3`.
const BIT_TOGGLES: [u8; 8] = [0, 1, 2, 4, 3, 5, 6, 7];

/// A single visible octree node, ready for GPU upload as an instanced cube.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Glyph {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub size: f32,
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: u32,
}

impl Glyph {
    pub fn normal(&self) -> [f32; 3] {
        [self.a, self.b, self.c]
    }
}

/// Per-frame octree walker. Owns the precomputed cube-corner tables shared by every
/// node at a given height; everything else (camera, volume, mask) is borrowed per call.
pub struct VisibilityCalculator {
    /// `cube_vertices_world[h][c]` — offset of corner `c` of a cube of side `2^h`
    /// centered at the origin, in world space (SPEC_FULL.md §4.2 "Precomputations").
    cube_vertices_world: Vec<[DVec3; 8]>,
}

impl VisibilityCalculator {
    /// Heights `0..32` cover every possible `Volume::height()` (root height `≤ 31`) plus
    /// one extra level of headroom.
    const MAX_HEIGHT: usize = 32;

    pub fn new() -> Self {
        let mut cube_vertices_world = Vec::with_capacity(Self::MAX_HEIGHT);
        for h in 0..Self::MAX_HEIGHT {
            let half = 2f64.powi(h as i32 - 1);
            cube_vertices_world.push(corner_offsets(half));
        }
        Self { cube_vertices_world }
    }

    /// Walk `volume` from its root, culling and occluding against `mask`, writing up to
    /// `config.max_glyphs` glyphs in strict near-to-far order.
    pub fn find_visible_octree_nodes<S: NodeStore, C: CameraView>(
        &self,
        volume: &Volume<S>,
        camera: &C,
        mask: &mut OcclusionMask,
        config: &VisibilityConfig,
    ) -> Vec<Glyph> {
        let view = camera.view_matrix();
        let proj = camera.proj_matrix();
        let cam_world = camera.position();
        let side_normals = camera.side_plane_normals_view();

        // Per-frame view-space counterpart of `cube_vertices_world` (SPEC_FULL.md §4.2
        // "Precomputations per frame").
        let cube_vertices_view: Vec<[DVec3; 8]> = self
            .cube_vertices_world
            .iter()
            .map(|corners| {
                let mut out = [DVec3::ZERO; 8];
                for (dst, src) in out.iter_mut().zip(corners.iter()) {
                    *dst = view.transform_vector3(*src);
                }
                out
            })
            .collect();

        let mut glyphs = Vec::new();

        // A height-0 root is a single voxel with no substructure at all — there is no
        // child loop to drive, so emit it directly. A `0` root is empty space.
        if volume.height() == 0 {
            if volume.root_node_index() != 0 && config.max_glyphs > 0 {
                glyphs.push(Glyph {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    size: volume.side_length() as f32,
                    a: 0.0,
                    b: 0.0,
                    c: 0.0,
                    d: volume.root_node_index(),
                });
            }
            return glyphs;
        }

        // A root that is a material leaf but still has height (a solid node whose
        // children, with `subdivideMaterialNodes=false`, are all of the same drawable
        // material) still walks through `process_node` below: `resolve_child` treats a
        // material-leaf parent as its own child at every slot, so the loop still visits,
        // culls and occludes each child glyph in near-to-far order instead of collapsing
        // the whole root to one oversized glyph (rendering.cpp:909-1013 `processNode`).

        let root_centre_world = DVec3::ZERO;
        let root_centre_view = view.transform_point3(root_centre_world);

        let mut walker = Walker {
            volume,
            camera_proj: &proj,
            side_normals: &side_normals,
            cam_world,
            cube_vertices_world: &self.cube_vertices_world,
            cube_vertices_view: &cube_vertices_view,
            mask,
            config,
            mask_half_width: config.mask_width as f64 / 2.0,
            mask_half_height: config.mask_height as f64 / 2.0,
        };

        walker.process_node(
            volume.root_node_index(),
            root_centre_world,
            root_centre_view,
            volume.height(),
            &mut glyphs,
        );
        glyphs
    }
}

impl Default for VisibilityCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn sign_vector(slot: u8) -> DVec3 {
    let sx = if slot & 1 != 0 { 1.0 } else { -1.0 };
    let sy = if slot & 2 != 0 { 1.0 } else { -1.0 };
    let sz = if slot & 4 != 0 { 1.0 } else { -1.0 };
    DVec3::new(sx, sy, sz)
}

fn corner_offsets(half: f64) -> [DVec3; 8] {
    let mut out = [DVec3::ZERO; 8];
    for c in 0..8u8 {
        out[c as usize] = sign_vector(c) * half;
    }
    out
}

fn nearest_child(cam_world: DVec3, centre_world: DVec3) -> u8 {
    let mut nearest = 0u8;
    if cam_world.x > centre_world.x {
        nearest |= 1;
    }
    if cam_world.y > centre_world.y {
        nearest |= 2;
    }
    if cam_world.z > centre_world.z {
        nearest |= 4;
    }
    nearest
}

/// Scratch state for a single `find_visible_octree_nodes` call. Carrying borrows in a
/// struct instead of threading them through every recursive call keeps `process_node`'s
/// signature close to the reference's.
struct Walker<'a, S: NodeStore> {
    volume: &'a Volume<S>,
    camera_proj: &'a glam::DMat4,
    side_normals: &'a [DVec3; 4],
    cam_world: DVec3,
    cube_vertices_world: &'a [[DVec3; 8]],
    cube_vertices_view: &'a [[DVec3; 8]],
    mask: &'a mut OcclusionMask,
    config: &'a VisibilityConfig,
    mask_half_width: f64,
    mask_half_height: f64,
}

impl<'a, S: NodeStore> Walker<'a, S> {
    fn resolve_child(&self, parent_index: u32, slot: u8) -> u32 {
        if self.volume.is_material_leaf(parent_index) {
            parent_index
        } else {
            self.volume.node(parent_index).child(slot)
        }
    }

    /// Returns `false` once the caller should stop (glyph buffer full).
    fn process_node(
        &mut self,
        parent_index: u32,
        parent_centre_world: DVec3,
        parent_centre_view: DVec3,
        parent_height: u32,
        glyphs: &mut Vec<Glyph>,
    ) -> bool {
        if parent_height == 0 {
            return true;
        }
        let child_height = parent_height - 1;
        let nearest = nearest_child(self.cam_world, parent_centre_world);

        for &toggle in BIT_TOGGLES.iter() {
            let slot = nearest ^ toggle;
            let child_index = self.resolve_child(parent_index, slot);
            if child_index == 0 {
                continue;
            }

            let offset_world = self.cube_vertices_world[child_height as usize][slot as usize];
            let offset_view = self.cube_vertices_view[child_height as usize][slot as usize];
            let child_centre_world = parent_centre_world + offset_world;
            let child_centre_view = parent_centre_view + offset_view;

            let child_size = 2f64.powi(child_height as i32);
            let child_half_diag = child_size * 3f64.sqrt() / 2.0;

            if self
                .side_normals
                .iter()
                .any(|n| child_centre_view.dot(*n) < -child_half_diag)
            {
                continue;
            }

            let corners_view = &self.cube_vertices_view[child_height as usize];
            let vertices = self.project_corners(child_centre_view, corners_view);
            let front_faces = front_face_set(self.cam_world, child_centre_world, child_size / 2.0);

            let is_material_child = self.volume.is_material_leaf(child_index);
            let footprint = child_size / child_centre_view.length().max(f64::EPSILON);
            let drawable =
                child_height == 0 || footprint <= self.config.max_footprint_size || is_material_child;

            let visible = if child_centre_view.z >= -child_half_diag {
                true
            } else {
                self.mask.draw_node(&vertices, &front_faces, drawable)
            };

            if !visible {
                continue;
            }

            if drawable {
                if glyphs.len() >= self.config.max_glyphs {
                    return false;
                }
                let material = self.material_for_node(child_index, child_centre_world);
                if material != 0 {
                    let normal = self.node_normal(parent_index);
                    glyphs.push(Glyph {
                        x: child_centre_world.x as f32,
                        y: child_centre_world.y as f32,
                        z: child_centre_world.z as f32,
                        size: child_size as f32,
                        a: normal.x as f32,
                        b: normal.y as f32,
                        c: normal.z as f32,
                        d: material,
                    });
                    if glyphs.len() >= self.config.max_glyphs {
                        return false;
                    }
                }
            } else if !self.process_node(child_index, child_centre_world, child_centre_view, child_height, glyphs)
            {
                return false;
            }
        }
        true
    }

    fn project_corners(&self, centre_view: DVec3, offsets_view: &[DVec3; 8]) -> PolygonVertexArray {
        let p00 = self.camera_proj.x_axis.x;
        let p11 = self.camera_proj.y_axis.y;
        let mut out: PolygonVertexArray = [IVec2::ZERO; 8];
        for (i, offset) in offsets_view.iter().enumerate() {
            let corner = centre_view + *offset;
            let depth = (-corner.z).max(1e-9);
            let ndc = DVec2::new(corner.x * p00 / depth, corner.y * p11 / depth);
            let x = round_half_away_from_zero(ndc.x * self.mask_half_width + self.mask_half_width);
            let y = round_half_away_from_zero(ndc.y * self.mask_half_height + self.mask_half_height);
            out[i] = IVec2::new(x as i32, y as i32);
        }
        out
    }

    fn material_for_node(&self, index: u32, centre_world: DVec3) -> u32 {
        if self.volume.is_material_leaf(index) {
            return index;
        }
        let nearest = nearest_child(self.cam_world, centre_world);
        let mut node = index;
        loop {
            if self.volume.is_material_leaf(node) {
                return node;
            }
            let n = self.volume.node(node);
            let mut next = None;
            for &toggle in BIT_TOGGLES.iter() {
                let slot = nearest ^ toggle;
                let child = n.child(slot);
                if child != 0 {
                    next = Some(child);
                    break;
                }
            }
            match next {
                Some(child) => node = child,
                None => return 0,
            }
        }
    }

    fn node_normal(&self, parent_index: u32) -> DVec3 {
        let mut sum = DVec3::ZERO;
        for slot in 0..8u8 {
            if self.resolve_child(parent_index, slot) == 0 {
                sum += sign_vector(slot);
            }
        }
        sum.normalize_or_zero()
    }
}

fn front_face_set(cam_world: DVec3, centre_world: DVec3, half_size: f64) -> FrontFaces {
    [
        cam_world.x < centre_world.x - half_size, // min x
        cam_world.x > centre_world.x + half_size, // max x
        cam_world.y < centre_world.y - half_size, // min y
        cam_world.y > centre_world.y + half_size, // max y
        cam_world.z < centre_world.z - half_size, // min z
        cam_world.z > centre_world.z + half_size, // max z
    ]
}

#[inline]
fn round_half_away_from_zero(v: f64) -> f64 {
    v.round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::camera::Camera;
    use crate::voxel::node::{Node, VecNodeStore};

    fn empty_volume() -> Volume<VecNodeStore> {
        let store = VecNodeStore::new(vec![], 1);
        Volume::new(store, 0, 8).unwrap()
    }

    fn single_voxel_volume(material: u32) -> Volume<VecNodeStore> {
        // Leaf threshold 256 so indices 0..256 are all material ids; root is height 0
        // so the root itself is directly a leaf of `material`.
        let store = VecNodeStore::new(vec![Node([0; 8])], 256);
        Volume::new(store, material, 1).unwrap()
    }

    #[test]
    fn empty_volume_emits_no_glyphs() {
        let volume = empty_volume();
        let camera = Camera::new(DVec3::new(0.0, 0.0, 10.0), -std::f64::consts::FRAC_PI_2, 0.0, 1.0);
        let calc = VisibilityCalculator::new();
        let mut mask = OcclusionMask::new(64, 64);
        let config = VisibilityConfig::default();
        let glyphs = calc.find_visible_octree_nodes(&volume, &camera, &mut mask, &config);
        assert!(glyphs.is_empty());
    }

    #[test]
    fn single_solid_voxel_emits_one_glyph() {
        let volume = single_voxel_volume(7);
        let camera = Camera::new(DVec3::new(0.0, 0.0, 10.0), std::f64::consts::PI, 0.0, 1.0);
        let calc = VisibilityCalculator::new();
        let mut mask = OcclusionMask::new(256, 256);
        let config = VisibilityConfig {
            max_footprint_size: 10.0,
            ..VisibilityConfig::default()
        };
        let glyphs = calc.find_visible_octree_nodes(&volume, &camera, &mut mask, &config);
        assert_eq!(glyphs.len(), 1);
        assert_eq!(glyphs[0].d, 7);
        assert!((glyphs[0].size - 1.0).abs() < 1e-6);
    }

    #[test]
    fn material_leaf_root_with_height_descends_into_child_glyphs() {
        // Root index 9 is itself a material leaf (well under the 256 threshold), but the
        // volume still declares height 2 (side length 4). Since `subdivideMaterialNodes`
        // is never set, each of the root's 8 conceptual children is the same drawable
        // material — the walk must still visit them individually through `process_node`
        // rather than collapsing the whole root into one oversized glyph.
        let store = VecNodeStore::new(vec![], 256);
        let volume = Volume::new(store, 9, 4).unwrap();
        let camera = Camera::new(DVec3::new(0.0, 0.0, 100.0), std::f64::consts::PI, 0.0, 1.0);
        let calc = VisibilityCalculator::new();
        let mut mask = OcclusionMask::new(256, 256);
        let config = VisibilityConfig::default();
        let glyphs = calc.find_visible_octree_nodes(&volume, &camera, &mut mask, &config);

        assert!(glyphs.len() > 1, "a material-leaf root with height > 0 must emit per-child glyphs");
        assert!(glyphs.iter().all(|g| g.d == 9));
        assert!(glyphs.iter().all(|g| (g.size - 2.0).abs() < 1e-6));
        let distinct_positions = glyphs
            .iter()
            .map(|g| (g.x.to_bits(), g.y.to_bits(), g.z.to_bits()))
            .collect::<std::collections::HashSet<_>>();
        assert!(distinct_positions.len() > 1, "children must sit at distinct world positions");
    }

    #[test]
    fn glyph_count_never_exceeds_budget() {
        let volume = single_voxel_volume(3);
        let camera = Camera::new(DVec3::new(0.0, 0.0, 10.0), std::f64::consts::PI, 0.0, 1.0);
        let calc = VisibilityCalculator::new();
        let mut mask = OcclusionMask::new(256, 256);
        let config = VisibilityConfig {
            max_glyphs: 0,
            ..VisibilityConfig::default()
        };
        let glyphs = calc.find_visible_octree_nodes(&volume, &camera, &mut mask, &config);
        assert!(glyphs.len() <= config.max_glyphs);
    }
}
