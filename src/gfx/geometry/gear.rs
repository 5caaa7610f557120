//! Gear wheel generation.
//!
//! All sections are emitted as vertex pairs and indexed as triangle lists, so
//! neither strip topology nor primitive restart is needed at draw time.

use std::f32::consts::PI;

use super::{GearGeometry, GearSpec, SurfaceGroup};

const FRONT: [f32; 3] = [0.0, 0.0, 1.0];
const BACK: [f32; 3] = [0.0, 0.0, -1.0];

/// Indexes `vertex_count` vertices starting at `first` as a quad strip.
///
/// Vertices come in pairs; each pair after the first closes a quad with the
/// previous pair, emitted as `(k-2, k-1, k)` and `(k, k-1, k+1)`.
pub fn quad_strip_indices(first: u16, vertex_count: u16, out: &mut Vec<u16>) {
    let first = u32::from(first);
    let end = first + u32::from(vertex_count);

    let mut k = first + 2;
    while k < end {
        out.extend(
            [k - 2, k - 1, k, k, k - 1, k + 1]
                .into_iter()
                .map(|index| index as u16),
        );
        k += 2;
    }
}

/// Indexes four vertices given in polygon order as two triangles.
fn quad_indices(first: u16, out: &mut Vec<u16>) {
    out.extend_from_slice(&[first, first + 1, first + 2, first, first + 2, first + 3]);
}

/// Generates both surface groups of a gear.
///
/// Storage is sized from the closed-form counts of [`GearSpec`] and never
/// grows during generation.
pub fn generate_gear(spec: &GearSpec) -> GearGeometry {
    let profile = Profile::new(spec);

    let mut flat = SurfaceGroup::with_capacity(spec.flat_vertex_count(), spec.flat_index_count());
    profile.front_face(&mut flat);
    profile.front_teeth(&mut flat);
    profile.back_face(&mut flat);
    profile.back_teeth(&mut flat);
    profile.outward_faces(&mut flat);

    let mut smooth =
        SurfaceGroup::with_capacity(spec.smooth_vertex_count(), spec.smooth_index_count());
    profile.inner_bore(&mut smooth);

    debug_assert_eq!(flat.vertices.len(), spec.flat_vertex_count());
    debug_assert_eq!(flat.indices.len(), spec.flat_index_count());
    debug_assert_eq!(smooth.vertices.len(), spec.smooth_vertex_count());
    debug_assert_eq!(smooth.indices.len(), spec.smooth_index_count());

    GearGeometry { flat, smooth }
}

/// Radii and angular step derived from a spec.
struct Profile {
    /// Bore radius.
    r0: f32,
    /// Root of the teeth.
    r1: f32,
    /// Tip of the teeth.
    r2: f32,
    /// Quarter of the angle covered by one tooth.
    da: f32,
    teeth: u32,
    half_width: f32,
}

impl Profile {
    fn new(spec: &GearSpec) -> Self {
        Self {
            r0: spec.inner_radius(),
            r1: spec.outer_radius() - spec.tooth_depth() / 2.0,
            r2: spec.outer_radius() + spec.tooth_depth() / 2.0,
            da: 2.0 * PI / spec.teeth() as f32 / 4.0,
            teeth: spec.teeth(),
            half_width: spec.width() * 0.5,
        }
    }

    fn angle(&self, tooth: u32) -> f32 {
        tooth as f32 * 2.0 * PI / self.teeth as f32
    }

    fn front_face(&self, group: &mut SurfaceGroup) {
        let z = self.half_width;
        let first = group.next_index();

        for i in 0..=self.teeth {
            let angle = self.angle(i);
            group.push(polar(self.r0, angle, z), FRONT);
            group.push(polar(self.r1, angle, z), FRONT);
            if i < self.teeth {
                group.push(polar(self.r0, angle, z), FRONT);
                group.push(polar(self.r1, angle + 3.0 * self.da, z), FRONT);
            }
        }

        let count = group.next_index() - first;
        quad_strip_indices(first, count, &mut group.indices);
    }

    fn front_teeth(&self, group: &mut SurfaceGroup) {
        let z = self.half_width;

        for i in 0..self.teeth {
            let angle = self.angle(i);
            let first = group.next_index();
            group.push(polar(self.r1, angle, z), FRONT);
            group.push(polar(self.r2, angle + self.da, z), FRONT);
            group.push(polar(self.r2, angle + 2.0 * self.da, z), FRONT);
            group.push(polar(self.r1, angle + 3.0 * self.da, z), FRONT);
            quad_indices(first, &mut group.indices);
        }
    }

    fn back_face(&self, group: &mut SurfaceGroup) {
        let z = -self.half_width;
        let first = group.next_index();

        for i in 0..=self.teeth {
            let angle = self.angle(i);
            group.push(polar(self.r1, angle, z), BACK);
            group.push(polar(self.r0, angle, z), BACK);
            if i < self.teeth {
                group.push(polar(self.r1, angle + 3.0 * self.da, z), BACK);
                group.push(polar(self.r0, angle, z), BACK);
            }
        }

        let count = group.next_index() - first;
        quad_strip_indices(first, count, &mut group.indices);
    }

    fn back_teeth(&self, group: &mut SurfaceGroup) {
        let z = -self.half_width;

        for i in 0..self.teeth {
            let angle = self.angle(i);
            let first = group.next_index();
            group.push(polar(self.r1, angle + 3.0 * self.da, z), BACK);
            group.push(polar(self.r2, angle + 2.0 * self.da, z), BACK);
            group.push(polar(self.r2, angle + self.da, z), BACK);
            group.push(polar(self.r1, angle, z), BACK);
            quad_indices(first, &mut group.indices);
        }
    }

    /// Side walls and top lands of the teeth plus the bottom lands between
    /// them, as one strip of front/back pairs closed at angle zero.
    fn outward_faces(&self, group: &mut SurfaceGroup) {
        let first = group.next_index();
        let mut radial = [1.0, 0.0, 0.0];

        for i in 0..self.teeth {
            let angle = self.angle(i);
            let root = angle;
            let tip_start = angle + self.da;
            let tip_end = angle + 2.0 * self.da;
            let next_root = angle + 3.0 * self.da;

            let rising = chord_normal(polar(self.r1, root, 0.0), polar(self.r2, tip_start, 0.0));
            let falling =
                chord_normal(polar(self.r2, tip_end, 0.0), polar(self.r1, next_root, 0.0));
            radial = [angle.cos(), angle.sin(), 0.0];

            self.wall_pair(group, self.r1, root, rising);
            self.wall_pair(group, self.r2, tip_start, radial);
            self.wall_pair(group, self.r2, tip_end, falling);
            self.wall_pair(group, self.r1, next_root, radial);
        }
        // seam: back to the first tooth's root
        self.wall_pair(group, self.r1, 0.0, radial);

        let count = group.next_index() - first;
        quad_strip_indices(first, count, &mut group.indices);
    }

    fn wall_pair(&self, group: &mut SurfaceGroup, radius: f32, angle: f32, normal: [f32; 3]) {
        group.push(polar(radius, angle, self.half_width), normal);
        group.push(polar(radius, angle, -self.half_width), normal);
    }

    fn inner_bore(&self, group: &mut SurfaceGroup) {
        let first = group.next_index();

        for i in 0..=self.teeth {
            let angle = self.angle(i);
            let inward = [-angle.cos(), -angle.sin(), 0.0];
            group.push(polar(self.r0, angle, -self.half_width), inward);
            group.push(polar(self.r0, angle, self.half_width), inward);
        }

        let count = group.next_index() - first;
        quad_strip_indices(first, count, &mut group.indices);
    }
}

fn polar(radius: f32, angle: f32, z: f32) -> [f32; 3] {
    [radius * angle.cos(), radius * angle.sin(), z]
}

/// Unit perpendicular `(Δy, −Δx)` of the chord `from → to` in the XY plane.
fn chord_normal(from: [f32; 3], to: [f32; 3]) -> [f32; 3] {
    let u = to[0] - from[0];
    let v = to[1] - from[1];
    let len = (u * u + v * v).sqrt();
    [v / len, -u / len, 0.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::{error::GearsError, gfx::geometry::MAX_TEETH};

    fn demo_specs() -> [GearSpec; 3] {
        [
            GearSpec::new(1.0, 4.0, 1.0, 20, 0.7).unwrap(),
            GearSpec::new(0.5, 2.0, 2.0, 10, 0.7).unwrap(),
            GearSpec::new(1.3, 2.0, 0.5, 10, 0.7).unwrap(),
        ]
    }

    fn assert_group_invariants(group: &SurfaceGroup) {
        assert_eq!(group.vertices.len(), group.normals.len());
        assert_eq!(group.indices.len() % 6, 0);
        let count = group.vertex_count();
        assert!(group.indices.iter().all(|&i| (i as usize) < count));
    }

    #[test]
    fn test_quad_strip_single_quad() {
        let mut indices = Vec::new();
        quad_strip_indices(0, 4, &mut indices);
        assert_eq!(indices, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_quad_strip_offset_and_length() {
        let mut indices = Vec::new();
        quad_strip_indices(10, 6, &mut indices);
        assert_eq!(indices, vec![10, 11, 12, 12, 11, 13, 12, 13, 14, 14, 13, 15]);

        // a single pair closes no quad
        indices.clear();
        quad_strip_indices(0, 2, &mut indices);
        assert!(indices.is_empty());
    }

    #[test]
    fn test_demo_gear_counts() {
        for spec in demo_specs() {
            let gear = generate_gear(&spec);
            let t = spec.teeth() as usize;

            assert_eq!(gear.flat.vertex_count(), 24 * t + 6);
            assert_eq!(gear.flat.indices.len(), 60 * t);
            assert_eq!(gear.smooth.vertex_count(), (t + 1) * 2);
            assert_eq!(gear.smooth.indices.len(), t * 6);

            assert_group_invariants(&gear.flat);
            assert_group_invariants(&gear.smooth);
        }
    }

    #[test]
    fn test_generation_is_bit_identical() {
        let spec = demo_specs()[0];
        let bits = |g: &GearGeometry| -> Vec<u32> {
            [&g.flat, &g.smooth]
                .iter()
                .flat_map(|s| s.vertices.iter().chain(s.normals.iter()))
                .flatten()
                .map(|f| f.to_bits())
                .collect()
        };

        let a = generate_gear(&spec);
        let b = generate_gear(&spec);
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(a.flat.indices, b.flat.indices);
        assert_eq!(a.smooth.indices, b.smooth.indices);
    }

    #[test]
    fn test_front_face_starts_at_bore() {
        let spec = GearSpec::new(1.0, 4.0, 1.0, 20, 0.7).unwrap();
        let gear = generate_gear(&spec);

        assert_eq!(gear.flat.vertices[0], [1.0, 0.0, 0.5]);
        let root = gear.flat.vertices[1];
        assert!((root[0] - 3.65).abs() < 1e-6);
        assert_eq!(&root[1..], &[0.0, 0.5]);
        let front_len = 4 * 20 + 2;
        assert!(gear.flat.normals[..front_len].iter().all(|n| *n == FRONT));
    }

    #[test]
    fn test_normals_are_unit_length() {
        for spec in demo_specs() {
            let gear = generate_gear(&spec);
            for n in gear.flat.normals.iter().chain(gear.smooth.normals.iter()) {
                let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
                assert!((len - 1.0).abs() < 1e-5, "normal {n:?}");
            }
        }
    }

    #[test]
    fn test_bore_pairs_span_full_width() {
        let spec = GearSpec::new(0.5, 2.0, 2.0, 10, 0.7).unwrap();
        let gear = generate_gear(&spec);

        for pair in gear.smooth.vertices.chunks(2) {
            assert_eq!(pair[0][2], -1.0);
            assert_eq!(pair[1][2], 1.0);
            assert_eq!(pair[0][0], pair[1][0]);
            assert_eq!(pair[0][1], pair[1][1]);
        }
        // normals point at the axis
        let n = gear.smooth.normals[0];
        assert_eq!(n, [-1.0, -0.0, 0.0]);
    }

    #[test]
    fn test_rising_flank_faces_outward() {
        let spec = GearSpec::new(1.0, 4.0, 1.0, 20, 0.7).unwrap();
        let gear = generate_gear(&spec);

        // first outward pair sits after front, front teeth, back, back teeth
        let t = 20;
        let start = 2 * (4 * t + 2) + 2 * (4 * t);
        let n = gear.flat.normals[start];
        assert!(n[0] > 0.0 && n[1] < 0.0, "{n:?}");
        assert_eq!(gear.flat.normals[start + 2], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tooth_count_above_index_range_is_rejected() {
        let err = GearSpec::new(1.0, 4.0, 1.0, 3000, 0.7).unwrap_err();
        assert!(matches!(err, GearsError::InvalidGearSpec(_)));
        assert!(GearSpec::new(1.0, 4.0, 1.0, MAX_TEETH + 1, 0.7).is_err());
    }

    #[test]
    fn test_largest_gear_indices_stay_in_range() {
        let spec = GearSpec::new(1.0, 4.0, 1.0, MAX_TEETH, 0.7).unwrap();
        let gear = generate_gear(&spec);

        assert!(gear.flat.vertex_count() <= u16::MAX as usize + 1);
        assert_group_invariants(&gear.flat);
        assert_group_invariants(&gear.smooth);
        let last = *gear.flat.indices.iter().max().unwrap();
        assert_eq!(last as usize, gear.flat.vertex_count() - 1);
    }

    proptest! {
        #[test]
        fn prop_counts_are_closed_form(
            teeth in 3u32..400,
            inner in 0.1f32..2.0,
            extra in 0.5f32..5.0,
            width in 0.1f32..3.0,
            depth in 0.1f32..1.0,
        ) {
            let spec = GearSpec::new(inner, inner + extra, width, teeth, depth).unwrap();
            let gear = generate_gear(&spec);
            let t = teeth as usize;

            prop_assert_eq!(gear.flat.vertex_count(), 24 * t + 6);
            prop_assert_eq!(gear.flat.indices.len(), 60 * t);
            prop_assert_eq!(gear.smooth.vertex_count(), 2 * t + 2);
            prop_assert_eq!(gear.smooth.indices.len(), 6 * t);

            let flat_len = gear.flat.vertex_count();
            prop_assert!(gear.flat.indices.iter().all(|&i| (i as usize) < flat_len));
            let smooth_len = gear.smooth.vertex_count();
            prop_assert!(gear.smooth.indices.iter().all(|&i| (i as usize) < smooth_len));
        }
    }

    #[test]
    fn test_spec_validation() {
        assert!(GearSpec::new(1.0, 4.0, 1.0, 0, 0.7).is_err());
        assert!(GearSpec::new(-1.0, 4.0, 1.0, 20, 0.7).is_err());
        assert!(GearSpec::new(1.0, f32::NAN, 1.0, 20, 0.7).is_err());
        assert!(GearSpec::new(1.0, 4.0, 1.0, super::super::MAX_TEETH + 1, 0.7).is_err());

        let largest = GearSpec::new(1.0, 4.0, 1.0, super::super::MAX_TEETH, 0.7).unwrap();
        assert!(largest.flat_vertex_count() <= u16::MAX as usize + 1);
    }
}
