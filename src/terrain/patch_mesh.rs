//! Patch geometry generation.
//!
//! Turns a rectangular heightfield region plus a mesh-space transform into a
//! renderable vertex/index grid. Normals come from central differences over
//! the padded field and go through the inverse-transpose normal matrix so
//! non-uniform scale keeps them perpendicular to the surface.

use glam::{Mat3, Mat4, Vec3};

use crate::gfx::types::PatchVertex;
use crate::terrain::heightfield::HeightField;

/// How many times the base UV square repeats across one patch.
pub const UV_TILING: f32 = 8.0;

pub struct PatchMesh {
    pub vertices: Vec<PatchVertex>,
    pub indices: Vec<u32>,
    pub height_min: f32,
    pub height_max: f32,
}

/// Generate the mesh for patch `(patch_x, patch_z)` of a terrain whose
/// heightfield carries a 1-cell padding border (the `+1` on every sample).
///
/// An `patch_width x patch_depth` quad grid needs `(w+1)*(d+1)` vertices and
/// `w*d*6` indices; cell triangles wind CCW for front faces.
pub fn generate_patch(
    field: &HeightField,
    patch_x: u32,
    patch_z: u32,
    patch_width: u32,
    patch_depth: u32,
    cell_size: f32,
    transform: Mat4,
    color: [f32; 4],
) -> PatchMesh {
    let vertex_cols = patch_width + 1;
    let vertex_rows = patch_depth + 1;
    let mut vertices = Vec::with_capacity((vertex_cols * vertex_rows) as usize);
    let mut height_min = f32::INFINITY;
    let mut height_max = f32::NEG_INFINITY;

    // Inverse-transpose of the upper-left 3x3, once per patch; every vertex
    // of the patch shares the same transform.
    let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();

    for iz in 0..=patch_depth {
        for ix in 0..=patch_width {
            let gx = i64::from(patch_x * patch_width + ix);
            let gz = i64::from(patch_z * patch_depth + iz);
            // The padded sample coordinates must stay inside the raw field;
            // the sized-to-edge+3 allocation guarantees it for valid patches.
            debug_assert!(gx + 2 < i64::from(field.width()), "gx {gx} outside padded field");
            debug_assert!(gz + 2 < i64::from(field.height()), "gz {gz} outside padded field");

            let h = field.get(gx + 1, gz + 1);
            height_min = height_min.min(h);
            height_max = height_max.max(h);

            let h_l = field.get(gx, gz + 1);
            let h_r = field.get(gx + 2, gz + 1);
            let h_d = field.get(gx + 1, gz);
            let h_u = field.get(gx + 1, gz + 2);
            let local_nrm = Vec3::new(h_l - h_r, 2.0 * cell_size, h_d - h_u)
                .try_normalize()
                .unwrap_or(Vec3::Y);
            let nrm = (normal_matrix * local_nrm)
                .try_normalize()
                .unwrap_or(Vec3::Y);

            let local_pos = Vec3::new(ix as f32 * cell_size, h, iz as f32 * cell_size);
            let pos = transform.transform_point3(local_pos);

            let uv = [
                ix as f32 / patch_width as f32 * UV_TILING,
                iz as f32 / patch_depth as f32 * UV_TILING,
            ];

            vertices.push(PatchVertex {
                pos: pos.to_array(),
                nrm: nrm.to_array(),
                uv,
                color,
                ..Default::default()
            });
        }
    }

    let mut indices = Vec::with_capacity((patch_width * patch_depth * 6) as usize);
    for z in 0..patch_depth {
        for x in 0..patch_width {
            let tl = z * vertex_cols + x;
            let tr = tl + 1;
            let bl = tl + vertex_cols;
            let br = bl + 1;
            indices.extend_from_slice(&[tl, bl, tr, tr, bl, br]);
        }
    }

    PatchMesh {
        vertices,
        indices,
        height_min,
        height_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::HEIGHTFIELD_RAW_SIZE;

    fn field_with(f: impl Fn(u32, u32) -> f32) -> HeightField {
        let n = HEIGHTFIELD_RAW_SIZE;
        let mut field = HeightField::new(n, n);
        for r in 0..n {
            for c in 0..n {
                field.set(i64::from(c), i64::from(r), f(c, r));
            }
        }
        field
    }

    #[test]
    fn vertex_and_index_counts_match_grid() {
        let field = field_with(|_, _| 0.0);
        for (w, d) in [(1u32, 1u32), (1, 4), (16, 16), (7, 3)] {
            let mesh = generate_patch(&field, 0, 0, w, d, 1.0, Mat4::IDENTITY, [1.0; 4]);
            assert_eq!(mesh.vertices.len() as u32, (w + 1) * (d + 1));
            assert_eq!(mesh.indices.len() as u32, w * d * 6);
        }
    }

    #[test]
    fn flat_field_normals_point_up() {
        let field = field_with(|_, _| 2.5);
        let mesh = generate_patch(&field, 1, 1, 8, 8, 1.0, Mat4::IDENTITY, [1.0; 4]);
        for v in &mesh.vertices {
            assert_eq!(v.nrm, [0.0, 1.0, 0.0]);
            assert_eq!(v.pos[1], 2.5);
        }
        assert_eq!(mesh.height_min, 2.5);
        assert_eq!(mesh.height_max, 2.5);
    }

    #[test]
    fn normals_are_unit_length() {
        let field = field_with(|c, r| ((c * 13 + r * 7) % 11) as f32 * 0.6 - 3.0);
        let mesh = generate_patch(&field, 0, 1, 16, 16, 0.5, Mat4::IDENTITY, [1.0; 4]);
        for v in &mesh.vertices {
            let len = Vec3::from_array(v.nrm).length();
            assert!((len - 1.0).abs() < 1e-4, "normal length {len}");
        }
    }

    #[test]
    fn transform_moves_positions_and_corrects_normals() {
        let field = field_with(|c, _| c as f32 * 0.5);
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 1.0, 0.5),
            glam::Quat::IDENTITY,
            Vec3::new(10.0, -4.0, 3.0),
        );
        let mesh = generate_patch(&field, 0, 0, 4, 4, 1.0, transform, [1.0; 4]);
        // First vertex sits at the translated origin (plus its own height).
        let first = mesh.vertices[0].pos;
        assert_eq!(first[0], 10.0);
        assert_eq!(first[2], 3.0);
        for v in &mesh.vertices {
            let len = Vec3::from_array(v.nrm).length();
            assert!((len - 1.0).abs() < 1e-4, "normal length {len} under non-uniform scale");
        }
    }

    #[test]
    fn winding_is_counter_clockwise_seen_from_above() {
        let field = field_with(|_, _| 0.0);
        let mesh = generate_patch(&field, 0, 0, 2, 2, 1.0, Mat4::IDENTITY, [1.0; 4]);
        for tri in mesh.indices.chunks_exact(3) {
            let a = Vec3::from_array(mesh.vertices[tri[0] as usize].pos);
            let b = Vec3::from_array(mesh.vertices[tri[1] as usize].pos);
            let c = Vec3::from_array(mesh.vertices[tri[2] as usize].pos);
            let n = (b - a).cross(c - a);
            assert!(n.y > 0.0, "triangle {tri:?} winds away from +Y");
        }
    }

    #[test]
    fn uvs_span_the_tiling_range() {
        let field = field_with(|_, _| 0.0);
        let mesh = generate_patch(&field, 0, 0, 4, 4, 1.0, Mat4::IDENTITY, [1.0; 4]);
        assert_eq!(mesh.vertices[0].uv, [0.0, 0.0]);
        let last = mesh.vertices.last().unwrap();
        assert_eq!(last.uv, [UV_TILING, UV_TILING]);
    }
}
