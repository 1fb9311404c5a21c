//! Pulls drawable geometry out of binary glTF (GLB) models.

use crate::error::{Error, Result};
use gltf::mesh::Mode;
use tracing::debug;

/// Vertex positions of every primitive plus the triangle edges between them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wireframe {
    pub positions: Vec<[f32; 3]>,
    pub edges: Vec<[usize; 2]>,
}

pub fn looks_like_glb(bytes: &[u8]) -> bool {
    bytes.starts_with(b"glTF")
}

pub fn load(bytes: &[u8]) -> Result<Wireframe> {
    let (document, buffers, _images) = gltf::import_slice(bytes)?;
    let mut wireframe = Wireframe::default();

    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));
            let Some(positions) = reader.read_positions() else {
                debug!("Skipping primitive without positions in mesh {}", mesh.index());
                continue;
            };

            let base = wireframe.positions.len();
            wireframe.positions.extend(positions);
            let count = wireframe.positions.len() - base;

            if primitive.mode() != Mode::Triangles {
                continue;
            }
            let indices: Vec<usize> = match reader.read_indices() {
                Some(indices) => indices.into_u32().map(|i| i as usize).collect(),
                None => (0..count).collect(),
            };
            for triangle in indices.chunks_exact(3) {
                // Out-of-range indices are dropped rather than trusted.
                if triangle.iter().any(|&i| i >= count) {
                    continue;
                }
                let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| base + i);
                wireframe.edges.extend([[a, b], [b, c], [c, a]]);
            }
        }
    }

    if wireframe.positions.is_empty() {
        return Err(Error::EmptyModel);
    }
    debug!(
        "GLB mesh: {} vertices, {} edges",
        wireframe.positions.len(),
        wireframe.edges.len()
    );
    Ok(wireframe)
}

/// One indexed triangle packed as a GLB container.
#[cfg(test)]
pub(crate) fn triangle_glb() -> Vec<u8> {
    let document = serde_json::json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": 42 }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            {
                "bufferView": 0,
                "componentType": 5126,
                "count": 3,
                "type": "VEC3",
                "min": [0.0, 0.0, 0.0],
                "max": [2.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }]
    });

    let mut json = serde_json::to_vec(&document).unwrap();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let mut bin = Vec::new();
    for v in [0.0f32, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bin.extend_from_slice(&v.to_le_bytes());
    }
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total_len = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total_len);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total_len as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}
