//! Mesh, line and light payloads carried by game objects.

use glam::Vec3;

use crate::chunk::Chunk;
use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};

/// Face flag: word 2 of the face is a texture id.
pub const FTX_TEXTURE: u16 = 0x20;
/// Face flag: word 3 of the face is a lightmap id.
pub const FTX_LIGHTMAP: u16 = 0x08;
/// Set on a texture or lightmap id that means "no texture".
pub const FTX_NO_TEXTURE: u16 = 0x8000;

/// Floats of texture coordinates per face: four UV pairs, triangles first.
const UV_FLOATS_PER_FACE: usize = 8;

/// Triangle and quad geometry with per-face texture records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<f32>,
    pub quad_indices: Vec<u16>,
    pub tri_indices: Vec<u16>,
    pub ftx_faces: Vec<[u16; 6]>,
    pub texture_coords: Vec<f32>,
    pub light_coords: Vec<f32>,
    pub weird: u32,
    pub extra: Vec<Chunk>,
}

impl Mesh {
    pub const TAG: [u8; 4] = *b"MESH";

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn tri_count(&self) -> usize {
        self.tri_indices.len() / 3
    }

    pub fn quad_count(&self) -> usize {
        self.quad_indices.len() / 4
    }

    pub fn vertex(&self, i: usize) -> Option<Vec3> {
        let v = self.vertices.get(i * 3..i * 3 + 3)?;
        Some(Vec3::new(v[0], v[1], v[2]))
    }

    /// Multiply every vertex component-wise by `factor`.
    pub fn scale(&mut self, factor: Vec3) {
        for v in self.vertices.chunks_exact_mut(3) {
            v[0] *= factor.x;
            v[1] *= factor.y;
            v[2] *= factor.z;
        }
    }

    /// Reverse the winding of every triangle and quad, with their UVs.
    pub fn invert_faces(&mut self) {
        let tris = self.tri_count();
        for t in self.tri_indices.chunks_exact_mut(3) {
            t.swap(0, 2);
        }
        for q in self.quad_indices.chunks_exact_mut(4) {
            q.reverse();
        }
        let mut uvs = self.texture_coords.chunks_exact_mut(UV_FLOATS_PER_FACE);
        for uv in uvs.by_ref().take(tris) {
            uv.swap(0, 4);
            uv.swap(1, 5);
        }
        for uv in uvs {
            uv.swap(0, 6);
            uv.swap(1, 7);
            uv.swap(2, 4);
            uv.swap(3, 5);
        }
    }

    /// Ids named by faces carrying `flag` in word 0, read from word `word`.
    pub fn face_texture_ids(&self, flag: u16, word: usize) -> Vec<u16> {
        let mut ids: Vec<u16> = self
            .ftx_faces
            .iter()
            .filter(|f| f[0] & flag != 0 && f[word] & FTX_NO_TEXTURE == 0)
            .map(|f| f[word])
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn from_chunk(chunk: &Chunk) -> Result<Self> {
        chunk.expect_tag(&Self::TAG)?;
        let mut mesh = Self {
            weird: Cursor::new(&chunk.main_data).read_u32()?,
            ..Self::default()
        };
        for sub in &chunk.subchunks {
            let data = &sub.main_data;
            match &sub.tag {
                b"VERT" => mesh.vertices = read_f32s(data)?,
                b"QUAD" => mesh.quad_indices = read_u16s(data)?,
                b"TRIS" => mesh.tri_indices = read_u16s(data)?,
                b"FTXF" => {
                    mesh.ftx_faces = read_u16s(data)?
                        .chunks_exact(6)
                        .map(|f| [f[0], f[1], f[2], f[3], f[4], f[5]])
                        .collect();
                    if data.len() % 12 != 0 {
                        return Err(Error::Parse {
                            context: "FTXF",
                            message: format!("{} bytes is not a whole number of faces", data.len()),
                        });
                    }
                }
                b"UVTX" => mesh.texture_coords = read_f32s(data)?,
                b"UVLM" => mesh.light_coords = read_f32s(data)?,
                _ => mesh.extra.push(sub.clone()),
            }
        }
        Ok(mesh)
    }

    pub fn to_chunk(&self) -> Chunk {
        let mut w = Writer::new();
        w.write_u32(self.weird);
        let mut chunk = Chunk::with_main(Self::TAG, w.into_bytes());
        chunk.subchunks.push(Chunk::with_main(*b"VERT", f32_bytes(&self.vertices)));
        chunk.subchunks.push(Chunk::with_main(*b"QUAD", u16_bytes(&self.quad_indices)));
        chunk.subchunks.push(Chunk::with_main(*b"TRIS", u16_bytes(&self.tri_indices)));
        let faces: Vec<u16> = self.ftx_faces.iter().flatten().copied().collect();
        chunk.subchunks.push(Chunk::with_main(*b"FTXF", u16_bytes(&faces)));
        chunk.subchunks.push(Chunk::with_main(*b"UVTX", f32_bytes(&self.texture_coords)));
        chunk.subchunks.push(Chunk::with_main(*b"UVLM", f32_bytes(&self.light_coords)));
        chunk.subchunks.extend(self.extra.iter().cloned());
        chunk
    }
}

fn read_f32s(data: &[u8]) -> Result<Vec<f32>> {
    if data.len() % 4 != 0 {
        return Err(Error::Parse {
            context: "float array",
            message: format!("{} bytes is not a multiple of 4", data.len()),
        });
    }
    let mut c = Cursor::new(data);
    (0..data.len() / 4).map(|_| c.read_f32()).collect()
}

fn read_u16s(data: &[u8]) -> Result<Vec<u16>> {
    if data.len() % 2 != 0 {
        return Err(Error::Parse {
            context: "index array",
            message: format!("{} bytes is not a multiple of 2", data.len()),
        });
    }
    let mut c = Cursor::new(data);
    (0..data.len() / 2).map(|_| c.read_u16()).collect()
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    let mut w = Writer::with_capacity(values.len() * 4);
    for v in values {
        w.write_f32(*v);
    }
    w.into_bytes()
}

fn u16_bytes(values: &[u16]) -> Vec<u8> {
    let mut w = Writer::with_capacity(values.len() * 2);
    for v in values {
        w.write_u16(*v);
    }
    w.into_bytes()
}

/// Polyline geometry: xyz vertices plus segment terminators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    pub vertices: Vec<f32>,
    pub terms: Vec<u32>,
}

impl Line {
    pub const TAG: [u8; 4] = *b"LINE";

    pub fn from_chunk(chunk: &Chunk) -> Result<Self> {
        chunk.expect_tag(&Self::TAG)?;
        let mut c = Cursor::new(&chunk.main_data);
        let vertices = c.read_counted(12, |c| {
            Ok([c.read_f32()?, c.read_f32()?, c.read_f32()?])
        })?;
        let terms = c.read_counted(4, Cursor::read_u32)?;
        Ok(Self {
            vertices: vertices.into_iter().flatten().collect(),
            terms,
        })
    }

    pub fn to_chunk(&self) -> Chunk {
        let mut w = Writer::new();
        w.write_u32((self.vertices.len() / 3) as u32);
        for v in self.vertices.chunks_exact(3).flatten() {
            w.write_f32(*v);
        }
        w.write_u32(self.terms.len() as u32);
        for t in &self.terms {
            w.write_u32(*t);
        }
        Chunk::with_main(Self::TAG, w.into_bytes())
    }
}

/// Light parameter block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Light {
    pub params: [u32; 7],
}

impl Light {
    pub const TAG: [u8; 4] = *b"LGHT";

    pub fn from_chunk(chunk: &Chunk) -> Result<Self> {
        chunk.expect_tag(&Self::TAG)?;
        let mut c = Cursor::new(&chunk.main_data);
        let mut params = [0u32; 7];
        for p in &mut params {
            *p = c.read_u32()?;
        }
        Ok(Self { params })
    }

    pub fn to_chunk(&self) -> Chunk {
        let mut w = Writer::new();
        for p in self.params {
            w.write_u32(p);
        }
        Chunk::with_main(Self::TAG, w.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_and_tri() -> Mesh {
        Mesh {
            vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            tri_indices: vec![0, 1, 2],
            quad_indices: vec![0, 1, 2, 3],
            ftx_faces: vec![
                [FTX_TEXTURE | FTX_LIGHTMAP, 0, 4, 9, 0, 0],
                [FTX_TEXTURE, 0, 4 | FTX_NO_TEXTURE, 2, 0, 0],
            ],
            texture_coords: (0..16).map(|i| i as f32).collect(),
            weird: 3,
            ..Mesh::default()
        }
    }

    #[test]
    fn chunk_roundtrip() {
        let mut mesh = quad_and_tri();
        mesh.extra.push(Chunk::with_main(*b"XTRA", vec![1]));
        let back = Mesh::from_chunk(&Chunk::parse(&mesh.to_chunk().to_bytes()).unwrap()).unwrap();
        assert_eq!(back, mesh);
    }

    #[test]
    fn scale_is_per_axis() {
        let mut mesh = quad_and_tri();
        mesh.scale(Vec3::new(2.0, 3.0, 1.0));
        assert_eq!(mesh.vertex(2), Some(Vec3::new(2.0, 3.0, 0.0)));
    }

    #[test]
    fn invert_faces_reverses_winding_and_uvs() {
        let mut mesh = quad_and_tri();
        mesh.invert_faces();
        assert_eq!(mesh.tri_indices, [2, 1, 0]);
        assert_eq!(mesh.quad_indices, [3, 2, 1, 0]);
        assert_eq!(mesh.texture_coords[..8], [4.0, 5.0, 2.0, 3.0, 0.0, 1.0, 6.0, 7.0]);
        assert_eq!(
            mesh.texture_coords[8..],
            [14.0, 15.0, 12.0, 13.0, 10.0, 11.0, 8.0, 9.0]
        );
        mesh.invert_faces();
        assert_eq!(mesh, quad_and_tri());
    }

    #[test]
    fn face_ids_skip_no_texture_bit() {
        let mesh = quad_and_tri();
        assert_eq!(mesh.face_texture_ids(FTX_TEXTURE, 2), [4]);
        assert_eq!(mesh.face_texture_ids(FTX_LIGHTMAP, 3), [9]);
    }

    #[test]
    fn odd_sized_arrays_fail() {
        let mut chunk = quad_and_tri().to_chunk();
        chunk.subchunks[0].main_data.pop();
        assert!(Mesh::from_chunk(&chunk).is_err());
    }

    #[test]
    fn line_and_light_roundtrip() {
        let line = Line {
            vertices: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            terms: vec![2],
        };
        assert_eq!(Line::from_chunk(&line.to_chunk()).unwrap(), line);
        let light = Light {
            params: [1, 2, 3, 4, 5, 6, 7],
        };
        assert_eq!(Light::from_chunk(&light.to_chunk()).unwrap(), light);
    }
}
