//! Texture chunks of the palette, DXT and light packs, plus the tiled
//! image codec used by DBL image members.

pub mod dxt;
mod split;

pub use split::{split, swap_rb, unsplit, PixelType, MAX_TILE};

use image::RgbaImage;

use crate::chunk::Chunk;
use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};

pub const TAG_PALETTED: [u8; 4] = *b"PALN";
pub const TAG_RGBA: [u8; 4] = *b"RGBA";
pub const TAG_DXT1: [u8; 4] = *b"DXT1";

/// Flags written on imported textures.
const IMPORT_FLAGS: u32 = 0x14;
/// Value of the `random` field on imported textures.
const IMPORT_RANDOM: u32 = 0x1234_5678;
/// Palettes hold at most this many colors.
const MAX_PALETTE: usize = 256;

/// Fixed header at the start of every texture chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexInfo {
    pub id: u32,
    pub height: u16,
    pub width: u16,
    pub mipmaps: u32,
    pub flags: u32,
    pub random: u32,
    pub name: String,
}

/// A parsed texture chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub tag: [u8; 4],
    pub info: TexInfo,
    /// One entry per mipmap, largest first.
    pub levels: Vec<Vec<u8>>,
    /// `PALN` only: RGBA palette entries.
    pub palette: Vec<u32>,
}

impl Texture {
    pub fn parse(chunk: &Chunk) -> Result<Self> {
        let mut c = Cursor::new(&chunk.main_data);
        let info = TexInfo {
            id: c.read_u32()?,
            height: c.read_u16()?,
            width: c.read_u16()?,
            mipmaps: c.read_u32()?,
            flags: c.read_u32()?,
            random: c.read_u32()?,
            name: c.read_cstring()?,
        };
        let mut levels = Vec::new();
        for _ in 0..info.mipmaps {
            levels.push(c.read_sized()?.to_vec());
        }
        let palette = if chunk.tag == TAG_PALETTED {
            c.read_counted(4, Cursor::read_u32)?
        } else {
            Vec::new()
        };
        Ok(Self {
            tag: chunk.tag,
            info,
            levels,
            palette,
        })
    }

    pub fn to_chunk(&self) -> Chunk {
        let mut w = Writer::new();
        w.write_u32(self.info.id);
        w.write_u16(self.info.height);
        w.write_u16(self.info.width);
        w.write_u32(self.info.mipmaps);
        w.write_u32(self.info.flags);
        w.write_u32(self.info.random);
        w.write_cstring(&self.info.name);
        for level in &self.levels {
            w.write_sized(level);
        }
        if self.tag == TAG_PALETTED {
            w.write_u32(self.palette.len() as u32);
            for entry in &self.palette {
                w.write_u32(*entry);
            }
        }
        Chunk::with_main(self.tag, w.into_bytes())
    }

    fn palette_color(&self, index: u8) -> u32 {
        self.palette
            .iter()
            .take(MAX_PALETTE)
            .nth(index as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Top mipmap as RGBA8.
    pub fn to_rgba(&self) -> Result<RgbaImage> {
        let (w, h) = (self.info.width as u32, self.info.height as u32);
        let level = self.levels.first().map(Vec::as_slice).unwrap_or_default();
        let pixel_count = w as usize * h as usize;
        let mut bytes = Vec::with_capacity(pixel_count * 4);
        match &self.tag {
            b"PALN" => {
                for index in level.iter().take(pixel_count) {
                    bytes.extend_from_slice(&self.palette_color(*index).to_le_bytes());
                }
            }
            b"RGBA" => bytes.extend_from_slice(&level[..level.len().min(pixel_count * 4)]),
            b"DXT1" => return Ok(dxt::decompress(level, w, h)),
            _ => {
                return Err(Error::Parse {
                    context: "texture",
                    message: format!(
                        "unsupported texture format {}",
                        String::from_utf8_lossy(&self.tag)
                    ),
                })
            }
        }
        bytes.resize(pixel_count * 4, 0);
        RgbaImage::from_raw(w, h, bytes).ok_or_else(|| Error::Parse {
            context: "texture",
            message: format!("{w}x{h} image does not fit its buffer"),
        })
    }

    /// Whether any pixel of the top mipmap is not fully opaque.
    pub fn uses_transparency(&self) -> bool {
        let level = self.levels.first().map(Vec::as_slice).unwrap_or_default();
        match &self.tag {
            b"PALN" => level
                .iter()
                .any(|i| self.palette_color(*i) & 0xFF00_0000 != 0xFF00_0000),
            b"RGBA" => level.chunks_exact(4).any(|px| px[3] != 0xFF),
            _ => false,
        }
    }
}

/// Decode the top mipmap of a texture chunk.
pub fn texture_rgba(chunk: &Chunk) -> Result<RgbaImage> {
    Texture::parse(chunk)?.to_rgba()
}

pub fn uses_transparency(chunk: &Chunk) -> Result<bool> {
    Ok(Texture::parse(chunk)?.uses_transparency())
}

/// Name stored in a texture chunk's header.
pub fn texture_name(chunk: &Chunk) -> Result<String> {
    Ok(Texture::parse(chunk)?.info.name)
}

/// Import `image` as a pair of an `RGBA` chunk and its `DXT1` twin, both
/// carrying id `id`.
pub fn build_texture_pair(image: &RgbaImage, name: &str, id: u32) -> (Chunk, Chunk) {
    let info = TexInfo {
        id,
        height: image.height() as u16,
        width: image.width() as u16,
        mipmaps: 1,
        flags: IMPORT_FLAGS,
        random: IMPORT_RANDOM,
        name: name.to_string(),
    };
    let rgba = Texture {
        tag: TAG_RGBA,
        info: info.clone(),
        levels: vec![image.as_raw().clone()],
        palette: Vec::new(),
    };
    let dxt = Texture {
        tag: TAG_DXT1,
        info,
        levels: vec![dxt::compress(image)],
        palette: Vec::new(),
    };
    (rgba.to_chunk(), dxt.to_chunk())
}

/// How well a texture size suits the renderers. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Conformance {
    Conforming = 0,
    NotPowerOfTwo = 1,
    NotMultipleOfFour = 2,
}

pub fn conformance(width: u32, height: u32) -> Conformance {
    if width % 4 != 0 || height % 4 != 0 {
        Conformance::NotMultipleOfFour
    } else if !width.is_power_of_two() || !height.is_power_of_two() {
        Conformance::NotPowerOfTwo
    } else {
        Conformance::Conforming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paletted() -> Texture {
        Texture {
            tag: TAG_PALETTED,
            info: TexInfo {
                id: 3,
                height: 1,
                width: 2,
                mipmaps: 1,
                flags: 0,
                random: 0,
                name: "wall".into(),
            },
            levels: vec![vec![1, 0]],
            palette: vec![0xFF00_00FF, 0x8000_FF00],
        }
    }

    #[test]
    fn chunk_roundtrip_and_leading_id() {
        let chunk = paletted().to_chunk();
        assert_eq!(chunk.leading_u32(), Some(3));
        assert_eq!(Texture::parse(&chunk).unwrap(), paletted());
    }

    #[test]
    fn paletted_to_rgba() {
        let img = paletted().to_rgba().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [0x00, 0xFF, 0x00, 0x80]);
        assert_eq!(img.get_pixel(1, 0).0, [0xFF, 0x00, 0x00, 0xFF]);
        assert!(paletted().uses_transparency());
    }

    #[test]
    fn imported_pair_shares_header() {
        let image = RgbaImage::from_pixel(8, 4, image::Rgba([1, 2, 3, 255]));
        let (rgba, dxt) = build_texture_pair(&image, "crate", 12);
        assert_eq!(rgba.tag, TAG_RGBA);
        assert_eq!(dxt.tag, TAG_DXT1);
        let (a, b) = (Texture::parse(&rgba).unwrap(), Texture::parse(&dxt).unwrap());
        assert_eq!(a.info, b.info);
        assert_eq!(a.info.flags, 0x14);
        assert_eq!(a.info.random, 0x1234_5678);
        assert_eq!(b.levels[0].len(), dxt::storage_size(8, 4));
        assert_eq!(a.to_rgba().unwrap(), image);
        assert!(!a.uses_transparency());
    }

    #[test]
    fn truncated_texture_fails() {
        let mut chunk = paletted().to_chunk();
        chunk.main_data.truncate(22);
        assert!(Texture::parse(&chunk).is_err());
    }

    #[test]
    fn conformance_levels() {
        assert_eq!(conformance(256, 64), Conformance::Conforming);
        assert_eq!(conformance(12, 8), Conformance::NotPowerOfTwo);
        assert_eq!(conformance(10, 8), Conformance::NotMultipleOfFour);
        assert_eq!(conformance(300, 300) as u8, 1);
    }
}
