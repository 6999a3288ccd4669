//! Tiled quad atlases used by DBL image members.
//!
//! ```text
//! quad_count:i32 [0x40000001 quad_count:i32]  vertex_count:i32
//! quad_count × [i32; 4]  corner vertex indices
//! vertex_count × [i32; 2] pixel positions
//! [palette: count:u32 + count × u32]  (palette pixel types only)
//! per quad: [extra:u32]  stored_w stored_h valid_w valid_h :i16  pixels
//! ```

use image::RgbaImage;

use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};

/// Largest tile edge in source pixels.
pub const MAX_TILE: u32 = 256;

/// Quad count marker selecting the layout with one extra field per quad.
const EXTENDED_LAYOUT: i32 = 0x4000_0001;

/// Written for pixels no quad covers, before alpha handling.
const UNWRITTEN: u32 = 0xFFFF_00FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    /// 32-bit pixels.
    Rgba32,
    /// 8-bit palette indices.
    Palette8,
    /// 8-bit palette indices followed by an 8-bit alpha plane.
    Palette8Alpha,
    /// Two 4-bit palette indices per byte, low nibble first.
    Palette4,
    Other(u32),
}

impl PixelType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Rgba32,
            2 => Self::Palette8,
            3 => Self::Palette8Alpha,
            4 => Self::Palette4,
            n => Self::Other(n),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Rgba32 => 0,
            Self::Palette8 => 2,
            Self::Palette8Alpha => 3,
            Self::Palette4 => 4,
            Self::Other(n) => n,
        }
    }

    fn has_palette(self) -> bool {
        matches!(self, Self::Palette8 | Self::Palette8Alpha | Self::Palette4)
    }
}

/// Exchange the red and blue channels of a packed pixel.
pub fn swap_rb(px: u32) -> u32 {
    (px & 0xFF00_FF00) | ((px & 0x00FF_0000) >> 16) | ((px & 0xFF) << 16)
}

fn pack(px: [u8; 4]) -> u32 {
    u32::from_le_bytes(px)
}

/// Split `image` into tiles of at most 256×256 pixels whose storage sizes
/// are rounded up to powers of two.
pub fn split(image: &RgbaImage) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let nx = width.div_ceil(MAX_TILE);
    let ny = height.div_ceil(MAX_TILE);
    let mut w = Writer::new();
    w.write_i32((nx * ny) as i32);
    w.write_i32(((nx + 1) * (ny + 1)) as i32);
    for y in 0..ny {
        for x in 0..nx {
            w.write_i32(((y + 1) * (nx + 1) + x) as i32);
            w.write_i32(((y + 1) * (nx + 1) + x + 1) as i32);
            w.write_i32((y * (nx + 1) + x + 1) as i32);
            w.write_i32((y * (nx + 1) + x) as i32);
        }
    }
    for y in 0..=ny {
        for x in 0..=nx {
            w.write_i32((x * MAX_TILE).min(width) as i32);
            w.write_i32((y * MAX_TILE).min(height) as i32);
        }
    }
    for y in 0..ny {
        for x in 0..nx {
            let (x0, y0) = (x * MAX_TILE, y * MAX_TILE);
            let x1 = (x0 + MAX_TILE).min(width);
            let y1 = (y0 + MAX_TILE).min(height);
            let stored_w = (x1 - x0).next_power_of_two();
            let stored_h = (y1 - y0).next_power_of_two();
            w.write_i16(stored_w as i16);
            w.write_i16(stored_h as i16);
            w.write_i16((x1 - x0) as i16);
            w.write_i16((y1 - y0) as i16);
            for v in y0..y0 + stored_h {
                for u in x0..x0 + stored_w {
                    if u < x1 && v < y1 {
                        w.write_u32(swap_rb(pack(image.get_pixel(u, v).0)) ^ 0xFF00_0000);
                    } else {
                        w.write_u32(0);
                    }
                }
            }
        }
    }
    w.into_bytes()
}

struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Canvas {
    fn put(&mut self, x: i64, y: i64, px: u32) {
        if x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64 {
            self.pixels[y as usize * self.width as usize + x as usize] = px;
        }
    }

    fn update(&mut self, x: i64, y: i64, f: impl FnOnce(u32) -> u32) {
        if x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64 {
            let i = y as usize * self.width as usize + x as usize;
            self.pixels[i] = f(self.pixels[i]);
        }
    }
}

/// Reassemble a `width`×`height` image from `data`.
///
/// Stored alpha is inverted; `force_opaque = false` restores it (the exact
/// inverse of [`split`]) and `true` sets every pixel's alpha to 255.
/// Writes outside the image and unusable vertex or palette indices are
/// skipped. Truncated input fails.
pub fn unsplit(
    data: &[u8],
    width: u32,
    height: u32,
    pixel_type: PixelType,
    force_opaque: bool,
) -> Result<RgbaImage> {
    let mut canvas = Canvas {
        width,
        height,
        pixels: vec![UNWRITTEN; width as usize * height as usize],
    };
    let mut c = Cursor::new(data);
    let mut quad_count = c.read_i32()?;
    let extended = quad_count == EXTENDED_LAYOUT;
    if extended {
        quad_count = c.read_i32()?;
    }
    let quad_count = (quad_count & 0xFF_FFFF) as u32;
    let vertex_count = c.read_u32()?;
    let quads = counted(&mut c, quad_count, 16, |c| {
        Ok([c.read_i32()?, c.read_i32()?, c.read_i32()?, c.read_i32()?])
    })?;
    let vertices = counted(&mut c, vertex_count, 8, |c| Ok([c.read_i32()?, c.read_i32()?]))?;
    let palette: Vec<u32> = if pixel_type.has_palette() {
        let n = c.read_u32()?;
        counted(&mut c, n, 4, |c| Ok(swap_rb(c.read_u32()?)))?
    } else {
        Vec::new()
    };
    let color = |i: u8| palette.get(i as usize).copied();

    for quad in &quads {
        let corners: Option<Vec<[i32; 2]>> = quad
            .iter()
            .map(|&i| usize::try_from(i).ok().and_then(|i| vertices.get(i).copied()))
            .collect();
        // Unknown corners leave the quad's pixels unplaced.
        let origin = corners.map(|cs| {
            let x = cs.iter().map(|v| v[0]).min().unwrap_or(0);
            let y = cs.iter().map(|v| v[1]).min().unwrap_or(0);
            (x as i64, y as i64)
        });
        if extended {
            c.read_u32()?;
        }
        let dw = c.read_i16()?;
        let dh = c.read_i16()?;
        let vw = c.read_i16()?;
        let vh = c.read_i16()?;
        let (dw, dh) = (dw.max(0) as i64, dh.max(0) as i64);
        let rw = if vw >= 0 { vw as i64 } else { dw };
        let rh = if vh >= 0 { vh as i64 } else { dh };
        let mut place = |dx: i64, dy: i64, px: Option<u32>| {
            if let (Some((ox, oy)), Some(px)) = (origin, px) {
                if dx < rw && dy < rh {
                    canvas.put(ox + dx, oy + dy, px);
                }
            }
        };
        match pixel_type {
            PixelType::Rgba32 => {
                for dy in 0..dh {
                    for dx in 0..dw {
                        place(dx, dy, Some(swap_rb(c.read_u32()?)));
                    }
                }
            }
            PixelType::Palette8 => {
                for dy in 0..dh {
                    for dx in 0..dw {
                        place(dx, dy, color(c.read_u8()?));
                    }
                }
            }
            PixelType::Palette8Alpha => {
                for dy in 0..dh {
                    for dx in 0..dw {
                        place(dx, dy, color(c.read_u8()?).map(|p| p & 0x00FF_FFFF));
                    }
                }
                for dy in 0..dh {
                    for dx in 0..dw {
                        let alpha = (c.read_u8()? as u32) << 24;
                        if let Some((ox, oy)) = origin {
                            if dx < rw && dy < rh {
                                canvas.update(ox + dx, oy + dy, |p| p | alpha);
                            }
                        }
                    }
                }
            }
            PixelType::Palette4 => {
                for dy in 0..dh {
                    for dx in (0..dw).step_by(2) {
                        let byte = c.read_u8()?;
                        place(dx, dy, color(byte & 0x0F));
                        place(dx + 1, dy, color(byte >> 4));
                    }
                }
            }
            // Unknown layouts carry no pixels this codec can place.
            PixelType::Other(_) => {}
        }
    }

    let mut image = RgbaImage::new(width, height);
    for (dst, px) in image.pixels_mut().zip(&canvas.pixels) {
        let px = if force_opaque {
            px | 0xFF00_0000
        } else {
            px ^ 0xFF00_0000
        };
        dst.0 = px.to_le_bytes();
    }
    Ok(image)
}

fn counted<T>(
    c: &mut Cursor<'_>,
    count: u32,
    min_item_size: usize,
    mut read: impl FnMut(&mut Cursor<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let need = (count as usize).saturating_mul(min_item_size);
    if need > c.remaining() {
        return Err(Error::UnexpectedEof {
            offset: c.position(),
            need,
            have: c.remaining(),
        });
    }
    (0..count).map(|_| read(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba([x as u8, y as u8, (x ^ y) as u8, (x + 2 * y) as u8])
        })
    }

    #[test]
    fn split_unsplit_is_identity() {
        for (w, h) in [(1, 1), (3, 7), (256, 256), (257, 20), (300, 300), (600, 2)] {
            let image = gradient(w, h);
            let back = unsplit(&split(&image), w, h, PixelType::Rgba32, false).unwrap();
            assert_eq!(back, image, "{w}x{h}");
        }
    }

    #[test]
    fn boundary_300_has_four_power_of_two_tiles() {
        let data = split(&gradient(300, 300));
        let mut c = Cursor::new(&data);
        assert_eq!(c.read_i32().unwrap(), 4);
        assert_eq!(c.read_i32().unwrap(), 9);
        let quads: Vec<[i32; 4]> = (0..4)
            .map(|_| std::array::from_fn(|_| c.read_i32().unwrap()))
            .collect();
        assert_eq!(quads[0], [3, 4, 1, 0]);
        let vertices: Vec<[i32; 2]> = (0..9)
            .map(|_| [c.read_i32().unwrap(), c.read_i32().unwrap()])
            .collect();
        assert_eq!(vertices[4], [256, 256]);
        assert_eq!(vertices[8], [300, 300]);

        let mut headers = Vec::new();
        for _ in 0..4 {
            let h: [i16; 4] = std::array::from_fn(|_| c.read_i16().unwrap());
            c.skip(h[0] as usize * h[1] as usize * 4).unwrap();
            headers.push(h);
        }
        assert!(c.is_empty());
        assert_eq!(
            headers,
            [
                [256, 256, 256, 256],
                [64, 256, 44, 256],
                [256, 64, 256, 44],
                [64, 64, 44, 44],
            ]
        );
    }

    #[test]
    fn padding_is_zero_and_alpha_inverted() {
        let image = RgbaImage::from_pixel(3, 1, image::Rgba([1, 2, 3, 255]));
        let data = split(&image);
        // 2 counts, 4 indices, 4 vertices, header.
        let pixels = &data[8 + 16 + 32 + 8..];
        assert_eq!(&pixels[..4], &[3, 2, 1, 0]);
        assert_eq!(&pixels[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn force_opaque_sets_alpha() {
        let image = RgbaImage::from_pixel(2, 2, image::Rgba([9, 8, 7, 10]));
        let back = unsplit(&split(&image), 2, 2, PixelType::Rgba32, true).unwrap();
        assert_eq!(back.get_pixel(1, 1).0, [9, 8, 7, 255]);
    }

    /// One 2×2 quad at (0, 0) with a two-color palette.
    fn palette_buffer(pixels: &[u8]) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_i32(1);
        w.write_i32(4);
        for i in [2, 3, 1, 0] {
            w.write_i32(i);
        }
        for v in [[0, 0], [2, 0], [0, 2], [2, 2]] {
            w.write_i32(v[0]);
            w.write_i32(v[1]);
        }
        w.write_u32(2);
        w.write_u32(swap_rb(pack([10, 20, 30, 0])));
        w.write_u32(swap_rb(pack([40, 50, 60, 0])));
        for v in [2i16, 2, 2, 2] {
            w.write_i16(v);
        }
        w.write_bytes(pixels);
        w.into_bytes()
    }

    #[test]
    fn palette_types_decode() {
        let data = palette_buffer(&[0, 1, 1, 0]);
        let img = unsplit(&data, 3, 2, PixelType::Palette8, false).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [40, 50, 60, 255]);
        // Not covered by any quad.
        assert_eq!(img.get_pixel(2, 0).0, [255, 0, 255, 0]);

        let data = palette_buffer(&[0, 1, 1, 0, 0, 0, 0, 0x7F]);
        let img = unsplit(&data, 3, 2, PixelType::Palette8Alpha, false).unwrap();
        assert_eq!(img.get_pixel(1, 1).0, [10, 20, 30, 0x80]);

        let data = palette_buffer(&[0x10, 0x01]);
        let img = unsplit(&data, 3, 2, PixelType::Palette4, true).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [40, 50, 60, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [40, 50, 60, 255]);
    }

    #[test]
    fn extended_layout_skips_extra_field() {
        let image = gradient(5, 3);
        let plain = split(&image);
        let mut w = Writer::new();
        w.write_i32(EXTENDED_LAYOUT);
        w.write_i32(1);
        // Vertex count, indices and vertices.
        let header_len = 4 + 16 + 4 * 8;
        w.write_bytes(&plain[4..4 + header_len]);
        w.write_u32(0xDEAD_BEEF);
        w.write_bytes(&plain[4 + header_len..]);
        let back = unsplit(&w.into_bytes(), 5, 3, PixelType::Rgba32, false).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn bad_geometry_is_clipped_not_fatal() {
        let mut data = split(&gradient(4, 4));
        // Point the quad at vertex 99.
        data[8..12].copy_from_slice(&99i32.to_le_bytes());
        let img = unsplit(&data, 4, 4, PixelType::Rgba32, true).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 255, 255]);
        // Declared smaller than the stored tile.
        let img = unsplit(&split(&gradient(4, 4)), 2, 2, PixelType::Rgba32, false).unwrap();
        assert_eq!(img, gradient(2, 2));
    }

    #[test]
    fn truncated_buffer_fails() {
        let data = split(&gradient(4, 4));
        assert!(unsplit(&data[..data.len() - 1], 4, 4, PixelType::Rgba32, false).is_err());
        assert!(unsplit(&[0xFF; 8], 4, 4, PixelType::Rgba32, false).is_err());
    }
}
