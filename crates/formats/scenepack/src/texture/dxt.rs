//! DXT1 (BC1) block compression.
//!
//! The encoder picks the bounding-box endpoints of each 4×4 block and assigns
//! every pixel its nearest palette color. Blocks with pixels below half alpha
//! use the three-color mode with index 3 as transparent black.

use image::RgbaImage;

const BLOCK_BYTES: usize = 8;

/// Compressed size of a `width`×`height` image.
pub fn storage_size(width: u32, height: u32) -> usize {
    blocks(width) * blocks(height) * BLOCK_BYTES
}

fn blocks(n: u32) -> usize {
    (n.max(1) as usize).div_ceil(4)
}

fn to_565(c: [u8; 3]) -> u16 {
    ((c[0] as u16 >> 3) << 11) | ((c[1] as u16 >> 2) << 5) | (c[2] as u16 >> 3)
}

fn from_565(v: u16) -> [u8; 3] {
    let r = ((v >> 11) & 0x1F) as u8;
    let g = ((v >> 5) & 0x3F) as u8;
    let b = (v & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

fn mix(a: [u8; 3], b: [u8; 3], wa: u16, wb: u16) -> [u8; 3] {
    let f = |x: u8, y: u8| ((x as u16 * wa + y as u16 * wb) / (wa + wb)) as u8;
    [f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2])]
}

/// The four colors of a block, `None` for the transparent slot.
fn palette(c0: u16, c1: u16) -> [Option<[u8; 3]>; 4] {
    let (a, b) = (from_565(c0), from_565(c1));
    if c0 > c1 {
        [Some(a), Some(b), Some(mix(a, b, 2, 1)), Some(mix(a, b, 1, 2))]
    } else {
        [Some(a), Some(b), Some(mix(a, b, 1, 1)), None]
    }
}

fn distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(&b)
        .map(|(x, y)| (*x as i32 - *y as i32).unsigned_abs().pow(2))
        .sum()
}

fn encode_block(pixels: &[[u8; 4]; 16], out: &mut Vec<u8>) {
    let transparent = pixels.iter().any(|p| p[3] < 128);
    let mut lo = [255u8; 3];
    let mut hi = [0u8; 3];
    for p in pixels.iter().filter(|p| !transparent || p[3] >= 128) {
        for ch in 0..3 {
            lo[ch] = lo[ch].min(p[ch]);
            hi[ch] = hi[ch].max(p[ch]);
        }
    }
    let (mut c0, mut c1) = (to_565(hi), to_565(lo));
    if lo[0] > hi[0] {
        // Every pixel was transparent.
        (c0, c1) = (0, 0);
    }
    if transparent {
        if c0 > c1 {
            std::mem::swap(&mut c0, &mut c1);
        }
    } else if c0 < c1 {
        std::mem::swap(&mut c0, &mut c1);
    } else if c0 == c1 && c0 > 0 {
        // Keep four-color mode for flat blocks.
        c1 = c0 - 1;
    }
    let colors = palette(c0, c1);
    let mut indices = 0u32;
    for (i, p) in pixels.iter().enumerate() {
        let index = if transparent && p[3] < 128 {
            3
        } else {
            let rgb = [p[0], p[1], p[2]];
            colors
                .iter()
                .enumerate()
                .filter_map(|(j, c)| c.map(|c| (j, distance(c, rgb))))
                .min_by_key(|(_, d)| *d)
                .map_or(0, |(j, _)| j as u32)
        };
        indices |= index << (i * 2);
    }
    out.extend_from_slice(&c0.to_le_bytes());
    out.extend_from_slice(&c1.to_le_bytes());
    out.extend_from_slice(&indices.to_le_bytes());
}

/// Compress `image`. Edge blocks repeat the last row and column.
pub fn compress(image: &RgbaImage) -> Vec<u8> {
    let (w, h) = image.dimensions();
    let mut out = Vec::with_capacity(storage_size(w, h));
    if w == 0 || h == 0 {
        out.resize(storage_size(w, h), 0);
        return out;
    }
    for by in 0..blocks(h) as u32 {
        for bx in 0..blocks(w) as u32 {
            let mut block = [[0u8; 4]; 16];
            for (i, px) in block.iter_mut().enumerate() {
                let x = (bx * 4 + i as u32 % 4).min(w - 1);
                let y = (by * 4 + i as u32 / 4).min(h - 1);
                *px = image.get_pixel(x, y).0;
            }
            encode_block(&block, &mut out);
        }
    }
    out
}

/// Decompress `data` into a `width`×`height` image. Missing blocks decode
/// as transparent black.
pub fn decompress(data: &[u8], width: u32, height: u32) -> RgbaImage {
    let mut image = RgbaImage::new(width, height);
    let per_row = blocks(width);
    for (n, block) in data.chunks_exact(BLOCK_BYTES).enumerate() {
        let bx = (n % per_row) as u32 * 4;
        let by = (n / per_row) as u32 * 4;
        if by >= height {
            break;
        }
        let c0 = u16::from_le_bytes([block[0], block[1]]);
        let c1 = u16::from_le_bytes([block[2], block[3]]);
        let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        let colors = palette(c0, c1);
        for i in 0..16u32 {
            let (x, y) = (bx + i % 4, by + i / 4);
            if x >= width || y >= height {
                continue;
            }
            let px = match colors[((indices >> (i * 2)) & 3) as usize] {
                Some([r, g, b]) => [r, g, b, 255],
                None => [0, 0, 0, 0],
            };
            image.put_pixel(x, y, image::Rgba(px));
        }
    }
    image
}
