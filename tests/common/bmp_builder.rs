#![allow(dead_code)]

//! Builds BMP files in memory for tests.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use std::fs;
use std::path::PathBuf;

/// A BMP file under construction. Rows are given top to bottom and stored in the order the
/// sign of `height` asks for.
#[derive(Clone, Debug)]
pub struct BmpBuilder {
    width: i32,
    height: i32,
    bits_per_pixel: u16,
    header_size: u32,
    compression: u32,
    palette: Vec<[u8; 3]>,
    masks: Vec<u32>,
    pixel_array: Vec<u8>,
}

impl BmpBuilder {
    pub fn new(width: i32, height: i32, bits_per_pixel: u16) -> BmpBuilder {
        BmpBuilder {
            width,
            height,
            bits_per_pixel,
            header_size: 40,
            compression: 0,
            palette: Vec::new(),
            masks: Vec::new(),
            pixel_array: Vec::new(),
        }
    }

    pub fn header_size(mut self, header_size: u32) -> BmpBuilder {
        self.header_size = header_size;
        self
    }

    pub fn compression(mut self, compression: u32) -> BmpBuilder {
        self.compression = compression;
        self
    }

    /// Palette entries as `[r, g, b]`.
    pub fn palette(mut self, palette: &[[u8; 3]]) -> BmpBuilder {
        self.palette = palette.to_vec();
        self
    }

    /// Red, green, blue and optionally alpha masks. They follow a 40-byte header, larger
    /// headers carry them inline.
    pub fn masks(mut self, masks: &[u32]) -> BmpBuilder {
        self.masks = masks.to_vec();
        self
    }

    /// Raw pixel array, used as is.
    pub fn pixel_array(mut self, bytes: Vec<u8>) -> BmpBuilder {
        self.pixel_array = bytes;
        self
    }

    /// Pads each row to a multiple of four bytes and stores them bottom-up unless the
    /// height is negative.
    pub fn rows(mut self, rows: Vec<Vec<u8>>) -> BmpBuilder {
        let stride = (self.bits_per_pixel as usize * self.width as usize + 31) / 32 * 4;
        let mut rows: Vec<Vec<u8>> = rows
            .into_iter()
            .map(|mut row| {
                row.resize(stride, 0);
                row
            })
            .collect();
        if self.height > 0 {
            rows.reverse();
        }
        self.pixel_array = rows.concat();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let entry_size = if self.header_size == 12 { 3 } else { 4 };
        let trailing_masks = if self.header_size == 40 { self.masks.len() * 4 } else { 0 };
        let pixel_offset =
            14 + self.header_size as usize + trailing_masks + self.palette.len() * entry_size;

        let mut out = Vec::with_capacity(pixel_offset + self.pixel_array.len());
        out.extend_from_slice(b"BM");
        out.write_u32::<LittleEndian>((pixel_offset + self.pixel_array.len()) as u32).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(pixel_offset as u32).unwrap();

        out.write_u32::<LittleEndian>(self.header_size).unwrap();
        if self.header_size == 12 {
            out.write_u16::<LittleEndian>(self.width as u16).unwrap();
            out.write_u16::<LittleEndian>(self.height as u16).unwrap();
            out.write_u16::<LittleEndian>(1).unwrap(); // num_planes
            out.write_u16::<LittleEndian>(self.bits_per_pixel).unwrap();
        } else {
            out.write_i32::<LittleEndian>(self.width).unwrap();
            out.write_i32::<LittleEndian>(self.height).unwrap();
            out.write_u16::<LittleEndian>(1).unwrap(); // num_planes
            out.write_u16::<LittleEndian>(self.bits_per_pixel).unwrap();
            out.write_u32::<LittleEndian>(self.compression).unwrap();
            out.write_u32::<LittleEndian>(self.pixel_array.len() as u32).unwrap();
            out.write_i32::<LittleEndian>(2835).unwrap(); // hres
            out.write_i32::<LittleEndian>(2835).unwrap(); // vres
            out.write_u32::<LittleEndian>(self.palette.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap(); // num_imp_colors

            if self.header_size > 40 {
                let mut extra = vec![0; self.header_size as usize - 40];
                for (i, mask) in self.masks.iter().enumerate() {
                    LittleEndian::write_u32(&mut extra[i * 4 .. i * 4 + 4], *mask);
                }
                out.extend_from_slice(&extra);
            } else {
                for mask in &self.masks {
                    out.write_u32::<LittleEndian>(*mask).unwrap();
                }
            }
        }

        for &[r, g, b] in &self.palette {
            out.extend_from_slice(&[b, g, r]);
            if entry_size == 4 {
                out.push(0);
            }
        }

        out.extend_from_slice(&self.pixel_array);
        out
    }
}

/// Splits `[r, g, b]` pixels into BGR rows of `width` pixels.
pub fn bgr_rows(width: usize, pixels: &[[u8; 3]]) -> Vec<Vec<u8>> {
    pixels
        .chunks(width)
        .map(|row| row.iter().flat_map(|&[r, g, b]| [b, g, r]).collect())
        .collect()
}

/// Splits `[r, g, b, a]` pixels into rows of little-endian `0xAARRGGBB` values.
pub fn bgra_rows(width: usize, pixels: &[[u8; 4]]) -> Vec<Vec<u8>> {
    pixels
        .chunks(width)
        .map(|row| row.iter().flat_map(|&[r, g, b, a]| [b, g, r, a]).collect())
        .collect()
}

/// Splits 16-bit pixel values into little-endian rows.
pub fn word_rows(width: usize, pixels: &[u16]) -> Vec<Vec<u8>> {
    pixels
        .chunks(width)
        .map(|row| row.iter().flat_map(|px| px.to_le_bytes()).collect())
        .collect()
}

/// Packs palette indexes into rows, leftmost pixel in the most significant bits.
pub fn index_rows(width: usize, bits_per_pixel: u16, indexes: &[u8]) -> Vec<Vec<u8>> {
    let per_byte = 8 / bits_per_pixel as usize;
    indexes
        .chunks(width)
        .map(|row| {
            let mut bytes = vec![0u8; (width + per_byte - 1) / per_byte];
            for (x, index) in row.iter().enumerate() {
                let shift = 8 - bits_per_pixel as usize * (x % per_byte + 1);
                bytes[x / per_byte] |= index << shift;
            }
            bytes
        })
        .collect()
}

/// A 24-bit, bottom-up BMP with pixels given in row-major order.
pub fn rgb24(width: u32, height: u32, pixels: &[[u8; 3]]) -> Vec<u8> {
    BmpBuilder::new(width as i32, height as i32, 24)
        .rows(bgr_rows(width as usize, pixels))
        .build()
}

/// Writes `bytes` to a file in the temp directory, unique per process and `name`.
pub fn write_fixture(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("bmp-flatten-{}-{}", std::process::id(), name));
    fs::write(&path, bytes).unwrap();
    path
}
