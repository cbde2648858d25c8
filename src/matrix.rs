//! Bit-plane frames for a 64x32 HUB75 LED matrix.
//!
//! A panel of this kind only switches LEDs on or off, so brightness comes from binary coded
//! modulation: every channel is reduced to `BIT_DEPTH` bits and bit `n` of all pixels is
//! stored in plane `n`, which is shown `1 << n` times as long as plane 0. A plane row holds
//! one bit per column for each of the red, green and blue channels, split into two 32-bit
//! sections (columns 0-31 and 32-63).
//!
//! [`MatrixBuffer`] keeps two frames. [`MatrixBuffer::draw_bitmap`] packs a flattened
//! `R, G, B, ...` sequence into the back frame and then swaps it to the front, so the frame
//! being shown is never half written.
//!
//!# Example
//!
//!```
//!use bmp_flatten::matrix::{MatrixBuffer, FRAME_LEN};
//!
//!let mut matrix = MatrixBuffer::new();
//!matrix.draw_bitmap(&vec![255; FRAME_LEN]).unwrap();
//!assert_eq!(matrix.front().get_pixel(63, 31), bmp_flatten::px!(31, 31, 31));
//!```

use std::mem;

use crate::decoder::{BmpError, BmpResult};
use crate::Pixel;

/// Columns of the panel.
pub const WIDTH: usize = 64;
/// Rows of the panel.
pub const HEIGHT: usize = 32;
/// Bits kept per color channel, which is also the number of planes in a frame.
pub const BIT_DEPTH: usize = 5;
/// Exponent of the gamma curve applied before the bit depth is reduced.
pub const GAMMA: f64 = 2.0;
/// Length of a flattened sequence that fills the panel.
pub const FRAME_LEN: usize = WIDTH * HEIGHT * 3;

/// Rows driven at once. Row `address` and row `address + SCAN_ROWS` share a clock cycle.
pub const SCAN_ROWS: usize = HEIGHT / 2;

const SECTION_WIDTH: usize = 32;
const SECTIONS: usize = WIDTH / SECTION_WIDTH;
const CHANNELS: usize = 3;

/// One row of a plane: `[channel][section]`, bit `x % 32` of a section is column `x`.
pub type PlaneRow = [[u32; SECTIONS]; CHANNELS];

type Plane = [PlaneRow; HEIGHT];

/// Applies the gamma curve to an 8-bit channel value and scales it down to `BIT_DEPTH` bits.
///
/// Both steps truncate, so low values fall to 0 and only 255 reaches the maximum level.
///
/// # Example
///
/// ```
/// use bmp_flatten::matrix::convert_bit_depth;
///
/// assert_eq!(convert_bit_depth(0), 0);
/// assert_eq!(convert_bit_depth(128), 7);
/// assert_eq!(convert_bit_depth(255), 31);
/// ```
pub fn convert_bit_depth(value: u8) -> u8 {
    let corrected = ((f64::from(value) / 255.0).powf(GAMMA) * 255.0) as u32;
    let max_level = (1u32 << BIT_DEPTH) - 1;
    (corrected * max_level / 255) as u8
}

/// A single frame for the panel, stored as `BIT_DEPTH` planes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    planes: [Plane; BIT_DEPTH],
}

impl Default for Frame {
    fn default() -> Frame {
        Frame::new()
    }
}

impl Frame {
    /// Returns a frame with every LED off.
    pub fn new() -> Frame {
        Frame { planes: [[[[0; SECTIONS]; CHANNELS]; HEIGHT]; BIT_DEPTH] }
    }

    /// Turns every LED off.
    pub fn clear(&mut self) {
        for plane in self.planes.iter_mut() {
            *plane = [[[0; SECTIONS]; CHANNELS]; HEIGHT];
        }
    }

    /// Converts `val` with `convert_bit_depth` and stores its bits at `x` and `y`, replacing
    /// whatever the pixel held before.
    pub fn set_pixel(&mut self, x: usize, y: usize, val: Pixel) {
        let (section, bit) = Frame::locate(x, y);
        let levels = val.channels().map(convert_bit_depth);

        for (z, plane) in self.planes.iter_mut().enumerate() {
            for (words, level) in plane[y].iter_mut().zip(levels) {
                let word = &mut words[section];
                *word &= !(1 << bit);
                *word |= u32::from((level >> z) & 1) << bit;
            }
        }
    }

    /// Returns the converted channel levels at `x` and `y`, each in `0 .. 1 << BIT_DEPTH`.
    pub fn get_pixel(&self, x: usize, y: usize) -> Pixel {
        let (section, bit) = Frame::locate(x, y);
        let mut levels = [0u8; CHANNELS];

        for (z, plane) in self.planes.iter().enumerate() {
            for (level, words) in levels.iter_mut().zip(plane[y].iter()) {
                *level |= (((words[section] >> bit) & 1) as u8) << z;
            }
        }
        px!(levels[0], levels[1], levels[2])
    }

    /// Returns row `y` of plane `plane`.
    #[inline]
    pub fn row(&self, plane: usize, y: usize) -> &PlaneRow {
        &self.planes[plane][y]
    }

    /// Returns the order in which rows are clocked out to show this frame once.
    ///
    /// Planes come in ascending order and plane `n` is repeated `1 << n` times. Each pass
    /// walks the `SCAN_ROWS` addresses, pairing the upper and the lower half of the panel.
    pub fn scan(&self) -> impl Iterator<Item = ScanLine<'_>> + '_ {
        (0 .. BIT_DEPTH)
            .flat_map(|plane| (0 .. 1usize << plane).map(move |_| plane))
            .flat_map(move |plane| {
                (0 .. SCAN_ROWS).map(move |address| ScanLine {
                    plane,
                    address: address as u8,
                    upper: self.row(plane, address),
                    lower: self.row(plane, address + SCAN_ROWS),
                })
            })
    }

    #[inline]
    fn locate(x: usize, y: usize) -> (usize, usize) {
        assert!(x < WIDTH && y < HEIGHT, "pixel ({}, {}) is outside the matrix", x, y);
        (x / SECTION_WIDTH, x % SECTION_WIDTH)
    }
}

/// Two rows of one plane that are clocked out together.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanLine<'a> {
    pub plane: usize,
    /// Row address put on the address lines, the lower row sits `SCAN_ROWS` below it.
    pub address: u8,
    pub upper: &'a PlaneRow,
    pub lower: &'a PlaneRow,
}

/// A front frame that is shown and a back frame that is drawn into.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MatrixBuffer {
    front: Frame,
    back: Frame,
}

impl MatrixBuffer {
    /// Returns a buffer with both frames dark.
    pub fn new() -> MatrixBuffer {
        MatrixBuffer::default()
    }

    /// The frame that is currently shown.
    #[inline]
    pub fn front(&self) -> &Frame {
        &self.front
    }

    /// The frame that drawing goes to.
    #[inline]
    pub fn back(&self) -> &Frame {
        &self.back
    }

    /// Sets a pixel in the back frame.
    pub fn set_pixel(&mut self, x: usize, y: usize, val: Pixel) {
        self.back.set_pixel(x, y, val);
    }

    pub fn clear_buffer(&mut self) {
        self.back.clear();
    }

    /// Shows the back frame and takes the previously shown frame as the new back frame.
    pub fn swap_buffer(&mut self) {
        mem::swap(&mut self.front, &mut self.back);
    }

    /// Draws a flattened `R, G, B, ...` sequence of a 64x32 image in row-major order into
    /// the back frame and swaps it to the front.
    ///
    /// Nothing is drawn if the sequence does not hold exactly `FRAME_LEN` values.
    pub fn draw_bitmap(&mut self, values: &[u8]) -> BmpResult<()> {
        if values.len() != FRAME_LEN {
            return Err(BmpError::InvalidDimensions(format!(
                "{} values do not fill a {}x{} matrix, expected {}",
                values.len(),
                WIDTH,
                HEIGHT,
                FRAME_LEN
            )));
        }

        self.clear_buffer();
        for (i, rgb) in values.chunks_exact(3).enumerate() {
            self.back.set_pixel(i % WIDTH, i / WIDTH, px!(rgb[0], rgb[1], rgb[2]));
        }
        self.swap_buffer();
        log::debug!("drew {} pixels to the matrix", WIDTH * HEIGHT);
        Ok(())
    }
}
