//! A small library for reading BMP images and flattening their pixel data.
//!
//! Images are decoded into an [`Image`] that keeps the file's native color mode (palette
//! indexes, RGB or RGBA). Converting it with [`Image::to_rgb`] and walking the pixels in
//! row-major order gives the sequence that [`flatten`] concatenates into `R, G, B, R, G, B, ...`.
//! The [`matrix`] module packs such a sequence into bit-plane frames for a 64x32 LED panel.
//!
//!# Example
//!
//!```no_run
//!use bmp_flatten::{Flattener, write_flattened};
//!
//!fn main() -> bmp_flatten::BmpResult<()> {
//!    let values = Flattener::new().flatten("img.bmp")?;
//!    write_flattened(&mut std::io::stdout(), &values)?;
//!    Ok(())
//!}
//!```

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

pub use decoder::{BmpError, BmpResult, BmpVersion, CompressionType};
pub use flatten::{flatten, flatten_pixels, write_flattened, BmpSource, Flattener, ImageSource};

/// Macro to generate a `Pixel` from `r`, `g` and `b` values
#[macro_export]
macro_rules! px {
    ($r:expr, $g:expr, $b:expr) => {
        $crate::Pixel { r: $r as u8, g: $g as u8, b: $b as u8 }
    };
}

/// The pixel data used in the `Image`
///
/// It has three values for the `red`, `green` and `blue` color channels.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Pixel {
    /// Returns the three channels in `red`, `green`, `blue` order.
    #[inline]
    pub fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// A pixel with an alpha channel, as found in 16 and 32-bit images with an alpha mask.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Drops the alpha channel.
    #[inline]
    pub fn rgb(self) -> Pixel {
        px!(self.r, self.g, self.b)
    }
}

/// Common color constants accessible by names.
pub mod consts;
pub mod decoder;
pub mod flatten;
pub mod matrix;


/// The color mode an `Image` was decoded in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColorMode {
    /// One palette index per pixel.
    Indexed,
    /// Three channels per pixel.
    Rgb,
    /// Three color channels plus alpha.
    Rgba,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum PixelData {
    Indexed { palette: Vec<Pixel>, indexes: Vec<u8> },
    Rgb(Vec<Pixel>),
    Rgba(Vec<Rgba>),
}

impl PixelData {
    fn len(&self) -> usize {
        match *self {
            PixelData::Indexed { ref indexes, .. } => indexes.len(),
            PixelData::Rgb(ref data) => data.len(),
            PixelData::Rgba(ref data) => data.len(),
        }
    }

    fn into_rgb(self) -> Vec<Pixel> {
        match self {
            PixelData::Indexed { palette, indexes } => {
                indexes.into_iter().map(|i| palette[i as usize]).collect()
            }
            PixelData::Rgb(data) => data,
            PixelData::Rgba(data) => data.into_iter().map(Rgba::rgb).collect(),
        }
    }
}

/// The image handle provided by the library.
///
/// It holds the decoded samples in the color mode of the file they came from, until it is
/// converted with `to_rgb`.
///
/// The image is accessed in row-major order from top to bottom,
/// where point (0, 0) is defined to be in the upper left corner of the image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    version: BmpVersion,
    bits_per_pixel: u16,
    data: PixelData,
}

impl Image {
    /// Returns a new RGB Image with the `width` and `height` specified. It is initialized to
    /// a black image by default.
    ///
    /// # Example
    ///
    /// ```
    /// let img = bmp_flatten::Image::new(100, 80);
    /// assert_eq!(img.get_width(), 100);
    /// ```
    pub fn new(width: u32, height: u32) -> Image {
        let data = vec![px!(0, 0, 0); width as usize * height as usize];
        Image::from_parts(width, height, BmpVersion::Version3, 24, PixelData::Rgb(data))
    }

    /// Builds an RGB image from pixels given in row-major order.
    ///
    /// This is the entry point for `ImageSource` implementations that decode with something
    /// other than this crate's decoder.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Pixel>) -> BmpResult<Image> {
        if pixels.len() as u64 != u64::from(width) * u64::from(height) {
            return Err(BmpError::InvalidDimensions(format!(
                "{} pixels do not fill a {}x{} image",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Image::from_parts(width, height, BmpVersion::Version3, 24, PixelData::Rgb(pixels)))
    }

    pub(crate) fn from_parts(
        width: u32,
        height: u32,
        version: BmpVersion,
        bits_per_pixel: u16,
        data: PixelData,
    ) -> Image {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Image { width, height, version, bits_per_pixel, data }
    }

    /// Returns the `width` of the Image
    #[inline]
    pub fn get_width(&self) -> u32 {
        self.width
    }

    /// Returns the `height` of the Image
    #[inline]
    pub fn get_height(&self) -> u32 {
        self.height
    }

    /// Returns the bits per pixel of the file the image was decoded from.
    #[inline]
    pub fn bits_per_pixel(&self) -> u16 {
        self.bits_per_pixel
    }

    /// Returns the BMP version of the file the image was decoded from.
    #[inline]
    pub fn version(&self) -> BmpVersion {
        self.version
    }

    #[inline]
    pub fn color_mode(&self) -> ColorMode {
        match self.data {
            PixelData::Indexed { .. } => ColorMode::Indexed,
            PixelData::Rgb(_) => ColorMode::Rgb,
            PixelData::Rgba(_) => ColorMode::Rgba,
        }
    }

    /// Returns the palette of an indexed image.
    pub fn palette(&self) -> Option<&[Pixel]> {
        match self.data {
            PixelData::Indexed { ref palette, .. } => Some(palette),
            _ => None,
        }
    }

    /// Converts the image to three-channel RGB, resolving palette indexes and dropping any
    /// alpha channel. An image that already is RGB is returned unchanged.
    pub fn to_rgb(self) -> Image {
        let mode = self.color_mode();
        if mode == ColorMode::Rgb {
            return self;
        }
        log::debug!("converting {:?} image to RGB", mode);
        Image { data: PixelData::Rgb(self.data.into_rgb()), ..self }
    }

    /// Set the pixel value at the position of `x` and `y`. Images that are not RGB are
    /// converted first.
    ///
    /// # Example
    ///
    /// ```
    /// let mut img = bmp_flatten::Image::new(100, 80);
    /// img.set_pixel(10, 10, bmp_flatten::consts::RED);
    /// assert_eq!(img.get_pixel(10, 10), bmp_flatten::consts::RED);
    /// ```
    pub fn set_pixel(&mut self, x: u32, y: u32, val: Pixel) {
        let index = self.index(x, y);
        if let PixelData::Rgb(ref mut data) = self.data {
            data[index] = val;
            return;
        }
        let data = std::mem::replace(&mut self.data, PixelData::Rgb(Vec::new()));
        let mut data = data.into_rgb();
        data[index] = val;
        self.data = PixelData::Rgb(data);
    }

    /// Returns the pixel value at the position of `x` and `y`, whatever the color mode.
    ///
    /// # Example
    ///
    /// ```
    /// let img = bmp_flatten::Image::new(100, 80);
    /// assert_eq!(bmp_flatten::consts::BLACK, img.get_pixel(10, 10));
    /// ```
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> Pixel {
        let index = self.index(x, y);
        match self.data {
            PixelData::Indexed { ref palette, ref indexes } => palette[indexes[index] as usize],
            PixelData::Rgb(ref data) => data[index],
            PixelData::Rgba(ref data) => data[index].rgb(),
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "pixel ({}, {}) is outside the image", x, y);
        y as usize * self.width as usize + x as usize
    }

    /// Returns a new `ImageIndex` that iterates over the image dimensions in top-bottom order.
    ///
    /// # Example
    ///
    /// ```
    /// let mut img = bmp_flatten::Image::new(100, 100);
    /// for (x, y) in img.coordinates() {
    ///     img.set_pixel(x, y, bmp_flatten::consts::BLUE);
    /// }
    /// ```
    #[inline]
    pub fn coordinates(&self) -> ImageIndex {
        ImageIndex::new(self.width, self.height)
    }

    /// Returns the pixels of the image in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.coordinates().map(move |(x, y)| self.get_pixel(x, y))
    }
}

/// Returns a `BmpResult`, either containing an `Image` or a `BmpError`.
///
/// # Example
///
/// ```no_run
/// let img = match bmp_flatten::open("test/rgbw.bmp") {
///     Ok(img) => img,
///     Err(e) => panic!("Failed to open: {}", e)
/// };
/// ```
pub fn open<P: AsRef<Path>>(path: P) -> BmpResult<Image> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    log::debug!("read {} bytes from {}", bytes.len(), path.display());
    decoder::decode_image(&mut Cursor::new(bytes))
}

/// Attempts to construct a new `Image` from the given reader.
pub fn from_reader<R: Read>(source: &mut R) -> BmpResult<Image> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    decoder::decode_image(&mut Cursor::new(bytes))
}

/// An `Iterator` returning the `x` and `y` coordinates of an image.
///
/// It supports iteration over an image in row-major order, starting from in the upper left corner of the image.
#[derive(Clone, Copy, Debug)]
pub struct ImageIndex {
    width: u32,
    height: u32,
    x: u32,
    y: u32,
}

impl ImageIndex {
    fn new(width: u32, height: u32) -> ImageIndex {
        ImageIndex { width, height, x: 0, y: 0 }
    }
}

impl Iterator for ImageIndex {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<(u32, u32)> {
        if self.x < self.width && self.y < self.height {
            let this = Some((self.x, self.y));
            self.x += 1;
            if self.x == self.width {
                self.x = 0;
                self.y += 1;
            }
            this
        } else {
            None
        }
    }
}
