//! Flattening of decoded images into `R, G, B, R, G, B, ...` sequences.
//!
//! Decoding and color conversion sit behind [`ImageSource`], so the flattening itself only
//! walks pixels. [`BmpSource`] is the source backed by this crate's BMP decoder.

use std::io::{self, Write};
use std::path::Path;

use crate::{BmpResult, Image, Pixel};

/// A capability that turns a file into an `Image` and normalizes it to RGB.
pub trait ImageSource {
    /// Decodes the file at `path`.
    fn decode(&self, path: &Path) -> BmpResult<Image>;

    /// Converts `image` to three-channel RGB, dropping palette and alpha information.
    fn to_rgb(&self, image: Image) -> Image {
        image.to_rgb()
    }
}

/// Decodes files with the crate's own BMP decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct BmpSource;

impl ImageSource for BmpSource {
    fn decode(&self, path: &Path) -> BmpResult<Image> {
        crate::open(path)
    }
}

impl<S: ImageSource + ?Sized> ImageSource for &S {
    fn decode(&self, path: &Path) -> BmpResult<Image> {
        (**self).decode(path)
    }

    fn to_rgb(&self, image: Image) -> Image {
        (**self).to_rgb(image)
    }
}

/// Turns image files into flat sequences of channel values.
///
/// # Example
///
/// ```no_run
/// use bmp_flatten::Flattener;
///
/// let values = Flattener::new().flatten("img.bmp").unwrap();
/// assert_eq!(values.len() % 3, 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Flattener<S = BmpSource> {
    source: S,
}

impl Flattener<BmpSource> {
    pub fn new() -> Flattener<BmpSource> {
        Flattener { source: BmpSource }
    }
}

impl<S: ImageSource> Flattener<S> {
    /// Returns a flattener that decodes through `source`.
    pub fn with_source(source: S) -> Flattener<S> {
        Flattener { source }
    }

    /// Decodes the image at `path`, converts it to RGB and returns its channel values in
    /// row-major order. Nothing is produced if decoding fails.
    pub fn flatten<P: AsRef<Path>>(&self, path: P) -> BmpResult<Vec<u8>> {
        let path = path.as_ref();
        let image = self.source.decode(path)?;
        let image = self.source.to_rgb(image);
        log::debug!(
            "flattening {}: {}x{}",
            path.display(),
            image.get_width(),
            image.get_height()
        );

        Ok(flatten_pixels(image.pixels()))
    }
}

/// Flattens the image at `path` with the built-in BMP decoder.
pub fn flatten<P: AsRef<Path>>(path: P) -> BmpResult<Vec<u8>> {
    Flattener::new().flatten(path)
}

/// Concatenates the channels of each pixel, keeping pixel order.
pub fn flatten_pixels<I: IntoIterator<Item = Pixel>>(pixels: I) -> Vec<u8> {
    let pixels = pixels.into_iter();
    let mut values = Vec::with_capacity(pixels.size_hint().0 * 3);
    for px in pixels {
        values.extend_from_slice(&px.channels());
    }
    values
}

/// Writes `values` as a bracketed, comma separated list followed by a newline,
/// e.g. `[255, 0, 0]`.
pub fn write_flattened<W: Write + ?Sized>(out: &mut W, values: &[u8]) -> io::Result<()> {
    writeln!(out, "{:?}", values)
}
