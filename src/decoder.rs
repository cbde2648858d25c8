use byteorder::{LittleEndian, ReadBytesExt};

use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use crate::{Image, Pixel, PixelData, Rgba};

use self::CompressionType::*;

/// Upper bound on `width * height` accepted by the decoder.
pub const MAX_PIXELS: u64 = 1 << 28;

/// Size of the file header, including the magic numbers.
const FILE_HEADER_SIZE: u64 = 14;

/// A result type, either containing an `Image` or a `BmpError`.
pub type BmpResult<T> = Result<T, BmpError>;

/// The error type returned if the decoding of an image fails.
#[derive(Debug, thiserror::Error)]
pub enum BmpError {
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("wrong magic numbers: expected [66, 77], but was {0:?}")]
    WrongMagicNumbers([u8; 2]),

    #[error("unsupported BMP version: DIB header of {0} bytes")]
    UnsupportedBmpVersion(u32),

    #[error("unsupported bits per pixel: {0}")]
    UnsupportedBitsPerPixel(u16),

    #[error("unsupported compression type: {compression} with {bits_per_pixel} bits per pixel")]
    UnsupportedCompressionType { compression: CompressionType, bits_per_pixel: u16 },

    #[error("invalid image dimensions: {0}")]
    InvalidDimensions(String),

    #[error("image of {width}x{height} pixels exceeds the limit of {limit} pixels")]
    ImageTooLarge { width: u32, height: u32, limit: u64 },

    #[error("palette index {index} is out of range for a palette of {len} colors")]
    InvalidPaletteIndex { index: u8, len: usize },

    #[error("image data is truncated: {0}")]
    Truncated(String),
}

impl From<io::Error> for BmpError {
    fn from(err: io::Error) -> BmpError {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => BmpError::Truncated("unexpected end of file".to_string()),
            _ => BmpError::Io(err),
        }
    }
}

/// The BMP version, as told by the size of the DIB header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BmpVersion {
    Version2,
    Version3,
    Version4,
    Version5,
}

impl BmpVersion {
    fn from_header_size(header_size: u32) -> BmpResult<BmpVersion> {
        match header_size {
            12 => Ok(BmpVersion::Version2),
            // 52 and 56 are BITMAPINFOHEADER with the masks folded in
            40 | 52 | 56 => Ok(BmpVersion::Version3),
            108 => Ok(BmpVersion::Version4),
            124 => Ok(BmpVersion::Version5),
            other => Err(BmpError::UnsupportedBmpVersion(other)),
        }
    }
}

impl fmt::Display for BmpVersion {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            BmpVersion::Version2 => write!(fmt, "BMP Version 2"),
            BmpVersion::Version3 => write!(fmt, "BMP Version 3"),
            BmpVersion::Version4 => write!(fmt, "BMP Version 4"),
            BmpVersion::Version5 => write!(fmt, "BMP Version 5"),
        }
    }
}

/// The compression field of the DIB header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompressionType {
    Uncompressed,
    Rle8bit,
    Rle4bit,
    BitfieldsEncoding,
    Jpeg,
    Png,
    AlphaBitfieldsEncoding,
    Unknown(u32),
}

impl CompressionType {
    fn from_u32(val: u32) -> CompressionType {
        match val {
            0 => Uncompressed,
            1 => Rle8bit,
            2 => Rle4bit,
            3 => BitfieldsEncoding,
            4 => Jpeg,
            5 => Png,
            6 => AlphaBitfieldsEncoding,
            other => Unknown(other),
        }
    }

    fn is_bitfields(self) -> bool {
        matches!(self, BitfieldsEncoding | AlphaBitfieldsEncoding)
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Uncompressed => write!(fmt, "Uncompressed"),
            Rle8bit => write!(fmt, "RLE 8-bit"),
            Rle4bit => write!(fmt, "RLE 4-bit"),
            BitfieldsEncoding => write!(fmt, "Bitfields Encoding"),
            Jpeg => write!(fmt, "JPEG"),
            Png => write!(fmt, "PNG"),
            AlphaBitfieldsEncoding => write!(fmt, "Alpha Bitfields Encoding"),
            Unknown(val) => write!(fmt, "Unknown ({})", val),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct BmpHeader {
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) file_size: u32,
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) creator1: u16,
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) creator2: u16,
    pub(crate) pixel_offset: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct BmpDibHeader {
    pub(crate) header_size: u32,
    pub(crate) width: i32,
    pub(crate) height: i32,
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) num_planes: u16,
    pub(crate) bits_per_pixel: u16,
    pub(crate) compression: CompressionType,
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) data_size: u32,
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) hres: i32,
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) vres: i32,
    pub(crate) num_colors: u32,
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) num_imp_colors: u32,
    /// Red, green, blue and alpha masks stored inside headers of 52 bytes or more.
    pub(crate) masks: Option<ChannelMasks>,
}

impl BmpDibHeader {
    fn palette_entry_size(&self) -> u64 {
        // OS/2 1.x palettes are RGBTRIPLEs
        if self.header_size == 12 {
            3
        } else {
            4
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ChannelMasks {
    pub(crate) red: u32,
    pub(crate) green: u32,
    pub(crate) blue: u32,
    pub(crate) alpha: u32,
}

impl ChannelMasks {
    fn default_for(bits_per_pixel: u16) -> ChannelMasks {
        match bits_per_pixel {
            16 => ChannelMasks { red: 0x7c00, green: 0x03e0, blue: 0x001f, alpha: 0 },
            _ => ChannelMasks { red: 0x00ff_0000, green: 0x0000_ff00, blue: 0x0000_00ff, alpha: 0 },
        }
    }
}

/// A single color channel extracted from a packed 16 or 32-bit pixel.
#[derive(Clone, Copy, Debug)]
struct Channel {
    mask: u32,
    shift: u32,
    max: u32,
}

impl Channel {
    fn new(mask: u32) -> Channel {
        if mask == 0 {
            return Channel { mask: 0, shift: 0, max: 0 };
        }
        let shift = mask.trailing_zeros();
        Channel { mask, shift, max: mask >> shift }
    }

    /// Scales the channel to the range 0-255.
    #[inline]
    fn extract(&self, raw: u32) -> u8 {
        if self.max == 0 {
            return 0;
        }
        let value = u64::from((raw & self.mask) >> self.shift);
        (value * 255 / u64::from(self.max)) as u8
    }
}

pub fn decode_image(bmp_data: &mut Cursor<Vec<u8>>) -> BmpResult<Image> {
    read_bmp_id(bmp_data)?;
    let header = read_bmp_header(bmp_data)?;
    let dib_header = read_bmp_dib_header(bmp_data)?;
    let version = BmpVersion::from_header_size(dib_header.header_size)?;

    let (width, height) = validate_dimensions(&dib_header)?;
    let top_down = dib_header.height < 0;
    let bpp = dib_header.bits_per_pixel;

    bmp_data.seek(SeekFrom::Start(FILE_HEADER_SIZE + u64::from(dib_header.header_size)))?;
    let masks = read_channel_masks(bmp_data, &dib_header)?;
    let color_palette = read_color_palette(bmp_data, &dib_header, header.pixel_offset)?;

    let layout = Layout {
        width: width as usize,
        height: height as usize,
        offset: header.pixel_offset as usize,
        top_down,
    };
    let bytes = bmp_data.get_ref();

    let data = match (color_palette, dib_header.compression) {
        (Some(palette), Rle8bit) | (Some(palette), Rle4bit) => {
            let indexes = read_rle(bytes, &layout, dib_header.compression == Rle4bit)?;
            check_indexes(&indexes, &palette)?;
            PixelData::Indexed { palette, indexes }
        }
        (Some(palette), _) => {
            let indexes = read_indexes(bytes, &layout, bpp)?;
            check_indexes(&indexes, &palette)?;
            PixelData::Indexed { palette, indexes }
        }
        (None, _) if bpp == 24 => PixelData::Rgb(read_pixels(bytes, &layout)?),
        (None, _) => read_packed_pixels(bytes, &layout, bpp, masks)?,
    };

    log::debug!(
        "decoded {} image: {}x{}, {} bpp, {}, {}",
        version,
        width,
        height,
        bpp,
        dib_header.compression,
        if top_down { "top-down" } else { "bottom-up" }
    );

    Ok(Image::from_parts(width, height, version, bpp, data))
}

fn read_bmp_id(bmp_data: &mut Cursor<Vec<u8>>) -> BmpResult<()> {
    let mut bm = [0, 0];
    bmp_data.read_exact(&mut bm)?;

    if bm == *b"BM" {
        Ok(())
    } else {
        Err(BmpError::WrongMagicNumbers(bm))
    }
}

pub(crate) fn read_bmp_header(bmp_data: &mut Cursor<Vec<u8>>) -> BmpResult<BmpHeader> {
    let header = BmpHeader {
        file_size:    bmp_data.read_u32::<LittleEndian>()?,
        creator1:     bmp_data.read_u16::<LittleEndian>()?,
        creator2:     bmp_data.read_u16::<LittleEndian>()?,
        pixel_offset: bmp_data.read_u32::<LittleEndian>()?,
    };

    Ok(header)
}

pub(crate) fn read_bmp_dib_header(bmp_data: &mut Cursor<Vec<u8>>) -> BmpResult<BmpDibHeader> {
    let header_size = bmp_data.read_u32::<LittleEndian>()?;
    BmpVersion::from_header_size(header_size)?;

    if header_size == 12 {
        // BITMAPCOREHEADER: unsigned 16-bit dimensions, no compression
        return Ok(BmpDibHeader {
            header_size,
            width:          i32::from(bmp_data.read_u16::<LittleEndian>()?),
            height:         i32::from(bmp_data.read_u16::<LittleEndian>()?),
            num_planes:     bmp_data.read_u16::<LittleEndian>()?,
            bits_per_pixel: check_bits_per_pixel(bmp_data.read_u16::<LittleEndian>()?)?,
            compression:    Uncompressed,
            data_size:      0,
            hres:           0,
            vres:           0,
            num_colors:     0,
            num_imp_colors: 0,
            masks:          None,
        });
    }

    let mut dib_header = BmpDibHeader {
        header_size,
        width:          bmp_data.read_i32::<LittleEndian>()?,
        height:         bmp_data.read_i32::<LittleEndian>()?,
        num_planes:     bmp_data.read_u16::<LittleEndian>()?,
        bits_per_pixel: check_bits_per_pixel(bmp_data.read_u16::<LittleEndian>()?)?,
        compression:    CompressionType::from_u32(bmp_data.read_u32::<LittleEndian>()?),
        data_size:      bmp_data.read_u32::<LittleEndian>()?,
        hres:           bmp_data.read_i32::<LittleEndian>()?,
        vres:           bmp_data.read_i32::<LittleEndian>()?,
        num_colors:     bmp_data.read_u32::<LittleEndian>()?,
        num_imp_colors: bmp_data.read_u32::<LittleEndian>()?,
        masks:          None,
    };

    if header_size >= 52 {
        let red = bmp_data.read_u32::<LittleEndian>()?;
        let green = bmp_data.read_u32::<LittleEndian>()?;
        let blue = bmp_data.read_u32::<LittleEndian>()?;
        let alpha = if header_size >= 56 { bmp_data.read_u32::<LittleEndian>()? } else { 0 };
        dib_header.masks = Some(ChannelMasks { red, green, blue, alpha });
    }

    let bpp = dib_header.bits_per_pixel;
    let supported = match dib_header.compression {
        Uncompressed => true,
        Rle8bit => bpp == 8,
        Rle4bit => bpp == 4,
        BitfieldsEncoding | AlphaBitfieldsEncoding => bpp == 16 || bpp == 32,
        _ => false,
    };
    if !supported {
        return Err(BmpError::UnsupportedCompressionType {
            compression: dib_header.compression,
            bits_per_pixel: bpp,
        });
    }

    Ok(dib_header)
}

fn check_bits_per_pixel(bpp: u16) -> BmpResult<u16> {
    match bpp {
        1 | 2 | 4 | 8 | 16 | 24 | 32 => Ok(bpp),
        other => Err(BmpError::UnsupportedBitsPerPixel(other)),
    }
}

fn validate_dimensions(dh: &BmpDibHeader) -> BmpResult<(u32, u32)> {
    if dh.width <= 0 || dh.height == 0 {
        return Err(BmpError::InvalidDimensions(format!("{}x{}", dh.width, dh.height)));
    }
    if dh.height < 0 && !matches!(dh.compression, Uncompressed | BitfieldsEncoding | AlphaBitfieldsEncoding) {
        return Err(BmpError::InvalidDimensions(format!(
            "top-down images cannot use {} compression",
            dh.compression
        )));
    }

    let width = dh.width as u32;
    let height = dh.height.unsigned_abs();
    if u64::from(width) * u64::from(height) > MAX_PIXELS {
        return Err(BmpError::ImageTooLarge { width, height, limit: MAX_PIXELS });
    }
    Ok((width, height))
}

/// Reads the bitfield masks for 16 and 32-bit images. Must be called with the cursor placed
/// right after the DIB header.
fn read_channel_masks(bmp_data: &mut Cursor<Vec<u8>>, dh: &BmpDibHeader) -> BmpResult<ChannelMasks> {
    let bpp = dh.bits_per_pixel;
    if !dh.compression.is_bitfields() {
        return Ok(ChannelMasks::default_for(bpp));
    }

    if let Some(masks) = dh.masks {
        return Ok(masks);
    }

    // A plain BITMAPINFOHEADER is followed by the masks
    let red = bmp_data.read_u32::<LittleEndian>()?;
    let green = bmp_data.read_u32::<LittleEndian>()?;
    let blue = bmp_data.read_u32::<LittleEndian>()?;
    let alpha = match dh.compression {
        AlphaBitfieldsEncoding => bmp_data.read_u32::<LittleEndian>()?,
        _ => 0,
    };
    Ok(ChannelMasks { red, green, blue, alpha })
}

/// Reads the color palette of images with 8 or less bits per pixel. Must be called with the
/// cursor placed at the start of the palette.
fn read_color_palette(bmp_data: &mut Cursor<Vec<u8>>, dh: &BmpDibHeader, pixel_offset: u32) ->
                      BmpResult<Option<Vec<Pixel>>> {
    let bpp = dh.bits_per_pixel;
    if bpp > 8 {
        // num_colors only suggests a palette for optimized display here
        return Ok(None);
    }

    let max_entries = 1u64 << bpp;
    let mut num_entries = match u64::from(dh.num_colors) {
        0 => max_entries,
        n => n.min(max_entries),
    };

    // Some writers declare more colors than they store before the pixel data
    let entry_size = dh.palette_entry_size();
    let start = bmp_data.position();
    let offset = u64::from(pixel_offset);
    if offset > start {
        num_entries = num_entries.min((offset - start) / entry_size).max(1);
    }

    let mut px = [0; 4];
    let px = &mut px[.. entry_size as usize];
    let mut color_palette = Vec::with_capacity(num_entries as usize);
    for _ in 0 .. num_entries {
        bmp_data.read_exact(px)?;
        color_palette.push(px!(px[2], px[1], px[0]));
    }

    Ok(Some(color_palette))
}

fn check_indexes(indexes: &[u8], palette: &[Pixel]) -> BmpResult<()> {
    match indexes.iter().find(|&&index| index as usize >= palette.len()) {
        Some(&index) => Err(BmpError::InvalidPaletteIndex { index, len: palette.len() }),
        None => Ok(()),
    }
}

/// Where the pixel array lives and how its rows are ordered.
struct Layout {
    width: usize,
    height: usize,
    offset: usize,
    top_down: bool,
}

impl Layout {
    /// Maps a row index in file order to a row index counted from the top of the image.
    #[inline]
    fn image_row(&self, file_row: usize) -> usize {
        if self.top_down {
            file_row
        } else {
            self.height - 1 - file_row
        }
    }

    /// Returns the rows of an uncompressed pixel array, each paired with its image row.
    fn rows<'a>(&'a self, bytes: &'a [u8], bpp: u16) -> BmpResult<impl Iterator<Item = (usize, &'a [u8])> + 'a> {
        let stride = row_stride(bpp, self.width);
        let size = stride * self.height;
        let end = self.offset.checked_add(size).filter(|&end| end <= bytes.len()).ok_or_else(|| {
            BmpError::Truncated(format!(
                "expected {} bytes of pixel data at offset {}, but the file is {} bytes long",
                size,
                self.offset,
                bytes.len()
            ))
        })?;

        Ok(bytes[self.offset .. end]
            .chunks_exact(stride)
            .enumerate()
            .map(move |(file_row, row)| (self.image_row(file_row), row)))
    }
}

/// Rows are padded to a multiple of four bytes.
#[inline]
pub(crate) fn row_stride(bpp: u16, width: usize) -> usize {
    (bpp as usize * width + 31) / 32 * 4
}

fn read_indexes(bytes: &[u8], layout: &Layout, bpp: u16) -> BmpResult<Vec<u8>> {
    let width = layout.width;
    let rows = layout.rows(bytes, bpp)?;
    let mut data = vec![0; width * layout.height];
    let per_byte = 8 / bpp as usize;
    let mask = ((1u16 << bpp) - 1) as u8;

    for (y, row) in rows {
        let out = &mut data[y * width .. (y + 1) * width];
        for (x, index) in out.iter_mut().enumerate() {
            // the leftmost pixel sits in the most significant bits
            let shift = 8 - bpp as usize * (x % per_byte + 1);
            *index = (row[x / per_byte] >> shift) & mask;
        }
    }
    Ok(data)
}

fn read_pixels(bytes: &[u8], layout: &Layout) -> BmpResult<Vec<Pixel>> {
    let width = layout.width;
    let rows = layout.rows(bytes, 24)?;
    let mut data = vec![Pixel::default(); width * layout.height];

    for (y, row) in rows {
        let out = &mut data[y * width .. (y + 1) * width];
        for (px, bgr) in out.iter_mut().zip(row.chunks_exact(3)) {
            *px = px!(bgr[2], bgr[1], bgr[0]);
        }
    }
    Ok(data)
}

fn read_packed_pixels(bytes: &[u8], layout: &Layout, bpp: u16, masks: ChannelMasks) -> BmpResult<PixelData> {
    let (red, green, blue, alpha) = (
        Channel::new(masks.red),
        Channel::new(masks.green),
        Channel::new(masks.blue),
        Channel::new(masks.alpha),
    );
    let bytes_per_pixel = bpp as usize / 8;
    let width = layout.width;
    let rows = layout.rows(bytes, bpp)?;
    let mut data = vec![Rgba::default(); width * layout.height];

    for (y, row) in rows {
        let out = &mut data[y * width .. (y + 1) * width];
        for (px, mut raw) in out.iter_mut().zip(row.chunks_exact(bytes_per_pixel)) {
            let raw = match bpp {
                16 => u32::from(raw.read_u16::<LittleEndian>()?),
                _ => raw.read_u32::<LittleEndian>()?,
            };
            *px = Rgba {
                r: red.extract(raw),
                g: green.extract(raw),
                b: blue.extract(raw),
                a: alpha.extract(raw),
            };
        }
    }

    if masks.alpha == 0 {
        Ok(PixelData::Rgb(data.into_iter().map(Rgba::rgb).collect()))
    } else {
        Ok(PixelData::Rgba(data))
    }
}

/// Decodes an RLE8 or RLE4 pixel array into palette indexes. Pixels the stream skips keep
/// index 0, and pixels beyond the image bounds are dropped.
fn read_rle(bytes: &[u8], layout: &Layout, rle4: bool) -> BmpResult<Vec<u8>> {
    let (width, height) = (layout.width, layout.height);
    let mut data = vec![0; width * height];
    let stream = bytes.get(layout.offset ..).ok_or_else(|| {
        BmpError::Truncated(format!("pixel offset {} is past the end of the file", layout.offset))
    })?;
    let mut stream = Cursor::new(stream);

    let (mut x, mut row) = (0usize, 0usize);
    let mut put = |x: usize, row: usize, index: u8| {
        if x < width && row < height {
            data[layout.image_row(row) * width + x] = index;
        }
    };

    while row < height {
        let count = stream.read_u8()?;
        let value = stream.read_u8()?;

        if count > 0 {
            // encoded run, RLE4 alternates between the two nibbles
            for i in 0 .. count as usize {
                let index = match (rle4, i % 2) {
                    (true, 0) => value >> 4,
                    (true, _) => value & 0x0f,
                    (false, _) => value,
                };
                put(x, row, index);
                x += 1;
            }
            continue;
        }

        match value {
            // end of line
            0 => {
                x = 0;
                row += 1;
            }
            // end of bitmap
            1 => break,
            // delta
            2 => {
                x += stream.read_u8()? as usize;
                row += stream.read_u8()? as usize;
            }
            // absolute run, padded to a 16-bit boundary
            n => {
                let n = n as usize;
                let len = if rle4 { (n + 1) / 2 } else { n };
                let mut run = vec![0; len];
                stream.read_exact(&mut run)?;
                for i in 0 .. n {
                    let index = match (rle4, i % 2) {
                        (true, 0) => run[i / 2] >> 4,
                        (true, _) => run[i / 2] & 0x0f,
                        (false, _) => run[i],
                    };
                    put(x, row, index);
                    x += 1;
                }
                if len % 2 == 1 {
                    stream.read_u8()?;
                }
            }
        }
    }

    Ok(data)
}
