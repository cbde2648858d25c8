use crate::Pixel;

pub const BLACK: Pixel = Pixel { r: 0, g: 0, b: 0 };
pub const BLUE: Pixel = Pixel { r: 0, g: 0, b: 255 };
pub const GRAY: Pixel = Pixel { r: 128, g: 128, b: 128 };
pub const LIME: Pixel = Pixel { r: 0, g: 255, b: 0 };
pub const RED: Pixel = Pixel { r: 255, g: 0, b: 0 };
pub const WHITE: Pixel = Pixel { r: 255, g: 255, b: 255 };
pub const YELLOW: Pixel = Pixel { r: 255, g: 255, b: 0 };
