use crate::error::Result;
use std::fmt;

/// Longest edge, in pixels, of a decoded preview.
pub const MAX_PREVIEW_EDGE: u32 = 512;

/// Decoded RGBA pixels ready to be turned into a texture.
#[derive(Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub size: [usize; 2],
    pub rgba: Vec<u8>,
}

impl fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PreviewImage({}x{})", self.size[0], self.size[1])
    }
}

pub fn decode(bytes: &[u8]) -> Result<PreviewImage> {
    let image = image::load_from_memory(bytes)?;
    let image = if image.width() > MAX_PREVIEW_EDGE || image.height() > MAX_PREVIEW_EDGE {
        image.thumbnail(MAX_PREVIEW_EDGE, MAX_PREVIEW_EDGE)
    } else {
        image
    };

    let rgba = image.to_rgba8();
    Ok(PreviewImage {
        size: [rgba.width() as usize, rgba.height() as usize],
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]))
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
