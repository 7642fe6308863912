//! Raster images as PDF image XObjects

use std::io::Cursor;
use image::codecs::jpeg::JpegDecoder;
use image::{ExtendedColorType, GenericImageView, ImageDecoder, ImageFormat};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use crate::error::Result;

/// A decoded image ready to be added to a document
#[derive(Debug, Clone)]
pub struct ImageXObject {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    stream: Stream,
    soft_mask: Option<Stream>,
}

impl ImageXObject {
    /// Decode raw image bytes (PNG, JPEG, GIF, ...)
    ///
    /// Plain grey or RGB JPEG data is embedded as-is with `DCTDecode`.
    /// Everything else (CMYK and YCCK JPEGs included) is decoded to 8-bit RGB samples, with a separate
    /// soft mask when the image has any transparency. Raw samples are left
    /// compressible so they are deflated when the document is compressed.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes)?;
        let decoded = image::load_from_memory_with_format(bytes, format)?;
        let (width, height) = decoded.dimensions();

        if format == ImageFormat::Jpeg {
            if let Some(color_space) = jpeg_passthrough_color_space(bytes)? {
                let dict = image_dictionary(width, height, color_space, Some("DCTDecode"));
                return Ok(Self {
                    width,
                    height,
                    stream: Stream {
                        dict,
                        content: bytes.to_vec(),
                        allows_compression: false,
                        start_position: None,
                    },
                    soft_mask: None,
                });
            }
        }

        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        let mut alpha = Vec::with_capacity(width as usize * height as usize);
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }

        let soft_mask = if alpha.iter().any(|&a| a != u8::MAX) {
            Some(Stream::new(image_dictionary(width, height, "DeviceGray", None), alpha))
        } else {
            None
        };

        Ok(Self {
            width,
            height,
            stream: Stream::new(image_dictionary(width, height, "DeviceRGB", None), rgb),
            soft_mask,
        })
    }

    /// True when the original JPEG bytes are embedded unchanged
    pub fn is_passthrough(&self) -> bool {
        self.stream.dict.get(b"Filter").is_ok()
    }

    /// True when a soft mask carries the image's transparency
    pub fn has_soft_mask(&self) -> bool {
        self.soft_mask.is_some()
    }

    /// Add the image (and its soft mask) to `doc`, returning the XObject id
    pub fn add_to(self, doc: &mut Document) -> ObjectId {
        let mut stream = self.stream;
        if let Some(mask) = self.soft_mask {
            let mask_id = doc.add_object(Object::Stream(mask));
            stream.dict.set("SMask", Object::Reference(mask_id));
        }
        doc.add_object(Object::Stream(stream))
    }
}

/// The colour space to embed JPEG data under unchanged, if it can be
///
/// Decoders report the colour type after conversion, so the JPEG's own
/// component layout is read from the header instead.
fn jpeg_passthrough_color_space(bytes: &[u8]) -> Result<Option<&'static str>> {
    let decoder = JpegDecoder::new(Cursor::new(bytes))?;
    Ok(match decoder.original_color_type() {
        ExtendedColorType::L8 => Some("DeviceGray"),
        ExtendedColorType::Rgb8 => Some("DeviceRGB"),
        _ => None,
    })
}

fn image_dictionary(width: u32, height: u32, color_space: &str, filter: Option<&str>) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(i64::from(width)));
    dict.set("Height", Object::Integer(i64::from(height)));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    if let Some(filter) = filter {
        dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
    }
    dict
}

/// Scale `(width, height)` to fit inside `(max_width, max_height)`, keeping the aspect ratio
///
/// Images are scaled up as well as down. Degenerate inputs give `(0, 0)`.
pub fn scale_to_fit(width: f32, height: f32, max_width: f32, max_height: f32) -> (f32, f32) {
    if width <= 0.0 || height <= 0.0 || max_width <= 0.0 || max_height <= 0.0 {
        return (0.0, 0.0);
    }

    let scale = (max_width / width).min(max_height / height);
    (width * scale, height * scale)
}
