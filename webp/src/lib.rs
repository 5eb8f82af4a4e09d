use std::mem::MaybeUninit;

use image::DynamicImage;
use libwebp_sys::*;

/// The largest width or height libwebp will accept.
pub const MAX_DIMENSION: u32 = 16383;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("libwebp was built against an incompatible ABI version")]
    AbiMismatch,

    #[error("the encoder rejected the given configuration")]
    InvalidConfig,

    #[error("image dimensions {width}x{height} are outside of the supported range")]
    BadDimension { width: u32, height: u32 },

    #[error("pixel buffer is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("unsupported pixel layout, only 8-bit RGB and RGBA images can be encoded")]
    UnsupportedLayout,

    #[error("failed to import pixels into the encoder picture")]
    Import,

    #[error("encoding failed: {0}")]
    Encoding(&'static str),

    #[error("the encoder produced no output")]
    EmptyOutput,
}

/// The tunables handed to libwebp for a single encode.
#[derive(Debug, Copy, Clone)]
pub struct EncoderConfig {
    /// The ratio of lossy compression from 0.0 to 100.0 inclusive
    /// for minimal and maximal quality respectively.
    pub quality: f32,

    /// The quality/speed trade-off (0=fast, 6=slower-better)
    pub method: i32,

    /// Attempt to use multi-threaded encoding.
    pub threading: bool,
}

impl EncoderConfig {
    /// A lossy config at the given quality with libwebp's default effort.
    pub fn lossy(quality: f32) -> Self {
        Self {
            quality,
            method: 4,
            threading: false,
        }
    }

    fn to_raw(self) -> Result<WebPConfig, EncodeError> {
        let mut raw = MaybeUninit::<WebPConfig>::zeroed();

        let ok = unsafe {
            WebPConfigInitInternal(
                raw.as_mut_ptr(),
                WebPPreset::WEBP_PRESET_DEFAULT,
                self.quality,
                WEBP_ENCODER_ABI_VERSION as _,
            )
        };
        if ok == 0 {
            return Err(EncodeError::AbiMismatch);
        }

        let mut config = unsafe { raw.assume_init() };
        config.lossless = 0;
        config.quality = self.quality;
        config.method = self.method;
        config.thread_level = if self.threading { 1 } else { 0 };

        if unsafe { WebPValidateConfig(&config) } == 0 {
            return Err(EncodeError::InvalidConfig);
        }

        Ok(config)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb,
    Rgba,
}

impl PixelLayout {
    fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

pub struct Encoder<'a> {
    layout: PixelLayout,
    image: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> Encoder<'a> {
    /// Creates a new encoder from the given image.
    ///
    /// Only 8-bit RGB and RGBA images are accepted, anything else
    /// must be converted by the caller first.
    pub fn from_image(image: &'a DynamicImage) -> Result<Self, EncodeError> {
        match image {
            DynamicImage::ImageRgb8(image) => {
                Ok(Self::from_rgb(image.as_raw(), image.width(), image.height()))
            },
            DynamicImage::ImageRgba8(image) => {
                Ok(Self::from_rgba(image.as_raw(), image.width(), image.height()))
            },
            _ => Err(EncodeError::UnsupportedLayout),
        }
    }

    /// Creates a new encoder from the given image data in the RGB pixel layout.
    pub fn from_rgb(image: &'a [u8], width: u32, height: u32) -> Self {
        Self { image, width, height, layout: PixelLayout::Rgb }
    }

    /// Creates a new encoder from the given image data in the RGBA pixel layout.
    pub fn from_rgba(image: &'a [u8], width: u32, height: u32) -> Self {
        Self { image, width, height, layout: PixelLayout::Rgba }
    }

    /// Encode the image as lossy VP8 with 4:2:0 chroma subsampling.
    ///
    /// The output is a bare RIFF/WEBP container, no EXIF, ICC or XMP
    /// chunks are ever written.
    pub fn encode(&self, cfg: &EncoderConfig) -> Result<Vec<u8>, EncodeError> {
        if self.width == 0
            || self.height == 0
            || self.width > MAX_DIMENSION
            || self.height > MAX_DIMENSION
        {
            return Err(EncodeError::BadDimension {
                width: self.width,
                height: self.height,
            });
        }

        let channels = self.layout.channels();
        let expected = self.width as usize * self.height as usize * channels;
        if self.image.len() != expected {
            return Err(EncodeError::BufferSize {
                expected,
                actual: self.image.len(),
            });
        }

        let config = cfg.to_raw()?;
        let mut picture = Picture::new(self.width, self.height)?;
        picture.import(self.image, self.layout, self.width as usize * channels)?;

        let mut writer = MemoryWriter::new();
        picture.encode_into(&config, &mut writer)?;

        writer.to_vec()
    }
}

/// Owns a `WebPPicture` and frees any buffers libwebp attached to it on drop.
struct Picture(WebPPicture);

impl Picture {
    fn new(width: u32, height: u32) -> Result<Self, EncodeError> {
        let mut raw = MaybeUninit::<WebPPicture>::zeroed();

        let ok = unsafe {
            WebPPictureInitInternal(raw.as_mut_ptr(), WEBP_ENCODER_ABI_VERSION as _)
        };
        if ok == 0 {
            return Err(EncodeError::AbiMismatch);
        }

        let mut picture = unsafe { raw.assume_init() };

        // YUV mode, the importer converts straight into 4:2:0 planes.
        picture.use_argb = 0;
        picture.width = width as _;
        picture.height = height as _;

        Ok(Self(picture))
    }

    fn import(&mut self, pixels: &[u8], layout: PixelLayout, stride: usize) -> Result<(), EncodeError> {
        let ok = unsafe {
            match layout {
                PixelLayout::Rgb => WebPPictureImportRGB(&mut self.0, pixels.as_ptr(), stride as _),
                PixelLayout::Rgba => WebPPictureImportRGBA(&mut self.0, pixels.as_ptr(), stride as _),
            }
        };

        if ok == 0 {
            Err(EncodeError::Import)
        } else {
            Ok(())
        }
    }

    fn encode_into(&mut self, config: &WebPConfig, writer: &mut MemoryWriter) -> Result<(), EncodeError> {
        self.0.writer = Some(WebPMemoryWrite);
        self.0.custom_ptr = &mut writer.0 as *mut WebPMemoryWriter as *mut _;

        let ok = unsafe { WebPEncode(config, &mut self.0) };

        // The writer must not be reachable once this call returns.
        self.0.writer = None;
        self.0.custom_ptr = std::ptr::null_mut();

        if ok == 0 {
            Err(EncodeError::Encoding(describe_error(self.0.error_code as i32)))
        } else {
            Ok(())
        }
    }
}

impl Drop for Picture {
    fn drop(&mut self) {
        unsafe { WebPPictureFree(&mut self.0) }
    }
}

/// Owns the output buffer libwebp grows while encoding.
struct MemoryWriter(WebPMemoryWriter);

impl MemoryWriter {
    fn new() -> Self {
        let mut raw = MaybeUninit::<WebPMemoryWriter>::zeroed();
        unsafe {
            WebPMemoryWriterInit(raw.as_mut_ptr());
            Self(raw.assume_init())
        }
    }

    fn to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        if self.0.mem.is_null() || self.0.size == 0 {
            return Err(EncodeError::EmptyOutput);
        }

        let data = unsafe { std::slice::from_raw_parts(self.0.mem, self.0.size as usize) };
        Ok(data.to_vec())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        unsafe { WebPMemoryWriterClear(&mut self.0) }
    }
}

fn describe_error(code: i32) -> &'static str {
    match code {
        1 => "out of memory",
        2 => "out of memory while flushing bits",
        3 => "a required pointer was null",
        4 => "invalid configuration",
        5 => "bad picture dimension",
        6 => "first partition exceeds 512k",
        7 => "partition exceeds 16M",
        8 => "error while writing output",
        9 => "file is bigger than 4G",
        10 => "encoding aborted",
        _ => "unknown encoder error",
    }
}
