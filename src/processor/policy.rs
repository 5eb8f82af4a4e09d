use std::path::Path;

use strum::{AsRefStr, Display};

/// The one optimisation policy every image is re-encoded with.
pub static POLICY: OptimizationPolicy = OptimizationPolicy {
    sampling_factors: [4, 2, 0],
    strip_metadata: true,
    quality: 80,
    colorspace: Colorspace::Srgb,
    target: TargetFormat::WebP,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    Other,
}

impl SourceFormat {
    /// Infers the source format from the object key's file extension.
    pub fn from_key(key: &str) -> Self {
        let extension = Path::new(key)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Interlace {
    None,
    Jpeg,
    Png,
    Gif,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum Colorspace {
    #[strum(serialize = "sRGB")]
    Srgb,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TargetFormat {
    WebP,
}

#[derive(Debug, Clone)]
pub struct OptimizationPolicy {
    /// Chroma subsampling factors in J:a:b notation.
    pub sampling_factors: [u8; 3],

    /// Drop EXIF, colour profiles and comments.
    pub strip_metadata: bool,

    /// Lossy compression quality from 0 to 100.
    pub quality: u8,

    pub colorspace: Colorspace,

    pub target: TargetFormat,
}

impl OptimizationPolicy {
    /// The scan layout requested for an image of the given source format.
    pub fn interlace_for(&self, source: SourceFormat) -> Interlace {
        match source {
            SourceFormat::Jpeg => Interlace::Jpeg,
            SourceFormat::Png => Interlace::Png,
            SourceFormat::Gif => Interlace::Gif,
            SourceFormat::Other => Interlace::None,
        }
    }

    #[inline]
    pub fn is_yuv420(&self) -> bool {
        self.sampling_factors == [4, 2, 0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_format_follows_extension() {
        assert_eq!(SourceFormat::from_key("images/pic.jpg"), SourceFormat::Jpeg);
        assert_eq!(SourceFormat::from_key("images/pic.jpeg"), SourceFormat::Jpeg);
        assert_eq!(SourceFormat::from_key("images/PIC.JPG"), SourceFormat::Jpeg);
        assert_eq!(SourceFormat::from_key("images/pic.png"), SourceFormat::Png);
        assert_eq!(SourceFormat::from_key("anim.gif"), SourceFormat::Gif);
        assert_eq!(SourceFormat::from_key("images/pic.tiff"), SourceFormat::Other);
        assert_eq!(SourceFormat::from_key("images.v2/pic"), SourceFormat::Other);
    }

    #[test]
    fn interlace_follows_source_format() {
        assert_eq!(POLICY.interlace_for(SourceFormat::Jpeg), Interlace::Jpeg);
        assert_eq!(POLICY.interlace_for(SourceFormat::Png), Interlace::Png);
        assert_eq!(POLICY.interlace_for(SourceFormat::Gif), Interlace::Gif);
        assert_eq!(POLICY.interlace_for(SourceFormat::Other), Interlace::None);
    }

    #[test]
    fn policy_is_fixed() {
        assert!(POLICY.is_yuv420());
        assert!(POLICY.strip_metadata);
        assert_eq!(POLICY.quality, 80);
        assert_eq!(POLICY.colorspace.to_string(), "sRGB");
        assert_eq!(POLICY.target.to_string(), "webp");
    }
}
