use bytes::Bytes;
use futures::channel::oneshot;
use image::{load_from_memory, DynamicImage};
use squash_webp::{Encoder, EncoderConfig};

use crate::processor::policy::{Interlace, OptimizationPolicy, SourceFormat, TargetFormat};

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),
}

#[derive(Debug)]
pub struct TranscodedImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub source: SourceFormat,
    pub interlace: Interlace,
}

/// Re-encodes the given image following the policy.
///
/// WebP has no interlaced layout so the selected scheme is only carried
/// on the result, the encoder itself never sees it.
pub fn transcode(
    data: &[u8],
    source: SourceFormat,
    policy: &OptimizationPolicy,
) -> Result<TranscodedImage, TranscodeError> {
    let img = load_from_memory(data).map_err(|e| TranscodeError::Decode(e.to_string()))?;

    // Lossy VP8 is always 4:2:0, there is no way to honour anything else.
    if !policy.is_yuv420() {
        return Err(TranscodeError::Encode(format!(
            "unsupported chroma subsampling {:?}",
            policy.sampling_factors,
        )));
    }

    // Only decoded pixels are carried forward which drops every bit of
    // metadata the source had.
    if !policy.strip_metadata {
        return Err(TranscodeError::Encode(
            "metadata passthrough is not supported".to_string(),
        ));
    }

    let pixels = to_srgb8(img);
    let (width, height) = (pixels.width(), pixels.height());

    let interlace = policy.interlace_for(source);

    let buff = match policy.target {
        TargetFormat::WebP => {
            let cfg = EncoderConfig::lossy(policy.quality as f32);
            Encoder::from_image(&pixels)
                .and_then(|encoder| encoder.encode(&cfg))
                .map_err(|e| TranscodeError::Encode(e.to_string()))?
        },
    };

    Ok(TranscodedImage {
        data: Bytes::from(buff),
        width,
        height,
        source,
        interlace,
    })
}

/// Runs `transcode` on the rayon pool so the runtime is never blocked
/// by an encode.
pub async fn spawn_transcode(
    data: Bytes,
    source: SourceFormat,
    policy: &'static OptimizationPolicy,
) -> Result<TranscodedImage, TranscodeError> {
    let (tx, rx) = oneshot::channel();

    rayon::spawn(move || {
        let result = transcode(&data, source, policy);
        if tx.send(result).is_err() {
            warn!("Transcode finished after the request was dropped");
        }
    });

    rx.await.map_err(|_| {
        TranscodeError::Encode("transcode worker exited before producing a result".to_string())
    })?
}

/// Normalises the decoded image into 8-bit sRGB, keeping alpha only
/// when the source had it.
fn to_srgb8(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}
