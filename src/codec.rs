use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageDecoder};
use std::io::Cursor;
use thiserror::Error;
use webp_animation::{EncoderOptions, EncodingConfig, EncodingType, LossyEncodingConfig};

/// Compression effort for single-frame sources (libwebp `method`, 0-6).
pub const STATIC_EFFORT: usize = 4;

/// Compression effort for animated sources, above `STATIC_EFFORT`.
pub const ANIMATED_EFFORT: usize = 5;

/// Browsers play zero-delay GIF frames at this rate.
const ZERO_DELAY_FRAME_MS: i32 = 100;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("animation has no frames")]
    NoFrames,

    #[error("frame {index} is {actual:?}, expected canvas {expected:?}")]
    FrameSize {
        index: usize,
        actual: (u32, u32),
        expected: (u32, u32),
    },

    #[error("webp encoding failed: {0}")]
    Encode(String),
}

/// How the source should be re-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// Effective quality in `1..=100`.
    pub quality: u8,
    /// Keep every frame and its timing.
    pub animated: bool,
}

/// Turns an encoded source image into WebP bytes.
///
/// Implementations are called from the blocking pool and may take as long as
/// the image needs.
pub trait Codec: Send + Sync + 'static {
    fn encode(&self, input: &[u8], settings: EncodeSettings) -> Result<Vec<u8>, CodecError>;
}

/// libwebp-backed codec. Static images go through `webp`, animations through
/// libwebp's animation encoder.
#[derive(Debug, Clone, Copy)]
pub struct WebpCodec {
    pub static_effort: usize,
    pub animated_effort: usize,
}

impl Default for WebpCodec {
    fn default() -> Self {
        Self {
            static_effort: STATIC_EFFORT,
            animated_effort: ANIMATED_EFFORT,
        }
    }
}

impl Codec for WebpCodec {
    fn encode(&self, input: &[u8], settings: EncodeSettings) -> Result<Vec<u8>, CodecError> {
        if settings.animated {
            self.encode_animated(input, settings.quality)
        } else {
            self.encode_static(input, settings.quality)
        }
    }
}

impl WebpCodec {
    fn encode_static(&self, input: &[u8], quality: u8) -> Result<Vec<u8>, CodecError> {
        let image = image::load_from_memory(input)?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut config = webp::WebPConfig::new()
            .map_err(|()| CodecError::Encode("invalid libwebp config".into()))?;
        config.lossless = 0;
        config.quality = f32::from(quality);
        config.method = i32::try_from(self.static_effort).unwrap_or(6).min(6);

        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
        let webp = encoder
            .encode_advanced(&config)
            .map_err(|error| CodecError::Encode(format!("{error:?}")))?;
        Ok(webp.to_vec())
    }

    fn encode_animated(&self, input: &[u8], quality: u8) -> Result<Vec<u8>, CodecError> {
        let decoder = GifDecoder::new(Cursor::new(input))?;
        let canvas = decoder.dimensions();
        let frames = decoder.into_frames().collect_frames()?;
        if frames.is_empty() {
            return Err(CodecError::NoFrames);
        }

        let options = EncoderOptions {
            allow_mixed: true,
            encoding_config: Some(EncodingConfig {
                encoding_type: EncodingType::Lossy(LossyEncodingConfig::default()),
                quality: f32::from(quality),
                method: self.animated_effort,
            }),
            ..Default::default()
        };
        let mut encoder = webp_animation::Encoder::new_with_options(canvas, options)
            .map_err(|error| CodecError::Encode(format!("{error:?}")))?;

        let mut timestamp_ms: i32 = 0;
        for (index, frame) in frames.iter().enumerate() {
            let buffer = frame.buffer();
            if buffer.dimensions() != canvas {
                return Err(CodecError::FrameSize {
                    index,
                    actual: buffer.dimensions(),
                    expected: canvas,
                });
            }

            encoder
                .add_frame(buffer.as_raw(), timestamp_ms)
                .map_err(|error| CodecError::Encode(format!("{error:?}")))?;
            timestamp_ms = timestamp_ms.saturating_add(frame_delay_ms(frame.delay()));
        }

        let webp = encoder
            .finalize(timestamp_ms)
            .map_err(|error| CodecError::Encode(format!("{error:?}")))?;
        Ok(webp.to_vec())
    }
}

/// Frame duration in whole milliseconds; timestamps must strictly increase.
fn frame_delay_ms(delay: image::Delay) -> i32 {
    let (numer, denom) = delay.numer_denom_ms();
    let ms = if denom == 0 { 0 } else { numer / denom };
    match i32::try_from(ms) {
        Ok(0) => ZERO_DELAY_FRAME_MS,
        Ok(ms) => ms,
        Err(_) => i32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, DynamicImage, Frame, ImageFormat, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn gif_bytes(frames: &[(u8, u32)]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            for &(shade, delay_ms) in frames {
                let image = RgbaImage::from_pixel(8, 8, Rgba([shade, 0, 255 - shade, 255]));
                let frame = Frame::from_parts(image, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1));
                encoder.encode_frame(frame).unwrap();
            }
        }
        out
    }

    fn is_webp(bytes: &[u8]) -> bool {
        bytes.len() > 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
    }

    #[test]
    fn test_static_png_encodes_to_webp() {
        let output = WebpCodec::default()
            .encode(
                &png_bytes(16, 16),
                EncodeSettings {
                    quality: 80,
                    animated: false,
                },
            )
            .unwrap();
        assert!(is_webp(&output));
    }

    #[test]
    fn test_animated_gif_encodes_to_animated_webp() {
        let output = WebpCodec::default()
            .encode(
                &gif_bytes(&[(0, 100), (128, 50), (255, 0)]),
                EncodeSettings {
                    quality: 60,
                    animated: true,
                },
            )
            .unwrap();
        assert!(is_webp(&output));
        // Animated WebP files carry an ANIM chunk
        assert!(output.windows(4).any(|chunk| chunk == b"ANIM"));
    }

    #[test]
    fn test_garbage_input_is_decode_error() {
        let codec = WebpCodec::default();
        let static_err = codec
            .encode(
                b"definitely not an image",
                EncodeSettings {
                    quality: 80,
                    animated: false,
                },
            )
            .unwrap_err();
        assert!(matches!(static_err, CodecError::Decode(_)));

        let animated_err = codec
            .encode(
                b"GIF89a but not really",
                EncodeSettings {
                    quality: 80,
                    animated: true,
                },
            )
            .unwrap_err();
        assert!(matches!(animated_err, CodecError::Decode(_)));
    }

    #[test]
    fn test_animated_effort_exceeds_static() {
        let codec = WebpCodec::default();
        assert!(codec.static_effort < codec.animated_effort);
        assert!(codec.animated_effort <= 6);
    }

    #[test]
    fn test_static_effort_range_still_encodes() {
        for static_effort in [0, 6] {
            let codec = WebpCodec {
                static_effort,
                ..Default::default()
            };
            let output = codec
                .encode(
                    &png_bytes(8, 8),
                    EncodeSettings {
                        quality: 50,
                        animated: false,
                    },
                )
                .unwrap();
            assert!(is_webp(&output));
        }
    }

    #[test]
    fn test_frame_delay_ms() {
        assert_eq!(frame_delay_ms(Delay::from_numer_denom_ms(70, 1)), 70);
        assert_eq!(frame_delay_ms(Delay::from_numer_denom_ms(0, 1)), 100);
        assert_eq!(frame_delay_ms(Delay::from_numer_denom_ms(250, 2)), 125);
    }
}
