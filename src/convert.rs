use crate::AppState;
use crate::codec::EncodeSettings;
use crate::error::ConvertError;
use axum::extract::Multipart;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use tracing::{debug, info, warn};

pub const IMAGE_FIELD: &str = "image";
pub const QUALITY_FIELD: &str = "quality";
/// The only declared type that takes the animation-preserving path.
pub const ANIMATED_MEDIA_TYPE: &str = "image/gif";
pub const DATA_URL_PREFIX: &str = "data:image/webp;base64,";

/// Effective encoding quality, always in `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub const DEFAULT: Quality = Quality(80);
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Quality)
    }

    /// Read the `quality` form value. Bad input is replaced by the default,
    /// never rejected.
    pub fn from_field(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
            return Self::DEFAULT;
        };

        match parse_leading_int(raw).and_then(Self::new) {
            Some(quality) => quality,
            None => {
                warn!(
                    raw,
                    default = Self::DEFAULT.0,
                    "Invalid quality, using default"
                );
                Self::DEFAULT
            }
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Leading-integer parse: optional whitespace and sign, then digits; trailing
/// text is ignored. `None` when no digit is found.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }

    // Overflow only happens far outside 1..=100, saturate and let `Quality::new` reject
    let magnitude = rest[..digits].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// The `image` part of the form
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub media_type: String,
    pub bytes: Bytes,
}

/// Raw form values, before validation
#[derive(Debug, Default)]
pub struct ConversionForm {
    pub image: Option<ImagePart>,
    pub quality: Option<String>,
}

impl ConversionForm {
    /// Collect the first `image` and `quality` parts. The body of a non-image
    /// file is never buffered.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ConvertError> {
        let mut form = ConversionForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(IMAGE_FIELD) if form.image.is_none() => {
                    let media_type = field.content_type().unwrap_or_default().to_string();
                    let bytes = if is_image_type(&media_type) {
                        field.bytes().await?
                    } else {
                        Bytes::new()
                    };
                    debug!(%media_type, size = bytes.len(), "Read image part");
                    form.image = Some(ImagePart { media_type, bytes });
                }
                Some(QUALITY_FIELD) if form.quality.is_none() => {
                    form.quality = Some(field.text().await?);
                }
                name => debug!(?name, "Ignoring form part"),
            }
        }

        Ok(form)
    }
}

fn is_image_type(media_type: &str) -> bool {
    media_type.starts_with("image/")
}

/// A validated conversion request
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub image_bytes: Bytes,
    pub declared_media_type: String,
    pub quality: Quality,
}

impl TryFrom<ConversionForm> for ConversionRequest {
    type Error = ConvertError;

    fn try_from(form: ConversionForm) -> Result<Self, Self::Error> {
        let quality = Quality::from_field(form.quality.as_deref());

        let Some(image) = form.image else {
            return Err(ConvertError::MissingFile);
        };

        if !is_image_type(&image.media_type) {
            return Err(ConvertError::UnsupportedType(image.media_type));
        }

        Ok(Self {
            image_bytes: image.bytes,
            declared_media_type: image.media_type,
            quality,
        })
    }
}

impl ConversionRequest {
    pub fn is_animated(&self) -> bool {
        self.declared_media_type == ANIMATED_MEDIA_TYPE
    }

    fn settings(&self) -> EncodeSettings {
        EncodeSettings {
            quality: self.quality.get(),
            animated: self.is_animated(),
        }
    }
}

/// Outcome of one conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub encoded: Vec<u8>,
    pub original_size: usize,
    pub quality: Quality,
    pub is_animated: bool,
}

impl ConversionResult {
    pub fn webp_size(&self) -> usize {
        self.encoded.len()
    }

    pub fn size_reduction(&self) -> f64 {
        size_reduction(self.original_size, self.webp_size())
    }

    pub fn data_url(&self) -> String {
        webp_data_url(&self.encoded)
    }
}

/// Percentage saved, rounded to two decimals (half rounds up). Negative when
/// the output grew; 0 for an empty original.
pub fn size_reduction(original: usize, encoded: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let percent = (original as f64 - encoded as f64) / original as f64 * 100.0;
    (percent * 100.0 + 0.5).floor() / 100.0
}

pub fn webp_data_url(encoded: &[u8]) -> String {
    format!("{DATA_URL_PREFIX}{}", BASE64_STANDARD.encode(encoded))
}

/// Run the codec for a validated request.
///
/// Waits for an encoder permit, then encodes on the blocking pool. The permit
/// is released when encoding finishes, even if the caller has gone away.
pub async fn convert(
    state: &AppState,
    request: ConversionRequest,
) -> Result<ConversionResult, ConvertError> {
    let original_size = request.image_bytes.len();
    if original_size == 0 {
        return Err(ConvertError::EmptyFile);
    }

    let settings = request.settings();
    let permit = state.encoder_permits.clone().acquire_owned().await?;

    let codec = state.codec.clone();
    let input = request.image_bytes;
    // Held by the blocking task so the limit holds after the caller disconnects
    let encoded = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        codec.encode(&input, settings)
    })
    .await??;

    let result = ConversionResult {
        encoded,
        original_size,
        quality: request.quality,
        is_animated: settings.animated,
    };

    info!(
        media_type = %request.declared_media_type,
        original_size,
        webp_size = result.webp_size(),
        quality = settings.quality,
        animated = settings.animated,
        "Image converted"
    );

    Ok(result)
}
