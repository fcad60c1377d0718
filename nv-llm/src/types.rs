use serde::{Deserialize, Serialize};

/// One prompt→text request. The prompt is sent as a single user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Raw image bytes plus the media type the provider should be told.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    pub fn base64(&self) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Media type for an image file extension. Unknown extensions fall back to JPEG.
pub fn media_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_defaults_to_jpeg() {
        assert_eq!(media_type_for_extension("PNG"), "image/png");
        assert_eq!(media_type_for_extension("jpg"), "image/jpeg");
        assert_eq!(media_type_for_extension("tiff"), "image/jpeg");
    }

    #[test]
    fn image_base64_is_standard_alphabet() {
        let image = ImageInput::new(vec![0xfb, 0xff], "image/png");
        assert_eq!(image.base64(), "+/8=");
    }
}
