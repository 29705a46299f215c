use image::ImageFormat;

/// Image formats artifacts are stored as.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
}

impl ImageKind {
    /// Magic bytes win over the declared content type; PNG if neither says anything.
    pub fn detect(content_type: Option<&str>, first_bytes: &[u8]) -> Self {
        Self::from_magic(first_bytes)
            .or_else(|| content_type.and_then(Self::from_content_type))
            .unwrap_or(ImageKind::Png)
    }

    /// Formats other than the three stored kinds count as unknown.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        image::guess_format(bytes).ok().and_then(Self::from_format)
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
        if essence == "image/jpg" {
            return Some(ImageKind::Jpeg);
        }
        ImageFormat::from_mime_type(&essence).and_then(Self::from_format)
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::WebP => Some(ImageKind::Webp),
            _ => None,
        }
    }

    fn format(&self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Webp => ImageFormat::WebP,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            _ => self.format().extensions_str()[0],
        }
    }

    pub fn mime(&self) -> &'static str {
        self.format().to_mime_type()
    }
}
