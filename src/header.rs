//! Parsing for the `Content-Type` header.

use std::fmt;
use std::str::FromStr;

/// Media type used when none is declared.
pub const DEFAULT_MEDIA_TYPE: &str = "text/plain";

/// Charset used when none is declared.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// A parsed `Content-Type` value.
///
/// Parsing is lenient: an empty or missing media type falls back to
/// `text/plain`, and unknown parameters are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    media_type: String,
    charset: String,
    boundary: Option<String>,
}

impl ContentType {
    /// Parse a raw header value, e.g. `application/json; charset=utf-8`.
    pub fn parse(raw: &str) -> Self {
        let mut content_type = Self::default();
        let mut segments = raw.trim().split(';').map(str::trim);

        if let Some(media_type) = segments.next().filter(|segment| !segment.is_empty()) {
            content_type.media_type = media_type.to_ascii_lowercase();
        }

        for segment in segments {
            let Some((name, value)) = segment.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            if value.is_empty() {
                continue;
            }

            match name.trim().to_ascii_lowercase().as_str() {
                "charset" => content_type.charset = value.to_ascii_lowercase(),
                "boundary" => content_type.boundary = Some(value.to_owned()),
                _ => {}
            }
        }

        content_type
    }

    /// The media type, lowercased (`application/json`).
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The charset parameter.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// The multipart boundary parameter, if present.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            media_type: DEFAULT_MEDIA_TYPE.to_owned(),
            charset: DEFAULT_CHARSET.to_owned(),
            boundary: None,
        }
    }
}

impl FromStr for ContentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ContentType::parse(s))
    }
}

impl From<&str> for ContentType {
    fn from(value: &str) -> Self {
        ContentType::parse(value)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media_type)?;
        if !self.charset.is_empty() {
            write!(f, "; charset={}", self.charset)?;
        }
        if let Some(boundary) = &self.boundary {
            write!(f, "; boundary={boundary}")?;
        }
        Ok(())
    }
}
