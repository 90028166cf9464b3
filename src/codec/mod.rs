//! Content-negotiated body codecs.
//!
//! A [`Codec`] turns a value into bytes and back. Codecs are registered under a
//! short alias (`json`, `xml`, ...) together with the MIME types they handle,
//! and are looked up by MIME type when a request body is encoded or a response
//! body decoded. Lookups never fail: anything unrecognized falls back to the
//! [`TextCodec`].
//!
//! The process-wide registry starts out with the built-in codecs:
//!
//! | alias  | MIME types |
//! |--------|------------|
//! | `json` | `application/json`, `application/javascript`, `application/ld+json` |
//! | `xml`  | `application/xml` |
//! | `form` | `application/x-www-form-urlencoded` |
//! | `text` | `text/plain`, `text/css`, `text/csv`, `text/javascript`, `text/xml` |
//!
//! Register additional codecs at startup with [`register`]. The registry is
//! meant to be written during initialization and read afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

mod form;
mod json;
mod text;
mod xml;

pub use self::form::FormCodec;
pub use self::json::JsonCodec;
pub use self::text::TextCodec;
pub use self::xml::XmlCodec;

/// Alias of the fallback codec.
pub const TEXT: &str = "text";

/// Error produced by a codec.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// JSON encoding or syntax error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// XML encoding error.
    #[error("xml: {0}")]
    XmlEncode(#[from] quick_xml::se::SeError),

    /// XML syntax error.
    #[error("xml: {0}")]
    XmlDecode(#[from] quick_xml::de::DeError),

    /// The value cannot be represented as form data.
    #[error("form: {0}")]
    Form(String),

    /// The body is not valid UTF-8 for a text based format.
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The decoded data does not fit the destination type.
    #[error("decode: {0}")]
    Decode(#[from] erased_serde::Error),

    /// The codec returned without filling the destination.
    #[error("codec produced no value")]
    Empty,
}

/// A type-erased slot which a codec decodes into.
///
/// Codecs hand the destination a deserializer for their format; the
/// destination drives it to build its own concrete type.
pub trait Destination {
    /// Build the destination value from `deserializer`.
    fn fill(
        &mut self,
        deserializer: &mut dyn erased_serde::Deserializer<'_>,
    ) -> Result<(), erased_serde::Error>;
}

/// Destination which stores a decoded `T`.
#[derive(Debug)]
pub struct Slot<T>(Option<T>);

impl<T> Slot<T> {
    /// An empty slot.
    pub fn new() -> Self {
        Self(None)
    }

    /// Take the decoded value, if a codec filled the slot.
    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Destination for Slot<T> {
    fn fill(
        &mut self,
        deserializer: &mut dyn erased_serde::Deserializer<'_>,
    ) -> Result<(), erased_serde::Error> {
        self.0 = Some(erased_serde::deserialize(deserializer)?);
        Ok(())
    }
}

/// A body marshal/unmarshal strategy.
///
/// Codecs are stateless and shared between concurrent requests.
pub trait Codec: fmt::Debug + Send + Sync + 'static {
    /// Encode `value` into body bytes.
    fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Bytes, CodecError>;

    /// Decode `data` into `destination`.
    fn unmarshal(&self, data: &[u8], destination: &mut dyn Destination)
        -> Result<(), CodecError>;
}

/// Lowercase and trim a MIME string, dropping any parameters.
fn normalize(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// A table of codecs keyed by alias, and of aliases keyed by MIME type.
#[derive(Debug, Clone)]
pub struct Registry {
    codecs: HashMap<String, Arc<dyn Codec>>,
    aliases: HashMap<String, String>,
}

impl Registry {
    /// A registry with no codecs. Every lookup falls back to [`TextCodec`].
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Register `codec` under `alias`, mapping each of `content_types` to it.
    ///
    /// An existing codec for the alias, or alias for a content type, is replaced.
    pub fn register<C>(&mut self, alias: &str, content_types: &[&str], codec: C)
    where
        C: Codec,
    {
        let alias = alias.trim().to_ascii_lowercase();
        for content_type in content_types {
            self.aliases.insert(normalize(content_type), alias.clone());
        }

        tracing::trace!(%alias, ?content_types, "registered codec");
        self.codecs.insert(alias, Arc::new(codec));
    }

    /// The alias registered for `content_type`, if any.
    pub fn alias(&self, content_type: &str) -> Option<&str> {
        self.aliases.get(&normalize(content_type)).map(String::as_str)
    }

    /// Find the codec for `content_type`, falling back to the text codec.
    pub fn resolve(&self, content_type: &str) -> Arc<dyn Codec> {
        self.alias(content_type)
            .and_then(|alias| self.codecs.get(alias))
            .or_else(|| self.codecs.get(TEXT))
            .cloned()
            .unwrap_or_else(|| Arc::new(TextCodec))
    }

    /// Encode `value` with the codec for `content_type`.
    pub fn marshal<T>(&self, content_type: &str, value: &T) -> Result<Bytes, CodecError>
    where
        T: Serialize,
    {
        self.resolve(content_type).marshal(value)
    }

    /// Decode `data` into a `T` with the codec for `content_type`.
    pub fn unmarshal<T>(&self, content_type: &str, data: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        let mut slot = Slot::new();
        self.resolve(content_type).unmarshal(data, &mut slot)?;
        slot.into_inner().ok_or(CodecError::Empty)
    }
}

impl Default for Registry {
    /// A registry holding the built-in codecs.
    fn default() -> Self {
        let mut registry = Registry::empty();
        registry.register(
            TEXT,
            &[
                "text/plain",
                "text/css",
                "text/csv",
                "text/javascript",
                "text/xml",
            ],
            TextCodec,
        );
        registry.register(
            "json",
            &[
                "application/json",
                "application/javascript",
                "application/ld+json",
            ],
            JsonCodec,
        );
        registry.register("xml", &["application/xml"], XmlCodec);
        registry.register("form", &["application/x-www-form-urlencoded"], FormCodec);
        registry
    }
}

fn global() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// Register a codec in the process-wide registry.
pub fn register<C>(alias: &str, content_types: &[&str], codec: C)
where
    C: Codec,
{
    global().write().register(alias, content_types, codec)
}

/// Find the process-wide codec for `content_type`, falling back to text.
pub fn resolve(content_type: &str) -> Arc<dyn Codec> {
    global().read().resolve(content_type)
}

/// Encode `value` with the process-wide codec for `content_type`.
pub fn marshal<T>(content_type: &str, value: &T) -> Result<Bytes, CodecError>
where
    T: Serialize,
{
    resolve(content_type).marshal(value)
}

/// Decode `data` with the process-wide codec for `content_type`.
pub fn unmarshal<T>(content_type: &str, data: &[u8]) -> Result<T, CodecError>
where
    T: DeserializeOwned,
{
    let mut slot = Slot::new();
    resolve(content_type).unmarshal(data, &mut slot)?;
    slot.into_inner().ok_or(CodecError::Empty)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        count: u32,
        tags: Vec<String>,
    }

    fn item() -> Item {
        Item {
            name: "widget".into(),
            count: 3,
            tags: vec!["a".into(), "b".into()],
        }
    }

    #[test]
    fn resolve_normalizes_mime_strings() {
        let registry = Registry::default();
        assert_eq!(registry.alias("Application/JSON"), Some("json"));
        assert_eq!(registry.alias("  application/json ; charset=utf-8"), Some("json"));
        assert_eq!(registry.alias("application/x-www-form-urlencoded"), Some("form"));
        assert_eq!(registry.alias("text/xml"), Some("text"));
    }

    #[test]
    fn resolve_falls_back_to_text() {
        let registry = Registry::default();
        for content_type in ["", "image/png", ";;;", "not a mime type"] {
            let data = registry
                .marshal(content_type, &42u8)
                .expect("text codec never fails");
            assert_eq!(&*data, b"42", "content type {content_type:?}");
        }

        let empty = Registry::empty();
        let data = empty.marshal("application/json", &"raw").unwrap();
        assert_eq!(&*data, b"raw");
    }

    #[test]
    fn register_overwrites_alias_and_codec() {
        let mut registry = Registry::default();
        registry.register("json", &["text/plain"], JsonCodec);
        assert_eq!(registry.alias("text/plain"), Some("json"));

        let data = registry.marshal("text/plain", &"quoted").unwrap();
        assert_eq!(&*data, b"\"quoted\"");
    }

    #[test]
    fn json_round_trip() {
        let registry = Registry::default();
        let data = registry.marshal("application/json", &item()).unwrap();
        let decoded: Item = registry.unmarshal("application/json", &data).unwrap();
        assert_eq!(decoded, item());
    }

    #[test]
    fn xml_round_trip() {
        let registry = Registry::default();
        let data = registry.marshal("application/xml", &item()).unwrap();
        let decoded: Item = registry.unmarshal("application/xml", &data).unwrap();
        assert_eq!(decoded, item());
    }

    #[test]
    fn form_round_trip() {
        let registry = Registry::default();
        let mut form = BTreeMap::new();
        form.insert("a".to_owned(), vec!["1".to_owned(), "2".to_owned()]);
        form.insert("b".to_owned(), vec!["x y".to_owned()]);

        let data = registry
            .marshal("application/x-www-form-urlencoded", &form)
            .unwrap();
        assert_eq!(&*data, b"a=1&a=2&b=x+y");

        let decoded: BTreeMap<String, Vec<String>> = registry
            .unmarshal("application/x-www-form-urlencoded", &data)
            .unwrap();
        assert_eq!(decoded, form);
    }

    #[test]
    fn unmarshal_reports_shape_mismatch() {
        let registry = Registry::default();
        let result: Result<Item, _> = registry.unmarshal("application/json", b"[1, 2, 3]");
        assert!(result.is_err());

        let result: Result<Item, _> = registry.unmarshal("application/json", b"{not json");
        assert!(result.is_err());
    }

    #[test]
    fn global_registry_has_builtins() {
        let data = marshal("application/ld+json", &vec![1, 2]).unwrap();
        assert_eq!(&*data, b"[1,2]");

        let decoded: Vec<u8> = unmarshal("application/json", &data).unwrap();
        assert_eq!(decoded, vec![1, 2]);
    }
}
