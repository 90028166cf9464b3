use std::fmt;

use bytes::Bytes;
use serde::de::IntoDeserializer;
use serde::ser::{Impossible, Serialize, Serializer};

use super::{Codec, CodecError, Destination};

/// Plain text bodies, and the fallback for unrecognized content types.
///
/// Marshalling never fails: strings are written verbatim, numbers in their
/// shortest decimal form without an exponent, `true` as `1` and `false` as
/// empty. Any other value encodes to an empty body. Unmarshalling yields the
/// body as a (lossily decoded) string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Bytes, CodecError> {
        let text = match Serialize::serialize(value, Scalar) {
            Ok(text) => text,
            Err(NoText) => {
                tracing::trace!("value has no text form");
                String::new()
            }
        };
        Ok(text.into())
    }

    fn unmarshal(
        &self,
        data: &[u8],
        destination: &mut dyn Destination,
    ) -> Result<(), CodecError> {
        let text = String::from_utf8_lossy(data).into_owned();
        let deserializer: serde::de::value::StringDeserializer<erased_serde::Error> =
            text.into_deserializer();
        destination.fill(&mut <dyn erased_serde::Deserializer>::erase(deserializer))?;
        Ok(())
    }
}

#[derive(Debug)]
struct NoText;

impl fmt::Display for NoText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("value has no text form")
    }
}

impl std::error::Error for NoText {}

impl serde::ser::Error for NoText {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        NoText
    }
}

/// Renders a single scalar value as text.
struct Scalar;

macro_rules! display {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<String, NoText> {
                Ok(v.to_string())
            }
        )*
    };
}

impl Serializer for Scalar {
    type Ok = String;
    type Error = NoText;

    type SerializeSeq = Impossible<String, NoText>;
    type SerializeTuple = Impossible<String, NoText>;
    type SerializeTupleStruct = Impossible<String, NoText>;
    type SerializeTupleVariant = Impossible<String, NoText>;
    type SerializeMap = Impossible<String, NoText>;
    type SerializeStruct = Impossible<String, NoText>;
    type SerializeStructVariant = Impossible<String, NoText>;

    display! {
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
        serialize_f32: f32,
        serialize_f64: f64,
        serialize_char: char,
    }

    fn serialize_bool(self, v: bool) -> Result<String, NoText> {
        Ok(if v { "1" } else { "" }.to_owned())
    }

    fn serialize_str(self, v: &str) -> Result<String, NoText> {
        Ok(v.to_owned())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, NoText> {
        Err(NoText)
    }

    fn serialize_none(self) -> Result<String, NoText> {
        Err(NoText)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<String, NoText> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String, NoText> {
        Err(NoText)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, NoText> {
        Err(NoText)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, NoText> {
        Ok(variant.to_owned())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, NoText> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, NoText> {
        Err(NoText)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, NoText> {
        Err(NoText)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, NoText> {
        Err(NoText)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, NoText> {
        Err(NoText)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, NoText> {
        Err(NoText)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, NoText> {
        Err(NoText)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, NoText> {
        Err(NoText)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, NoText> {
        Err(NoText)
    }
}
