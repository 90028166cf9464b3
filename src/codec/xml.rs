use bytes::Bytes;

use super::{Codec, CodecError, Destination};

/// Root element name for values which don't carry their own (maps, sequences).
const ROOT: &str = "xml";

/// `application/xml` bodies, via `quick-xml`.
///
/// Structs are written with their type name as the root element. Values
/// without a natural root name are wrapped in `<xml>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl Codec for XmlCodec {
    fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Bytes, CodecError> {
        let document = match quick_xml::se::to_string(value) {
            Ok(document) => document,
            Err(error) => {
                tracing::trace!(%error, "no root element name, wrapping in <{ROOT}>");
                quick_xml::se::to_string_with_root(ROOT, value)?
            }
        };
        Ok(document.into())
    }

    fn unmarshal(
        &self,
        data: &[u8],
        destination: &mut dyn Destination,
    ) -> Result<(), CodecError> {
        let document = std::str::from_utf8(data)?;
        let mut deserializer = quick_xml::de::Deserializer::from_str(document);
        destination.fill(&mut <dyn erased_serde::Deserializer>::erase(&mut deserializer))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use crate::codec::Slot;

    use super::*;

    #[derive(Debug, PartialEq, Deserialize, serde::Serialize)]
    struct Note {
        to: String,
        body: String,
    }

    #[test]
    fn marshal_uses_type_name_as_root() {
        let data = XmlCodec
            .marshal(&Note {
                to: "tove".into(),
                body: "hello".into(),
            })
            .unwrap();
        assert_eq!(&*data, b"<Note><to>tove</to><body>hello</body></Note>");
    }

    #[test]
    fn unmarshal_document() {
        let mut slot: Slot<Note> = Slot::new();
        XmlCodec
            .unmarshal(
                b"<note><to>jani</to><body>reminder</body></note>",
                &mut slot,
            )
            .unwrap();
        assert_eq!(
            slot.into_inner().unwrap(),
            Note {
                to: "jani".into(),
                body: "reminder".into()
            }
        );
    }

    #[test]
    fn unmarshal_rejects_invalid_utf8() {
        let mut slot: Slot<Note> = Slot::new();
        let result = XmlCodec.unmarshal(&[0x3c, 0xff, 0xfe], &mut slot);
        assert!(matches!(result, Err(CodecError::Utf8(_))));
    }
}
