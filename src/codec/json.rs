use bytes::Bytes;

use super::{Codec, CodecError, Destination};

/// `application/json` bodies, via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Bytes, CodecError> {
        Ok(serde_json::to_vec(value)?.into())
    }

    fn unmarshal(
        &self,
        data: &[u8],
        destination: &mut dyn Destination,
    ) -> Result<(), CodecError> {
        let mut deserializer = serde_json::Deserializer::from_slice(data);
        destination.fill(&mut <dyn erased_serde::Deserializer>::erase(&mut deserializer))?;
        deserializer.end()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::codec::Slot;

    use super::*;

    #[test]
    fn marshal_struct() {
        #[derive(serde::Serialize)]
        struct Login<'a> {
            user: &'a str,
            remember: bool,
        }

        let data = JsonCodec
            .marshal(&Login {
                user: "ada",
                remember: true,
            })
            .unwrap();
        assert_eq!(&*data, br#"{"user":"ada","remember":true}"#);
    }

    #[test]
    fn unmarshal_rejects_trailing_data() {
        let mut slot: Slot<BTreeMap<String, u32>> = Slot::new();
        let result = JsonCodec.unmarshal(br#"{"a": 1} {"b": 2}"#, &mut slot);
        assert!(matches!(result, Err(CodecError::Json(_))));
    }

    #[test]
    fn unmarshal_into_slot() {
        let mut slot: Slot<BTreeMap<String, Vec<String>>> = Slot::new();
        JsonCodec
            .unmarshal(br#"{"a": ["1"], "b": ["2", "3"]}"#, &mut slot)
            .unwrap();

        let map = slot.into_inner().unwrap();
        assert_eq!(map["b"], ["2", "3"]);
    }
}
