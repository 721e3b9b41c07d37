//! Byte encoding of persistent forms.
//!
//! The session never interprets asset blobs itself. A [`Serializer`] turns a
//! captured [`PersistentForm`] into bytes and back; an object's private
//! custom data is appended after the form and its offset is recorded in the
//! asset metadata so a loader can split the two.

use atlas_types::{PersistentForm, TypeTag};

use crate::error::{SessionError, SessionResult};

/// An encoded asset blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Start of the custom data tail, `None` when there is none.
    pub custom_data_offset: Option<u64>,
}

/// A decoded asset blob.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub form: PersistentForm,
    pub custom_data: Option<Vec<u8>>,
}

pub trait Serializer: Send + Sync {
    fn serialize(&self, form: &PersistentForm, custom_data: Option<&[u8]>) -> SessionResult<Encoded>;

    /// Decode `bytes`, checking that the root record has type `expected`.
    fn deserialize(&self, bytes: &[u8], custom_data_offset: Option<u64>, expected: TypeTag) -> SessionResult<Decoded>;
}

/// Reference serializer: bincode form followed by the raw custom data.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize(&self, form: &PersistentForm, custom_data: Option<&[u8]>) -> SessionResult<Encoded> {
        let mut bytes = bincode::serialize(form).map_err(|e| SessionError::Serialization(e.to_string()))?;
        let custom_data_offset = custom_data.map(|tail| {
            let offset = bytes.len() as u64;
            bytes.extend_from_slice(tail);
            offset
        });
        Ok(Encoded {
            bytes,
            custom_data_offset,
        })
    }

    fn deserialize(&self, bytes: &[u8], custom_data_offset: Option<u64>, expected: TypeTag) -> SessionResult<Decoded> {
        let (head, custom_data) = match custom_data_offset {
            Some(offset) => {
                let offset = usize::try_from(offset)
                    .ok()
                    .filter(|o| *o <= bytes.len())
                    .ok_or_else(|| {
                        SessionError::Serialization(format!(
                            "custom data offset {offset} past end of {}-byte blob",
                            bytes.len()
                        ))
                    })?;
                (&bytes[..offset], Some(bytes[offset..].to_vec()))
            }
            None => (bytes, None),
        };
        let form: PersistentForm =
            bincode::deserialize(head).map_err(|e| SessionError::Serialization(e.to_string()))?;
        if form.root().type_tag != expected {
            return Err(SessionError::Serialization(format!(
                "blob holds {} but metadata says {expected}",
                form.root().type_tag
            )));
        }
        Ok(Decoded { form, custom_data })
    }
}
