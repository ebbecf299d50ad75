//! Serialization registry.
//!
//! Every payload that crosses the storage or broker boundary (events,
//! snapshots, integration messages) is stored as opaque bytes keyed by a
//! stable type name. The registry maps that name to an encode/decode pair.
//! It is assembled once at startup through [`RegistryBuilder`] and is
//! immutable afterwards; share it with `Arc<Registry>`.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DomainError;

/// A decoded, type-erased payload.
pub type Payload = Box<dyn Any + Send + Sync>;

type EncodeFn = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<Vec<u8>, DomainError> + Send + Sync>;
type DecodeFn = Box<dyn Fn(&[u8]) -> Result<Payload, DomainError> + Send + Sync>;

struct Codec {
    type_id: TypeId,
    type_name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

/// Collects registrations before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    codecs: HashMap<String, Codec>,
    duplicates: Vec<String>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `name` with explicit encode/decode functions.
    #[must_use]
    pub fn register<T, E, D>(mut self, name: &str, encode: E, decode: D) -> Self
    where
        T: Any + Send + Sync,
        E: Fn(&T) -> Result<Vec<u8>, String> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<T, String> + Send + Sync + 'static,
    {
        if self.codecs.contains_key(name) {
            self.duplicates.push(name.to_owned());
            return self;
        }

        let key = name.to_owned();
        let encode_key = key.clone();
        let decode_key = key.clone();
        let codec = Codec {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            encode: Box::new(move |value| {
                let value = value.downcast_ref::<T>().ok_or_else(|| {
                    DomainError::Serialization(format!(
                        "`{encode_key}` is registered for {}, got a different type",
                        type_name::<T>()
                    ))
                })?;
                encode(value).map_err(|e| {
                    DomainError::Serialization(format!("encoding `{encode_key}` failed: {e}"))
                })
            }),
            decode: Box::new(move |bytes| {
                let value = decode(bytes).map_err(|e| {
                    DomainError::Serialization(format!("decoding `{decode_key}` failed: {e}"))
                })?;
                Ok(Box::new(value) as Payload)
            }),
        };
        self.codecs.insert(key, codec);
        self
    }

    /// Registers `T` under `name` using JSON encoding.
    #[must_use]
    pub fn register_json<T>(self, name: &str) -> Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        self.register::<T, _, _>(
            name,
            |value| serde_json::to_vec(value).map_err(|e| e.to_string()),
            |bytes| serde_json::from_slice(bytes).map_err(|e| e.to_string()),
        )
    }

    /// Freezes the registrations.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if any name was registered twice.
    pub fn build(self) -> Result<Registry, DomainError> {
        if !self.duplicates.is_empty() {
            return Err(DomainError::Serialization(format!(
                "duplicate registry keys: {}",
                self.duplicates.join(", ")
            )));
        }
        Ok(Registry {
            codecs: self.codecs,
        })
    }
}

/// Immutable name to codec mapping.
pub struct Registry {
    codecs: HashMap<String, Codec>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<(&str, &str)> = self
            .codecs
            .iter()
            .map(|(k, c)| (k.as_str(), c.type_name))
            .collect();
        keys.sort_unstable();
        f.debug_struct("Registry").field("codecs", &keys).finish()
    }
}

impl Registry {
    /// Returns true if `name` has a codec.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    /// Encodes `value` with the codec registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` for an unknown name, a value of the
    /// wrong type, or an encoder failure.
    pub fn serialize(&self, name: &str, value: &(dyn Any + Send + Sync)) -> Result<Vec<u8>, DomainError> {
        let codec = self.codec(name)?;
        (codec.encode)(value)
    }

    /// Decodes `bytes` with the codec registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` for an unknown name or malformed bytes.
    pub fn deserialize(&self, name: &str, bytes: &[u8]) -> Result<Payload, DomainError> {
        let codec = self.codec(name)?;
        (codec.decode)(bytes)
    }

    /// Decodes `bytes` and downcasts the result to `T`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if decoding fails or if `name` is
    /// registered for a type other than `T`.
    pub fn deserialize_as<T: Any>(&self, name: &str, bytes: &[u8]) -> Result<T, DomainError> {
        let codec = self.codec(name)?;
        if codec.type_id != TypeId::of::<T>() {
            return Err(DomainError::Serialization(format!(
                "`{name}` decodes to {}, not {}",
                codec.type_name,
                type_name::<T>()
            )));
        }
        let payload = (codec.decode)(bytes)?;
        payload
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| DomainError::Serialization(format!("`{name}` downcast failed")))
    }

    fn codec(&self, name: &str) -> Result<&Codec, DomainError> {
        self.codecs
            .get(name)
            .ok_or_else(|| DomainError::Serialization(format!("no codec registered for `{name}`")))
    }
}
