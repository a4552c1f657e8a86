//! Registry of resource variants
//!
//! Maps a kind ("sysctl") to a decoder that builds a resource from its
//! name and the fields of a definition table. Build it once at startup
//! with [`RegistryBuilder`]; a built [`Registry`] is read-only.

use crate::error::{Error, Result};
use crate::resource::BoxedResource;
use std::collections::BTreeMap;
use std::fmt;

/// Builds a resource from its name and its definition fields.
///
/// Decoders start from the variant's defaults and overlay the fields
/// present in the table.
pub type Decoder = fn(name: &str, fields: toml::Table) -> Result<BoxedResource>;

/// Read-only map from kind to decoder
pub struct Registry {
    decoders: BTreeMap<&'static str, Decoder>,
}

/// Collects variants before freezing them into a [`Registry`]
#[derive(Default)]
pub struct RegistryBuilder {
    decoders: BTreeMap<&'static str, Decoder>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variant. Registering a kind twice is a programming error
    /// and keeps the first decoder.
    pub fn register(mut self, kind: &'static str, decoder: Decoder) -> Self {
        if self.decoders.contains_key(kind) {
            log::warn!("resource kind '{kind}' registered twice, keeping the first");
        } else {
            self.decoders.insert(kind, decoder);
        }
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            decoders: self.decoders,
        }
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Whether a kind is registered
    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Build a resource of `kind` from a definition table.
    pub fn decode(&self, kind: &str, name: &str, fields: toml::Table) -> Result<BoxedResource> {
        let decoder = self
            .decoders
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))?;
        decoder(name, fields)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.decoders.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::Scripted;

    fn decode_scripted(name: &str, mut fields: toml::Table) -> Result<BoxedResource> {
        let value = match fields.remove("value") {
            Some(toml::Value::String(s)) => s,
            _ => return Err(Error::invalid("scripted", name, "value is empty")),
        };
        Ok(Box::new(Scripted::new(name, &value, "")))
    }

    #[test]
    fn test_decode_registered_kind() {
        let registry = Registry::builder()
            .register("scripted", decode_scripted)
            .build();

        let mut fields = toml::Table::new();
        fields.insert("value".into(), toml::Value::String("1".into()));

        let res = registry.decode("scripted", "a", fields).unwrap();
        assert_eq!(res.name(), "a");
        assert!(registry.contains("scripted"));
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["scripted"]);
    }

    #[test]
    fn test_unknown_kind() {
        let registry = Registry::builder().build();
        let err = registry
            .decode("file", "a", toml::Table::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKind(k) if k == "file"));
    }

    #[test]
    fn test_decoder_errors_propagate() {
        let registry = Registry::builder()
            .register("scripted", decode_scripted)
            .build();
        let err = registry
            .decode("scripted", "a", toml::Table::new())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidDefinition);
    }
}
