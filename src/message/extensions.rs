//! Extension registry
//!
//! Extensions are auxiliary typed field-sets identified by a type URI,
//! attached to a base message but serialized into the same flat field
//! mapping. The open set of extension types is modeled as a registry
//! mapping type URI to a constructor, consulted during deserialization;
//! new extensions register without modifying the core message types.

use std::collections::{BTreeMap, HashMap};

use crate::error::Result;

/// An extension instance attached to a base message
pub trait MessageExtension: Send + Sync + std::fmt::Debug {
    /// The type URI identifying this extension on the wire and in
    /// discovery advertisements
    fn type_uri(&self) -> &'static str;

    /// The extension's contribution to the flat wire mapping.
    ///
    /// Field names must be unique across the base message and every
    /// attached extension; a collision fails serialization.
    fn serialize_fields(&self) -> BTreeMap<String, String>;

    /// Downcast support for callers that know the concrete type
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Static registration record for one extension type
pub struct ExtensionDescriptor {
    /// The extension's type URI
    pub type_uri: &'static str,
    /// Wire field names the extension owns; removed from extra data when
    /// the extension is attached
    pub field_names: &'static [&'static str],
    /// Constructor invoked with the incoming field mapping
    pub construct: fn(&BTreeMap<String, String>) -> Result<Box<dyn MessageExtension>>,
}

/// The result of recognizing an extension during deserialization
pub struct ParsedExtension {
    /// The constructed extension instance
    pub extension: Box<dyn MessageExtension>,
    /// Field names consumed by the extension
    pub consumed: &'static [&'static str],
}

/// Registry mapping extension type URIs to constructors
#[derive(Default)]
pub struct ExtensionRegistry {
    factories: HashMap<&'static str, ExtensionDescriptor>,
}

impl ExtensionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension type
    pub fn register(&mut self, descriptor: ExtensionDescriptor) {
        self.factories.insert(descriptor.type_uri, descriptor);
    }

    /// Whether a type URI has a registered constructor
    #[must_use]
    pub fn is_registered(&self, type_uri: &str) -> bool {
        self.factories.contains_key(type_uri)
    }

    /// Attempt to construct the extension registered for `type_uri` from
    /// an incoming field mapping.
    ///
    /// Returns `Ok(None)` for unknown type URIs so the caller can
    /// preserve the fields as opaque extra data.
    ///
    /// # Errors
    /// Propagates the constructor's validation errors.
    pub fn create(
        &self,
        type_uri: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Option<ParsedExtension>> {
        match self.factories.get(type_uri) {
            Some(descriptor) => {
                let extension = (descriptor.construct)(fields)?;
                Ok(Some(ParsedExtension {
                    extension,
                    consumed: descriptor.field_names,
                }))
            }
            None => Ok(None),
        }
    }
}
