//! Catalogue of known particle quantities.
//!
//! The registry is the ground truth for how each quantity is stored. File
//! schemas are checked against it before a scan starts, and requested names
//! are resolved through it before any byte of the file is read.

use crate::types::{Encoding, QuantityDef, Schema};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while resolving or validating quantities.
///
/// These are configuration errors: they are reported before any record is
/// decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown quantity: {0}")]
    UnknownQuantity(String),

    #[error("Conflicting definition for quantity {name}: registered as {registered}, found {found}")]
    Conflict {
        name: String,
        registered: Encoding,
        found: Encoding,
    },

    #[error("Quantity {0} appears more than once in the schema")]
    DuplicateQuantity(String),

    #[error("Quantity {name} has an invalid encoding (kind tag {kind_tag}, width {width})")]
    InvalidEncoding {
        name: String,
        kind_tag: u8,
        width: u8,
    },
}

/// Standard particle quantities and their storage, in catalogue order.
const STANDARD_QUANTITIES: &[(&str, Encoding)] = &[
    ("t", Encoding::F64),
    ("x", Encoding::F64),
    ("y", Encoding::F64),
    ("z", Encoding::F64),
    ("mass", Encoding::F64),
    ("p0", Encoding::F64),
    ("px", Encoding::F64),
    ("py", Encoding::F64),
    ("pz", Encoding::F64),
    ("pdg", Encoding::I32),
    ("id", Encoding::I32),
    ("charge", Encoding::I32),
    ("ncoll", Encoding::I32),
    ("form_time", Encoding::F64),
    ("xsecfac", Encoding::F64),
    ("proc_id_origin", Encoding::I32),
    ("proc_type_origin", Encoding::I32),
    ("time_last_coll", Encoding::F64),
    ("pdg_mother1", Encoding::I32),
    ("pdg_mother2", Encoding::I32),
    ("baryon_number", Encoding::I32),
    ("strangeness", Encoding::I32),
];

/// Ordered name -> encoding catalogue.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    defs: Vec<QuantityDef>,
    index: HashMap<String, usize>,
}

impl Default for SchemaRegistry {
    /// The standard particle catalogue.
    fn default() -> Self {
        let mut registry = Self::empty();
        for &(name, encoding) in STANDARD_QUANTITIES {
            registry.defs.push(QuantityDef::new(name, encoding));
            registry.index.insert(name.to_string(), registry.defs.len() - 1);
        }
        registry
    }
}

impl SchemaRegistry {
    /// Creates a registry with no entries.
    pub fn empty() -> Self {
        Self {
            defs: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a quantity to the catalogue.
    ///
    /// Registering the same name with the same encoding again is a no-op. A
    /// different encoding for an existing name is rejected.
    pub fn register(&mut self, def: QuantityDef) -> Result<(), SchemaError> {
        if let Some(&idx) = self.index.get(&def.name) {
            let registered = self.defs[idx].encoding;
            if registered != def.encoding {
                return Err(SchemaError::Conflict {
                    name: def.name,
                    registered,
                    found: def.encoding,
                });
            }
            return Ok(());
        }

        self.index.insert(def.name.clone(), self.defs.len());
        self.defs.push(def);
        Ok(())
    }

    /// Looks up a quantity by name.
    pub fn resolve(&self, name: &str) -> Result<&QuantityDef, SchemaError> {
        self.index
            .get(name)
            .map(|&i| &self.defs[i])
            .ok_or_else(|| SchemaError::UnknownQuantity(name.to_string()))
    }

    /// Checks that every member of a file schema is known and stored the way
    /// the catalogue says.
    pub fn validate(&self, schema: &Schema) -> Result<(), SchemaError> {
        for quantity in schema.quantities() {
            let def = self.resolve(&quantity.name)?;
            if def.encoding != quantity.encoding {
                return Err(SchemaError::Conflict {
                    name: quantity.name.clone(),
                    registered: def.encoding,
                    found: quantity.encoding,
                });
            }
        }
        Ok(())
    }

    /// Entries in catalogue order.
    pub fn quantities(&self) -> &[QuantityDef] {
        &self.defs
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalogue() {
        let registry = SchemaRegistry::default();
        assert_eq!(registry.resolve("mass").unwrap().encoding, Encoding::F64);
        assert_eq!(registry.resolve("pdg").unwrap().encoding, Encoding::I32);
        assert_eq!(registry.quantities()[0].name, "t");
        assert_eq!(registry.len(), STANDARD_QUANTITIES.len());
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = SchemaRegistry::default();
        assert_eq!(
            registry.resolve("rapidity"),
            Err(SchemaError::UnknownQuantity("rapidity".to_string()))
        );
    }

    #[test]
    fn test_register_same_definition_twice() {
        let mut registry = SchemaRegistry::empty();
        registry.register(QuantityDef::new("spin", Encoding::I8)).unwrap();
        registry.register(QuantityDef::new("spin", Encoding::I8)).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_conflict() {
        let mut registry = SchemaRegistry::default();
        let err = registry
            .register(QuantityDef::new("pdg", Encoding::I64))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::Conflict {
                name: "pdg".to_string(),
                registered: Encoding::I32,
                found: Encoding::I64,
            }
        );
    }

    #[test]
    fn test_validate_schema() {
        let registry = SchemaRegistry::default();

        let good = Schema::new([
            QuantityDef::new("p0", Encoding::F64),
            QuantityDef::new("pdg", Encoding::I32),
        ])
        .unwrap();
        assert!(registry.validate(&good).is_ok());

        let narrowed = Schema::new([QuantityDef::new("p0", Encoding::F32)]).unwrap();
        assert!(matches!(
            registry.validate(&narrowed),
            Err(SchemaError::Conflict { .. })
        ));

        let unknown = Schema::new([QuantityDef::new("foo", Encoding::I8)]).unwrap();
        assert_eq!(
            registry.validate(&unknown),
            Err(SchemaError::UnknownQuantity("foo".to_string()))
        );
    }
}
