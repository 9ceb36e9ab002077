//! Entity metamodel: the attribute types the interpreter needs to type field
//! reads and to recognise collection-valued navigation.
//!
//! ```ignore
//! let model = Metamodel::new()
//!     .with_entity(
//!         EntityType::new("Customer")
//!             .scalar("name", ScalarType::String)
//!             .scalar("debt", ScalarType::Numeric),
//!     )
//!     .with_entity(EntityType::new("Sale").reference("customer", "Customer"));
//! model.validate()?;
//! ```

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Whether `name` is usable as an entity or attribute name in query text.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Errors found while validating a metamodel.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetamodelError {
    #[error("invalid entity name: {0:?}")]
    InvalidEntityName(String),

    #[error("invalid attribute name {attribute:?} on {entity}")]
    InvalidAttributeName { entity: String, attribute: String },

    #[error("{entity}.{attribute} refers to unknown entity {target}")]
    DanglingReference {
        entity: String,
        attribute: String,
        target: String,
    },
}

/// Scalar attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Boolean,
    Numeric,
    String,
}

/// The kind of an entity attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeKind {
    /// Plain column.
    Scalar(ScalarType),
    /// To-one relationship.
    Reference { reference: String },
    /// To-many relationship.
    Collection { collection: String },
}

/// An entity type and its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityType {
    #[serde(skip)]
    pub name: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeKind>,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn scalar(mut self, name: &str, ty: ScalarType) -> Self {
        self.attributes
            .insert(name.into(), AttributeKind::Scalar(ty));
        self
    }

    pub fn reference(mut self, name: &str, target: &str) -> Self {
        self.attributes.insert(
            name.into(),
            AttributeKind::Reference {
                reference: target.into(),
            },
        );
        self
    }

    pub fn collection(mut self, name: &str, target: &str) -> Self {
        self.attributes.insert(
            name.into(),
            AttributeKind::Collection {
                collection: target.into(),
            },
        );
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeKind> {
        self.attributes.get(name)
    }
}

/// All known entity types, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metamodel {
    entities: BTreeMap<String, EntityType>,
}

impl Metamodel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an entity type.
    pub fn with_entity(mut self, entity: EntityType) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Look up an attribute of an entity type.
    pub fn attribute(&self, entity: &str, attribute: &str) -> Option<&AttributeKind> {
        self.entity(entity).and_then(|e| e.attribute(attribute))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    /// Check names and relationship targets.
    pub fn validate(&self) -> Result<(), MetamodelError> {
        for entity in self.entities.values() {
            if !is_identifier(&entity.name) {
                return Err(MetamodelError::InvalidEntityName(entity.name.clone()));
            }
            for (attr, kind) in &entity.attributes {
                if !is_identifier(attr) {
                    return Err(MetamodelError::InvalidAttributeName {
                        entity: entity.name.clone(),
                        attribute: attr.clone(),
                    });
                }
                let target = match kind {
                    AttributeKind::Scalar(_) => continue,
                    AttributeKind::Reference { reference } => reference,
                    AttributeKind::Collection { collection } => collection,
                };
                if !self.contains(target) {
                    return Err(MetamodelError::DanglingReference {
                        entity: entity.name.clone(),
                        attribute: attr.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<EntityType> for Metamodel {
    fn from_iter<I: IntoIterator<Item = EntityType>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Metamodel::new(), |model, entity| model.with_entity(entity))
    }
}
