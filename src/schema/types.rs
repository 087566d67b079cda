//! Pseudo-schema data types.
//!
//! A pseudo-schema is a GraphQL-flavoured description of a facet: a read type,
//! its input twin, and every nested composite pair reachable from the root.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Leaf types the inferencer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    #[serde(rename = "ID")]
    Id,
    Boolean,
    String,
    DateTime,
    Int,
    Float,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Id => "ID",
            ScalarType::Boolean => "Boolean",
            ScalarType::String => "String",
            ScalarType::DateTime => "DateTime",
            ScalarType::Int => "Int",
            ScalarType::Float => "Float",
        }
    }
}

/// What a field points at: a scalar or a named composite type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name")]
pub enum TypeRef {
    Scalar(ScalarType),
    Composite(String),
}

impl TypeRef {
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Scalar(scalar) => scalar.as_str(),
            TypeRef::Composite(name) => name,
        }
    }
}

/// Type of a single field.
///
/// Flags follow GraphQL modifiers: for a list, `is_required` marks the
/// elements non-null and `is_required_list` the list itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldType {
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_required_list: bool,
}

impl FieldType {
    pub fn scalar(scalar: ScalarType, is_required: bool) -> Self {
        Self {
            type_ref: TypeRef::Scalar(scalar),
            is_list: false,
            is_required,
            is_required_list: false,
        }
    }

    pub fn composite(name: impl Into<String>, is_required: bool) -> Self {
        Self {
            type_ref: TypeRef::Composite(name.into()),
            is_list: false,
            is_required,
            is_required_list: false,
        }
    }

    pub fn list(scalar: ScalarType, elements_required: bool, list_required: bool) -> Self {
        Self {
            type_ref: TypeRef::Scalar(scalar),
            is_list: true,
            is_required: elements_required,
            is_required_list: list_required,
        }
    }

    /// The input-type counterpart: nothing required, composites point at inputs.
    pub fn to_input(&self) -> Self {
        let type_ref = match &self.type_ref {
            TypeRef::Composite(name) => TypeRef::Composite(input_type_name(name)),
            scalar => scalar.clone(),
        };
        Self {
            type_ref,
            is_list: self.is_list,
            is_required: false,
            is_required_list: false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bang = |required: bool| if required { "!" } else { "" };
        if self.is_list {
            write!(
                f,
                "[{}{}]{}",
                self.type_ref.name(),
                bang(self.is_required),
                bang(self.is_required_list)
            )
        } else {
            write!(f, "{}{}", self.type_ref.name(), bang(self.is_required))
        }
    }
}

/// Name of the input type paired with a read type.
pub fn input_type_name(read_name: &str) -> String {
    format!("{read_name}Input")
}

/// A named composite type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    pub fields: BTreeMap<String, FieldType>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Names of composite types referenced by this definition, in field order.
    pub fn composite_refs(&self) -> impl Iterator<Item = &str> {
        self.fields.values().filter_map(|field| match &field.type_ref {
            TypeRef::Composite(name) => Some(name.as_str()),
            TypeRef::Scalar(_) => None,
        })
    }

    fn render(&self, keyword: &str, out: &mut String) {
        out.push_str(&format!("{keyword} {} {{\n", self.name));
        for (name, field) in &self.fields {
            out.push_str(&format!("  {name}: {field}\n"));
        }
        out.push_str("}\n");
    }
}

/// A read type and its input twin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypePair {
    pub read_type: TypeDefinition,
    pub input_type: TypeDefinition,
}

impl TypePair {
    /// Derive the input twin of a read type.
    pub fn from_read(read_type: TypeDefinition) -> Self {
        let input_type = TypeDefinition {
            name: input_type_name(&read_type.name),
            fields: read_type
                .fields
                .iter()
                .map(|(name, field)| (name.clone(), field.to_input()))
                .collect(),
        };
        Self {
            read_type,
            input_type,
        }
    }
}

/// Inferred schema for one facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PseudoSchema {
    pub root_read_type: TypeDefinition,
    pub root_input_type: TypeDefinition,
    #[serde(default)]
    pub auxiliary_type_pairs: Vec<TypePair>,
}

impl PseudoSchema {
    /// Every type name this schema defines, read and input alike.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        [&self.root_read_type, &self.root_input_type]
            .into_iter()
            .chain(
                self.auxiliary_type_pairs
                    .iter()
                    .flat_map(|pair| [&pair.read_type, &pair.input_type]),
            )
            .map(|definition| definition.name.as_str())
    }

    /// Render as GraphQL SDL: root pair first, then auxiliary pairs in order.
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();
        self.root_read_type.render("type", &mut out);
        out.push('\n');
        self.root_input_type.render("input", &mut out);
        for pair in &self.auxiliary_type_pairs {
            out.push('\n');
            pair.read_type.render("type", &mut out);
            out.push('\n');
            pair.input_type.render("input", &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_display() {
        assert_eq!(FieldType::scalar(ScalarType::Int, true).to_string(), "Int!");
        assert_eq!(FieldType::scalar(ScalarType::String, false).to_string(), "String");
        assert_eq!(FieldType::list(ScalarType::Int, true, true).to_string(), "[Int!]!");
        assert_eq!(FieldType::list(ScalarType::Int, false, true).to_string(), "[Int]!");
    }

    #[test]
    fn test_to_input_clears_required_flags() {
        let input = FieldType::list(ScalarType::Float, true, true).to_input();
        assert!(input.is_list);
        assert!(!input.is_required);
        assert!(!input.is_required_list);

        let composite = FieldType::composite("OrderShipping", true).to_input();
        assert_eq!(
            composite.type_ref,
            TypeRef::Composite("OrderShippingInput".to_string())
        );
        assert!(!composite.is_required);
    }

    #[test]
    fn test_pseudo_schema_json_shape() {
        let mut read = TypeDefinition::new("Order");
        read.fields
            .insert("total".to_string(), FieldType::scalar(ScalarType::Float, true));
        let pair = TypePair::from_read(read);
        let schema = PseudoSchema {
            root_read_type: pair.read_type,
            root_input_type: pair.input_type,
            auxiliary_type_pairs: Vec::new(),
        };

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["rootReadType"]["name"], "Order");
        assert_eq!(json["rootInputType"]["name"], "OrderInput");
        assert_eq!(
            json["rootReadType"]["fields"]["total"]["type"]["name"],
            "Float"
        );
        assert!(json["auxiliaryTypePairs"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_to_sdl() {
        let mut read = TypeDefinition::new("Order");
        read.fields
            .insert("id".to_string(), FieldType::scalar(ScalarType::Id, true));
        let pair = TypePair::from_read(read);
        let schema = PseudoSchema {
            root_read_type: pair.read_type,
            root_input_type: pair.input_type,
            auxiliary_type_pairs: Vec::new(),
        };

        assert_eq!(
            schema.to_sdl(),
            "type Order {\n  id: ID!\n}\n\ninput OrderInput {\n  id: ID\n}\n"
        );
    }
}
