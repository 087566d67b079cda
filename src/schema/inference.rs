//! Type inference over sampled target records.
//!
//! Everything here is a pure function of the sample: the same records always
//! produce the same [`PseudoSchema`]. Field maps are ordered, composite types
//! are discovered breadth-first, and no wall-clock or random input is used.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use snafu::prelude::*;
use tracing::warn;

use crate::error::{
    HeterogeneousListSnafu, NonScalarListElementSnafu, SchemaInferenceError,
    TypeNameCollisionSnafu,
};
use crate::record::TargetRecord;
use crate::value::{Fields, Value};

use super::naming::{nested_type_name, root_type_name};
use super::types::{
    FieldType, PseudoSchema, ScalarType, TypeDefinition, TypePair, input_type_name,
};

/// Field every root type exposes as the record's identifier.
pub const KEY_FIELD: &str = "key";

/// ISO-8601 date-time: `YYYY-MM-DDTHH:MM[:SS[.fff]][Z|±HH[:]MM]`.
static DATE_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("Invalid date-time pattern")
});

/// Whole numbers, signed. A leading minus still classifies as `Int`.
static INTEGER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+$").expect("Invalid integer pattern"));

/// Returns true if `s` looks like an ISO-8601 date-time.
pub fn is_date_time(s: &str) -> bool {
    DATE_TIME_PATTERN.is_match(s)
}

/// Classify a number by its canonical decimal text.
pub fn classify_number(text: &str) -> ScalarType {
    if INTEGER_PATTERN.is_match(text) {
        ScalarType::Int
    } else {
        ScalarType::Float
    }
}

/// Scalar type of a leaf value, or `None` for null, lists and maps.
pub fn leaf_type(value: &Value) -> Option<ScalarType> {
    match value {
        Value::Bool(_) => Some(ScalarType::Boolean),
        Value::String(s) if is_date_time(s) => Some(ScalarType::DateTime),
        Value::String(_) => Some(ScalarType::String),
        Value::DateTime(_) => Some(ScalarType::DateTime),
        Value::Int(n) => Some(classify_number(&n.to_string())),
        Value::Float(f) => Some(classify_number(&f.to_string())),
        Value::Null | Value::List(_) | Value::Map(_) => None,
    }
}

/// Scalar families that may share a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarFamily {
    Boolean,
    Text,
    Number,
}

fn family(scalar: ScalarType) -> ScalarFamily {
    match scalar {
        ScalarType::Boolean => ScalarFamily::Boolean,
        ScalarType::Id | ScalarType::String | ScalarType::DateTime => ScalarFamily::Text,
        ScalarType::Int | ScalarType::Float => ScalarFamily::Number,
    }
}

/// Field-union of a facet's sampled records.
///
/// Holds one representative value per field (the last non-null sample value)
/// and the set of fields every sample carries with a non-null value.
#[derive(Debug)]
pub struct PrototypeRecord<'a> {
    values: BTreeMap<&'a str, &'a Value>,
    required: BTreeSet<&'a str>,
}

impl<'a> PrototypeRecord<'a> {
    pub fn from_samples(samples: &'a [TargetRecord]) -> Self {
        let mut values: BTreeMap<&'a str, &'a Value> = BTreeMap::new();
        let mut required: Option<BTreeSet<&'a str>> = None;

        for record in samples {
            let mut present = BTreeSet::new();
            for (name, value) in &record.fields {
                if value.is_null() {
                    values.entry(name.as_str()).or_insert(value);
                } else {
                    values.insert(name.as_str(), value);
                    present.insert(name.as_str());
                }
            }
            required = Some(match required {
                None => present,
                Some(acc) => acc.intersection(&present).copied().collect(),
            });
        }

        Self {
            values,
            required: required.unwrap_or_default(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + '_ {
        self.values.iter().map(|(name, value)| (*name, *value))
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }

    pub fn required_fields(&self) -> BTreeSet<String> {
        self.required.iter().map(|s| s.to_string()).collect()
    }

    pub fn optional_fields(&self) -> BTreeSet<String> {
        self.values
            .keys()
            .filter(|name| !self.required.contains(*name))
            .map(|s| s.to_string())
            .collect()
    }
}

/// Accumulates composite types while walking one facet.
struct SchemaBuilder<'a> {
    facet: &'a str,
    taken: HashSet<String>,
    composites: BTreeMap<String, TypeDefinition>,
}

impl<'a> SchemaBuilder<'a> {
    fn new(facet: &'a str, reserved: &HashSet<String>) -> Self {
        Self {
            facet,
            taken: reserved.clone(),
            composites: BTreeMap::new(),
        }
    }

    /// Claim a read type name and its input twin.
    fn reserve(&mut self, read_name: &str) -> Result<(), SchemaInferenceError> {
        let input_name = input_type_name(read_name);
        for name in [read_name, input_name.as_str()] {
            ensure!(
                !self.taken.contains(name),
                TypeNameCollisionSnafu { name }
            );
        }
        self.taken.insert(read_name.to_string());
        self.taken.insert(input_name);
        Ok(())
    }

    fn field_type(
        &mut self,
        parent: &str,
        path: &str,
        name: &str,
        value: &Value,
        required: bool,
    ) -> Result<FieldType, SchemaInferenceError> {
        match value {
            Value::Null => {
                warn!(facet = %self.facet, field = %path, "Field is always null, defaulting to String");
                Ok(FieldType::scalar(ScalarType::String, false))
            }
            Value::List(items) => self.list_type(path, items, required),
            Value::Map(fields) => self.composite_type(parent, path, name, fields, required),
            leaf => {
                let scalar = leaf_type(leaf).unwrap_or(ScalarType::String);
                Ok(FieldType::scalar(scalar, required))
            }
        }
    }

    fn list_type(
        &self,
        path: &str,
        items: &[Value],
        required: bool,
    ) -> Result<FieldType, SchemaInferenceError> {
        let mut element: Option<ScalarType> = None;
        let mut has_null = false;

        for item in items {
            if item.is_null() {
                has_null = true;
                continue;
            }
            let scalar = leaf_type(item).context(NonScalarListElementSnafu { field: path })?;
            match element {
                None => element = Some(scalar),
                Some(first) => ensure!(
                    family(first) == family(scalar),
                    HeterogeneousListSnafu { field: path }
                ),
            }
        }

        let element = element.unwrap_or_else(|| {
            warn!(facet = %self.facet, field = %path, "List has no non-null elements, defaulting to String");
            ScalarType::String
        });

        Ok(FieldType::list(element, !has_null, required))
    }

    fn composite_type(
        &mut self,
        parent: &str,
        path: &str,
        name: &str,
        fields: &Fields,
        required: bool,
    ) -> Result<FieldType, SchemaInferenceError> {
        let type_name = nested_type_name(parent, name);
        self.reserve(&type_name)?;

        let mut definition = TypeDefinition::new(type_name.clone());
        for (child, value) in fields {
            let child_path = format!("{path}.{child}");
            let child_required = required && !value.is_null();
            let field = self.field_type(&type_name, &child_path, child, value, child_required)?;
            definition.fields.insert(child.clone(), field);
        }

        self.composites.insert(type_name.clone(), definition);
        Ok(FieldType::composite(type_name, required))
    }

    /// Remove composites reachable from `root`, breadth-first, as read/input pairs.
    fn take_auxiliary_pairs(&mut self, root: &TypeDefinition) -> Vec<TypePair> {
        let mut queue: VecDeque<String> = root.composite_refs().map(str::to_string).collect();
        let mut pairs = Vec::new();

        while let Some(name) = queue.pop_front() {
            if let Some(definition) = self.composites.remove(&name) {
                queue.extend(definition.composite_refs().map(str::to_string));
                pairs.push(TypePair::from_read(definition));
            }
        }

        pairs
    }
}

/// Infer the pseudo-schema of `facet` from its sampled records.
pub fn infer_pseudo_schema(
    facet: &str,
    samples: &[TargetRecord],
) -> Result<PseudoSchema, SchemaInferenceError> {
    infer_pseudo_schema_reserving(facet, samples, &HashSet::new())
}

/// Like [`infer_pseudo_schema`], but fails with `TypeNameCollision` if any
/// type name the facet needs is already in `reserved`.
pub fn infer_pseudo_schema_reserving(
    facet: &str,
    samples: &[TargetRecord],
    reserved: &HashSet<String>,
) -> Result<PseudoSchema, SchemaInferenceError> {
    let root_name = root_type_name(facet);
    let prototype = PrototypeRecord::from_samples(samples);
    let mut builder = SchemaBuilder::new(facet, reserved);
    builder.reserve(&root_name)?;

    let mut root = TypeDefinition::new(root_name.clone());
    for (name, value) in prototype.fields() {
        let field = builder.field_type(&root_name, name, name, value, prototype.is_required(name))?;
        root.fields.insert(name.to_string(), field);
    }
    root.fields.insert(
        KEY_FIELD.to_string(),
        FieldType::scalar(ScalarType::Id, true),
    );

    let auxiliary_type_pairs = builder.take_auxiliary_pairs(&root);
    let TypePair {
        read_type,
        input_type,
    } = TypePair::from_read(root);

    Ok(PseudoSchema {
        root_read_type: read_type,
        root_input_type: input_type,
        auxiliary_type_pairs,
    })
}
