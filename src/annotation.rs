//! Consequence-annotation field handling for variant imports.
//!
//! Each input file describes its per-transcript annotation columns in a header
//! description (`Allele|Consequence|IMPACT|...`) and lists its FORMAT keys.
//! [`reconcile_fields`] decides which columns a multi-file import keeps, and
//! [`coerce_fields`] turns raw strings into typed [`FieldValue`]s.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::NotSamePolicy;
use crate::constants::annotation::DEFAULT_INFO_SEP;
use crate::errors::ClindexError;
use crate::types::FieldName;

/// Typed annotation value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub enum FieldValue {
    /// Empty source value.
    Null,
    /// Text value.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Str(value) => f.write_str(value),
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Declared type of an annotation column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Kept as text.
    Str,
    /// Parsed as `i64`.
    Int,
    /// Parsed as `f64`.
    Float,
    /// Parsed from `1/true/yes` or `0/false/no`.
    Bool,
}

impl FieldType {
    /// Parse a non-empty raw value.
    fn parse(&self, field: &str, raw: &str) -> Result<FieldValue, ClindexError> {
        let bad = |expected: &str| {
            ClindexError::Configuration(format!(
                "field '{field}' expected {expected}, got '{raw}'"
            ))
        };
        match self {
            FieldType::Str => Ok(FieldValue::Str(raw.to_string())),
            FieldType::Int => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| bad("an integer")),
            FieldType::Float => raw
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| bad("a float")),
            FieldType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(FieldValue::Bool(true)),
                "0" | "false" | "no" => Ok(FieldValue::Bool(false)),
                _ => Err(bad("a boolean")),
            },
        }
    }
}

/// Annotation columns and FORMAT keys advertised by one input file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSet {
    /// Consequence columns, allele column already removed.
    pub description_fields: Vec<FieldName>,
    /// Per-sample FORMAT keys.
    pub format_fields: Vec<FieldName>,
}

impl FieldSet {
    /// Split a header description on `sep`, dropping its leading allele column.
    pub fn from_description<I, S>(description: &str, sep: &str, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        let description_fields = description
            .split(sep)
            .skip(1)
            .map(|field| field.trim().to_string())
            .collect();
        Self {
            description_fields,
            format_fields: formats.into_iter().map(Into::into).collect(),
        }
    }

    /// [`FieldSet::from_description`] with the default `|` separator.
    pub fn from_default_description<I, S>(description: &str, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        Self::from_description(description, DEFAULT_INFO_SEP, formats)
    }
}

/// Columns chosen for a multi-file import, lowercased.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciledFields {
    /// INFO/annotation columns to import.
    pub fields: Vec<FieldName>,
    /// FORMAT columns to import.
    pub formats: Vec<FieldName>,
}

/// Reconcile the field sets of every input file under `policy`.
///
/// Identical sets pass through unchanged. Union keeps first-seen order;
/// intersection keeps the order of the first file.
pub fn reconcile_fields(
    sets: &[FieldSet],
    policy: NotSamePolicy,
) -> Result<ReconciledFields, ClindexError> {
    let Some(first) = sets.first() else {
        return Ok(ReconciledFields::default());
    };
    let all_same = sets.iter().all(|set| {
        set.description_fields == first.description_fields && set.format_fields == first.format_fields
    });

    let (fields, formats) = if all_same {
        (first.description_fields.clone(), first.format_fields.clone())
    } else {
        match policy {
            NotSamePolicy::Error => {
                return Err(ClindexError::Configuration(format!(
                    "annotation fields or formats differ across {} input files",
                    sets.len()
                )));
            }
            NotSamePolicy::Union => (
                union(sets.iter().map(|set| &set.description_fields)),
                union(sets.iter().map(|set| &set.format_fields)),
            ),
            NotSamePolicy::Intersection => (
                intersection(sets.iter().map(|set| &set.description_fields)),
                intersection(sets.iter().map(|set| &set.format_fields)),
            ),
        }
    };

    Ok(ReconciledFields {
        fields: lowercase(fields),
        formats: lowercase(formats),
    })
}

fn union<'a>(lists: impl Iterator<Item = &'a Vec<FieldName>>) -> Vec<FieldName> {
    let mut seen = IndexSet::new();
    for list in lists {
        seen.extend(list.iter().cloned());
    }
    seen.into_iter().collect()
}

fn intersection<'a>(mut lists: impl Iterator<Item = &'a Vec<FieldName>>) -> Vec<FieldName> {
    let Some(first) = lists.next() else {
        return Vec::new();
    };
    let mut kept: IndexSet<FieldName> = first.iter().cloned().collect();
    for list in lists {
        kept.retain(|field| list.contains(field));
    }
    kept.into_iter().collect()
}

fn lowercase(fields: Vec<FieldName>) -> Vec<FieldName> {
    fields.into_iter().map(|field| field.to_lowercase()).collect()
}

/// Pair one annotation entry (`A|missense_variant|MODERATE`) with its column names.
///
/// Missing trailing values become empty strings.
pub fn split_annotation(entry: &str, sep: &str, fields: &[FieldName]) -> Vec<(FieldName, String)> {
    let mut values = entry.split(sep).skip(1);
    fields
        .iter()
        .map(|field| (field.clone(), values.next().unwrap_or_default().to_string()))
        .collect()
}

/// Convert raw string values into typed values.
///
/// Fields missing from `schema` are dropped; empty strings become
/// [`FieldValue::Null`] regardless of type.
pub fn coerce_fields(
    raw: &[(FieldName, String)],
    schema: &IndexMap<FieldName, FieldType>,
) -> Result<Vec<(FieldName, FieldValue)>, ClindexError> {
    raw.iter()
        .filter_map(|(field, value)| schema.get(field).map(|ty| (field, value, ty)))
        .map(|(field, value, ty)| {
            let typed = if value.is_empty() {
                FieldValue::Null
            } else {
                ty.parse(field, value)?
            };
            Ok((field.clone(), typed))
        })
        .collect()
}
