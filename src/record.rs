//! Record data model: typed field values bound to the schema.
//!
//! A [`Record`] always holds exactly one value per schema field. Missing data
//! is [`FieldValue::Null`], never an empty string, so "the oracle found
//! nothing" and "the document printed an empty value" stay distinguishable
//! all the way to the persisted file (nulls are written as the configured
//! null literal, empty strings as an empty cell).

use crate::schema::{FieldKind, FieldSpec, Schema};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why a single cell could not be accepted for its column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldFormatError {
    #[error("field '{field}': '{value}' is not a decimal amount (expected digits with '.' as decimal point)")]
    InvalidAmount { field: &'static str, value: String },

    #[error("field '{field}': '{value}' is not a valid DD/MM/YYYY date")]
    InvalidDate { field: &'static str, value: String },
}

// ── Amount ───────────────────────────────────────────────────────────────────

static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());
static RE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{2}/[0-9]{2}/[0-9]{4}$").unwrap());

/// A decimal amount kept in its canonical textual form.
///
/// Only `.` is accepted as the decimal point and no thousands separators are
/// allowed, so `1.234,56` is rejected instead of being guessed at. Only ASCII
/// digits count. The digits are never routed through a float, which keeps
/// `10.50` as `10.50`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a decimal amount")]
pub struct InvalidAmount(pub String);

impl Amount {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Amount {
    type Err = InvalidAmount;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if RE_AMOUNT.is_match(s) {
            Ok(Amount(s.to_string()))
        } else {
            Err(InvalidAmount(s.to_string()))
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a `DD/MM/YYYY` date: shape first, then calendar validity.
pub fn is_valid_date(s: &str) -> bool {
    RE_DATE.is_match(s) && NaiveDate::parse_from_str(s, "%d/%m/%Y").is_ok()
}

// ── FieldValue ───────────────────────────────────────────────────────────────

/// One cell of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Amount(Amount),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<&Amount> {
        match self {
            FieldValue::Amount(a) => Some(a),
            _ => None,
        }
    }

    /// Coerce a raw textual cell into a value for `field`.
    ///
    /// A cell equal to `null_literal` (case-insensitive, surrounding
    /// whitespace ignored) becomes [`FieldValue::Null`]. An empty cell in a
    /// text column stays an empty string; in an amount or date column it is
    /// rejected, since neither has an empty representation.
    pub fn from_cell(
        raw: &str,
        field: &FieldSpec,
        null_literal: &str,
    ) -> Result<FieldValue, FieldFormatError> {
        let trimmed = raw.trim();
        if !null_literal.is_empty() && trimmed.eq_ignore_ascii_case(null_literal) {
            return Ok(FieldValue::Null);
        }

        match field.kind {
            FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldKind::Amount => trimmed
                .parse::<Amount>()
                .map(FieldValue::Amount)
                .map_err(|_| FieldFormatError::InvalidAmount {
                    field: field.key,
                    value: raw.to_string(),
                }),
            FieldKind::Date => {
                if is_valid_date(trimmed) {
                    Ok(FieldValue::Text(trimmed.to_string()))
                } else {
                    Err(FieldFormatError::InvalidDate {
                        field: field.key,
                        value: raw.to_string(),
                    })
                }
            }
        }
    }

    /// Render as a persisted cell.
    pub fn to_cell<'a>(&'a self, null_literal: &'a str) -> Cow<'a, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s),
            FieldValue::Amount(a) => Cow::Borrowed(a.as_str()),
            FieldValue::Null => Cow::Borrowed(null_literal),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Amount(a) => serializer.serialize_str(a.as_str()),
            FieldValue::Null => serializer.serialize_none(),
        }
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record has {got} values but the schema has {expected} fields")]
pub struct ArityError {
    pub expected: usize,
    pub got: usize,
}

/// A full row: one value per schema field, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    schema: &'static Schema,
    values: Vec<FieldValue>,
}

impl Record {
    /// Build a record from values in schema order.
    pub fn from_values(
        schema: &'static Schema,
        values: Vec<FieldValue>,
    ) -> Result<Record, ArityError> {
        if values.len() != schema.len() {
            return Err(ArityError {
                expected: schema.len(),
                got: values.len(),
            });
        }
        Ok(Record { schema, values })
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Value of the field with the given key.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.schema.index_of(key).map(|i| &self.values[i])
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// `(field, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static FieldSpec, &FieldValue)> {
        self.schema.fields().iter().zip(self.values.iter())
    }

    /// Persisted cells: data fields followed by the provenance value.
    pub fn to_row(&self, provenance: &str, null_literal: &str) -> Vec<String> {
        self.values
            .iter()
            .map(|v| v.to_cell(null_literal).into_owned())
            .chain(std::iter::once(provenance.to_string()))
            .collect()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.key, value)?;
        }
        map.end()
    }
}

/// Everything extracted from one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutput {
    /// Source file identifier written to the provenance column.
    pub source: String,
    pub records: Vec<Record>,
}

impl DocumentOutput {
    pub fn new(source: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            source: source.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All rows with the provenance column filled in.
    pub fn rows(&self, null_literal: &str) -> Vec<Vec<String>> {
        self.records
            .iter()
            .map(|r| r.to_row(&self.source, null_literal))
            .collect()
    }
}
