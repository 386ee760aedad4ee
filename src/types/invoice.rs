//! Structured invoice record produced by the parse stage
//!
//! Deserialization is forgiving about *shape* but strict about
//! the numeric invariant: every numeric slot that is absent or `null` becomes
//! `0`, so nothing downstream ever sees a missing amount. Numbers that arrive
//! as strings (`"1,200.50"`) are accepted; non-numeric strings, including
//! `"NaN"` and `"inf"`, are rejected.

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Seller or buyer on an invoice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Party {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub gstin: Option<String>,
}

/// A single invoice line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub hsn_sac: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: f64,

    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub rate: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: f64,
}

/// Structured invoice handed from Parse to Validate and Report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvoice {
    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_number: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_date: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub vendor: Party,

    #[serde(default, deserialize_with = "null_as_default")]
    pub buyer: Party,

    #[serde(default, deserialize_with = "null_as_default")]
    pub line_items: Vec<LineItem>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub subtotal: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub cgst_rate: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub cgst_amount: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub sgst_rate: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub sgst_amount: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub igst_rate: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub igst_amount: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_tax: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_amount: f64,

    /// Parse confidence, 0-100
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: u8,
}

impl ParsedInvoice {
    /// Build from an arbitrary JSON mapping, applying null-to-zero coercion
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(PipelineError::JsonParseError(format!(
                "expected an invoice object, got {}",
                json_type_name(&value)
            )));
        }
        serde_json::from_value(value)
            .map_err(|e| PipelineError::JsonParseError(format!("Invalid invoice JSON: {}", e)))
    }

    /// Parse from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| PipelineError::JsonParseError(format!("Invalid invoice JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Serialize into the mapping carried by `structured_data`
    pub fn to_value(&self) -> Value {
        // Plain structs of strings and finite-or-not floats always serialize
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Sum of all line item amounts
    pub fn line_items_total(&self) -> f64 {
        self.line_items.iter().map(|item| item.amount).sum()
    }

    /// Headline fields and whether each was populated
    fn headline_fields(&self) -> [(&'static str, bool); 8] {
        [
            ("invoice_number", has_text(&self.invoice_number)),
            ("invoice_date", has_text(&self.invoice_date)),
            ("vendor.name", has_text(&self.vendor.name)),
            ("vendor.gstin", has_text(&self.vendor.gstin)),
            ("buyer.name", has_text(&self.buyer.name)),
            ("line_items", !self.line_items.is_empty()),
            ("subtotal", self.subtotal != 0.0),
            ("total_amount", self.total_amount != 0.0),
        ]
    }

    /// Populated headline fields, out of the total
    pub fn coverage(&self) -> (usize, usize) {
        let fields = self.headline_fields();
        (fields.iter().filter(|(_, filled)| *filled).count(), fields.len())
    }

    /// Headline fields left empty by the parser
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.headline_fields()
            .into_iter()
            .filter(|(_, filled)| !filled)
            .map(|(name, _)| name)
            .collect()
    }
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse a numeric value that may be a JSON number or a numeric string
fn numeric_from_value(value: Value) -> std::result::Result<f64, String> {
    match value {
        Value::Null => Ok(0.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("number {} is not representable", n)),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                Ok(0.0)
            } else {
                match cleaned.parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(n),
                    _ => Err(format!("'{}' is not a number", s)),
                }
            }
        }
        other => Err(format!("expected a number, got {}", json_type_name(&other))),
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    numeric_from_value(value).map_err(serde::de::Error::custom)
}

fn lenient_confidence<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    let raw = numeric_from_value(value).map_err(serde::de::Error::custom)?;
    Ok(raw.clamp(0.0, 100.0).trunc() as u8)
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string, got {}",
            json_type_name(&other)
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
