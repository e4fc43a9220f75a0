use crate::Result;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// An opaque transformer parameter value. The schema of each parameter is
/// owned by the transformer definition; the config layer only carries the
/// raw bytes of whatever scalar the user wrote.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ParamsValue(Vec<u8>);

impl ParamsValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        ParamsValue(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("")
    }
}

impl From<&str> for ParamsValue {
    fn from(value: &str) -> Self {
        ParamsValue(value.as_bytes().to_vec())
    }
}

impl From<String> for ParamsValue {
    fn from(value: String) -> Self {
        ParamsValue(value.into_bytes())
    }
}

impl PartialEq<str> for ParamsValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl Serialize for ParamsValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct ParamsValueVisitor;

impl Visitor<'_> for ParamsValueVisitor {
    type Value = ParamsValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a scalar parameter value")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        Ok(ParamsValue::from(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
        Ok(ParamsValue::from(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(ParamsValue::from(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(ParamsValue::from(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
        Ok(ParamsValue::from(v.to_string()))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Self::Value, E> {
        Ok(ParamsValue::new(v.to_vec()))
    }
}

impl<'de> Deserialize<'de> for ParamsValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ParamsValueVisitor)
    }
}

/// One transformer applied to one table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransformerConfig {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamsValue>,
    #[serde(default)]
    pub when: String,
    #[serde(default)]
    pub apply_for_references: bool,
}

/// Per-table user configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableConfig {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub subset_conds: Vec<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub when: String,
    #[serde(default)]
    pub apply_for_inherited: bool,
    #[serde(default)]
    pub skip_auto_anonymize: Vec<String>,
    #[serde(default)]
    pub columns_type_override: BTreeMap<String, String>,
    #[serde(default)]
    pub transformers: Vec<TransformerConfig>,
}

/// A relationship the live database does not enforce, declared by the user so
/// the subset planner can treat it like a real foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VirtualReference {
    pub schema: String,
    pub name: String,
    pub references: Vec<VirtualReferenceTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VirtualReferenceTarget {
    pub schema: String,
    pub name: String,
    /// Referencing columns on the declaring table, matched positionally to
    /// `target_columns` (or to the target's primary key when omitted).
    pub columns: Vec<String>,
    #[serde(default)]
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub polymorphic_exprs: Vec<String>,
    #[serde(default)]
    pub not_null: bool,
}

/// Top-level dump configuration as far as the core consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DumpConfig {
    #[serde(default)]
    pub transformation: Vec<TableConfig>,
    #[serde(default)]
    pub auto_anonymize: bool,
    #[serde(default)]
    pub virtual_references: Vec<VirtualReference>,
}

impl DumpConfig {
    pub fn from_yaml(yaml: &str) -> Result<DumpConfig> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
