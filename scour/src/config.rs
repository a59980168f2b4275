//! Collection configuration: schema, rank fields and search limits.

use crate::interface::{CollectionError, CollectionResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Hard ceiling on tokens per field in one query.
pub const MAX_SEARCH_TOKENS: usize = 20;
/// Hard ceiling on hits returned by one search.
pub const MAX_RESULTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int32,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int32 => "int32",
        }
    }
}

/// Where a string field is split into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordBoundary {
    /// Runs of alphanumeric characters.
    #[default]
    Punctuation,
    /// Runs of non-whitespace characters.
    Whitespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Field {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub word_boundary: WordBoundary,
}

impl Field {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::String,
            word_boundary: WordBoundary::default(),
        }
    }

    pub fn int32(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Int32,
            word_boundary: WordBoundary::default(),
        }
    }

    pub fn word_boundary(mut self, word_boundary: WordBoundary) -> Self {
        self.word_boundary = word_boundary;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SearchLimits {
    #[validate(range(max = 4))]
    pub max_typos: u8,
    /// Leaves kept per token per cost level.
    #[validate(range(min = 1, max = 1000))]
    pub max_leaves_per_cost: u32,
    /// Leaf combinations examined per field before giving up.
    #[validate(range(min = 1))]
    pub max_combinations: u32,
    #[validate(range(min = 1, max = 20))]
    pub max_search_tokens: u32,
    #[validate(range(min = 1, max = 100))]
    pub max_results: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_typos: 2,
            max_leaves_per_cost: 10,
            max_combinations: 4096,
            max_search_tokens: MAX_SEARCH_TOKENS as u32,
            max_results: MAX_RESULTS as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CollectionConfig {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    pub collection_id: u32,
    #[validate(length(min = 1))]
    pub fields: Vec<Field>,
    /// Primary then secondary ranking signal. A rank field that is also in
    /// the schema must be int32; one outside it is read as any integer.
    #[serde(default)]
    #[validate(length(max = 2))]
    pub rank_fields: Vec<String>,
    #[serde(default)]
    pub limits: SearchLimits,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection_id: 0,
            fields: Vec::new(),
            rank_fields: Vec::new(),
            limits: SearchLimits::default(),
        }
    }

    pub fn collection_id(mut self, collection_id: u32) -> Self {
        self.collection_id = collection_id;
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn rank_field(mut self, name: impl Into<String>) -> Self {
        self.rank_fields.push(name.into());
        self
    }

    pub fn limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn from_json(json: &str) -> CollectionResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CollectionError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Validate field constraints plus the cross-field rules the derive can't express.
    pub fn check(&self) -> CollectionResult<()> {
        self.validate()
            .map_err(|e| CollectionError::Config(e.to_string()))?;
        self.limits
            .validate()
            .map_err(|e| CollectionError::Config(e.to_string()))?;
        for field in &self.fields {
            field
                .validate()
                .map_err(|e| CollectionError::Config(e.to_string()))?;
        }

        let schema = Schema::new(&self.fields);
        if schema.len() != self.fields.len() {
            return Err(CollectionError::Config("duplicate field names".into()));
        }

        for (i, name) in self.rank_fields.iter().enumerate() {
            if let Some(field) = schema.get(name) {
                if field.field_type != FieldType::Int32 {
                    return Err(CollectionError::Config(format!(
                        "rank field `{name}` must be int32, not {}",
                        field.field_type.as_str()
                    )));
                }
            }
            if self.rank_fields[..i].contains(name) {
                return Err(CollectionError::Config(format!("rank field `{name}` listed twice")));
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> Schema {
        Schema::new(&self.fields)
    }
}

/// Fields by name, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
    positions: HashMap<String, usize>,
}

impl Schema {
    pub fn new(fields: &[Field]) -> Self {
        let mut positions = HashMap::with_capacity(fields.len());
        let mut kept = Vec::with_capacity(fields.len());
        for field in fields {
            if !positions.contains_key(&field.name) {
                positions.insert(field.name.clone(), kept.len());
                kept.push(field.clone());
            }
        }
        Self {
            fields: kept,
            positions,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.positions.get(name).map(|&i| &self.fields[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
