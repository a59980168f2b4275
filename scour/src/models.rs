//! Document model: JSON parsing and schema validation.
//!
//! A `Document` is only ever constructed from input that passed validation, so
//! the indexer can take its typed values at face value.

use crate::config::{FieldType, Schema};
use crate::interface::ValidationError;
use serde_json::{Map, Value};

/// Ids generated for documents that arrive without one start with this.
/// Client ids may not, so a generated id never collides with a client's.
pub const GENERATED_ID_PREFIX: char = '$';

// ─────────────────────────────────────────────────────────────────────────────
// FIELD VALUES
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    String(String),
    Int32(i32),
}


/// JSON type name used in validation messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DOCUMENT
// ─────────────────────────────────────────────────────────────────────────────

/// A validated document ready to be stored and indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    doc_id: Option<String>,
    body: Map<String, Value>,
    /// One value per schema field, in schema order.
    values: Vec<FieldValue>,
    primary_score: i64,
    secondary_score: i64,
}

impl Document {
    /// Parse client input. Unlike [`Document::from_value`], which also reads
    /// stored records, this rejects ids in the generated namespace.
    pub fn parse(text: &str, schema: &Schema, rank_fields: &[String]) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let doc = Self::from_value(value, schema, rank_fields)?;
        match doc.doc_id() {
            Some(id) if id.starts_with(GENERATED_ID_PREFIX) => Err(ValidationError::ReservedId(id.to_string())),
            _ => Ok(doc),
        }
    }

    pub fn from_value(value: Value, schema: &Schema, rank_fields: &[String]) -> Result<Self, ValidationError> {
        let Value::Object(body) = value else {
            return Err(ValidationError::NotAnObject);
        };

        let doc_id = match body.get("id") {
            None => None,
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(_) => return Err(ValidationError::InvalidId),
        };

        let values = schema
            .fields()
            .iter()
            .map(|field| {
                let raw = body.get(&field.name).ok_or_else(|| ValidationError::MissingField {
                    field: field.name.clone(),
                })?;
                typed_value(&field.name, field.field_type, raw)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rank = |slot: usize| -> Result<i64, ValidationError> {
            let Some(name) = rank_fields.get(slot) else {
                return Ok(0);
            };
            let raw = body
                .get(name)
                .ok_or_else(|| ValidationError::MissingField { field: name.clone() })?;
            rank_value(name, raw)
        };
        let primary_score = rank(0)?;
        let secondary_score = rank(1)?;

        Ok(Self {
            doc_id,
            body,
            values,
            primary_score,
            secondary_score,
        })
    }

    /// The client id, if the document carried one.
    pub fn doc_id(&self) -> Option<&str> {
        self.doc_id.as_deref()
    }

    /// Fill in a generated id (`$` + `seq_id`) when the document has none,
    /// returning the id the document is stored under.
    pub fn assign_id(&mut self, seq_id: u32) -> String {
        match &self.doc_id {
            Some(id) => id.clone(),
            None => {
                let id = format!("{GENERATED_ID_PREFIX}{seq_id}");
                self.body.insert("id".to_string(), Value::String(id.clone()));
                self.doc_id = Some(id.clone());
                id
            }
        }
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn primary_score(&self) -> i64 {
        self.primary_score
    }

    pub fn secondary_score(&self) -> i64 {
        self.secondary_score
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.body.clone())
    }

    /// Stored representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

fn typed_value(name: &str, field_type: FieldType, raw: &Value) -> Result<FieldValue, ValidationError> {
    match (field_type, raw) {
        (FieldType::String, Value::String(s)) => Ok(FieldValue::String(s.clone())),
        (FieldType::Int32, Value::Number(n)) if !n.is_f64() => {
            let wide = n.as_i64().ok_or_else(|| out_of_range(name, raw))?;
            let value = i32::try_from(wide).map_err(|_| out_of_range(name, raw))?;
            Ok(FieldValue::Int32(value))
        }
        _ => Err(ValidationError::TypeMismatch {
            field: name.to_string(),
            expected: field_type.as_str(),
            actual: json_type_name(raw),
        }),
    }
}

fn rank_value(name: &str, raw: &Value) -> Result<i64, ValidationError> {
    match raw {
        Value::Number(n) if !n.is_f64() => n.as_i64().ok_or_else(|| ValidationError::OutOfRange {
            field: name.to_string(),
            value: raw.to_string(),
            expected: "i64",
        }),
        _ => Err(ValidationError::TypeMismatch {
            field: name.to_string(),
            expected: "integer",
            actual: json_type_name(raw),
        }),
    }
}

fn out_of_range(name: &str, raw: &Value) -> ValidationError {
    ValidationError::OutOfRange {
        field: name.to_string(),
        value: raw.to_string(),
        expected: "int32",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Field;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(&[Field::string("title"), Field::int32("popularity")])
    }

    fn ranks() -> Vec<String> {
        vec!["popularity".to_string()]
    }

    #[test]
    fn test_parse_valid_document() {
        let doc = Document::parse(
            r#"{"id": "b1", "title": "Quick brown fox", "popularity": 10, "extra": [1, 2]}"#,
            &schema(),
            &ranks(),
        )
        .unwrap();
        assert_eq!(doc.doc_id(), Some("b1"));
        assert_eq!(
            doc.values(),
            &[FieldValue::String("Quick brown fox".into()), FieldValue::Int32(10)]
        );
        assert_eq!(doc.primary_score(), 10);
        assert_eq!(doc.secondary_score(), 0);
        assert_eq!(doc.to_json()["extra"], json!([1, 2]));
    }

    #[test]
    fn test_assign_id_only_when_missing() {
        let mut doc = Document::parse(r#"{"title": "x", "popularity": 1}"#, &schema(), &[]).unwrap();
        assert_eq!(doc.doc_id(), None);
        assert_eq!(doc.assign_id(17), "$17");
        assert_eq!(doc.to_json()["id"], json!("$17"));

        let mut named = Document::parse(r#"{"id": "keep", "title": "x", "popularity": 1}"#, &schema(), &[]).unwrap();
        assert_eq!(named.assign_id(3), "keep");
    }

    #[test]
    fn test_stored_generated_id_reads_back() {
        let stored = json!({"id": "$4", "title": "x", "popularity": 1});
        let doc = Document::from_value(stored, &schema(), &[]).unwrap();
        assert_eq!(doc.doc_id(), Some("$4"));
    }

    #[test]
    fn test_rejections() {
        let cases = [
            ("{not json", "malformed"),
            ("[1, 2]", "object"),
            (r#"{"id": 5, "title": "x", "popularity": 1}"#, "id"),
            (r#"{"id": "", "title": "x", "popularity": 1}"#, "id"),
            (r#"{"id": "$3", "title": "x", "popularity": 1}"#, "reserved"),
            (r#"{"popularity": 1}"#, "missing"),
            (r#"{"title": 12, "popularity": 1}"#, "mismatch"),
            (r#"{"title": "x", "popularity": "high"}"#, "mismatch"),
            (r#"{"title": "x", "popularity": 1.5}"#, "mismatch"),
            (r#"{"title": "x", "popularity": 3000000000}"#, "range"),
        ];
        for (text, kind) in cases {
            let err = Document::parse(text, &schema(), &ranks()).unwrap_err();
            let ok = match kind {
                "malformed" => matches!(err, ValidationError::Malformed(_)),
                "object" => err == ValidationError::NotAnObject,
                "id" => err == ValidationError::InvalidId,
                "reserved" => err == ValidationError::ReservedId("$3".to_string()),
                "missing" => matches!(err, ValidationError::MissingField { ref field } if field == "title"),
                "mismatch" => matches!(err, ValidationError::TypeMismatch { .. }),
                "range" => matches!(err, ValidationError::OutOfRange { .. }),
                _ => false,
            };
            assert!(ok, "{text} gave {err:?}");
        }
    }

    #[test]
    fn test_type_mismatch_names_types() {
        let err = Document::parse(r#"{"title": true, "popularity": 1}"#, &schema(), &[]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TypeMismatch {
                field: "title".into(),
                expected: "string",
                actual: "boolean",
            }
        );
    }

    #[test]
    fn test_int32_bounds() {
        for (value, ok) in [(i32::MIN as i64, true), (i32::MAX as i64, true), (i32::MAX as i64 + 1, false)] {
            let text = format!(r#"{{"title": "x", "popularity": {value}}}"#);
            assert_eq!(Document::parse(&text, &schema(), &[]).is_ok(), ok, "{value}");
        }
    }

    #[test]
    fn test_rank_field_outside_schema() {
        let schema = Schema::new(&[Field::string("title")]);
        let rank_fields = vec!["score".to_string(), "age".to_string()];

        let doc = Document::parse(r#"{"title": "x", "score": 99, "age": -4}"#, &schema, &rank_fields).unwrap();
        assert_eq!((doc.primary_score(), doc.secondary_score()), (99, -4));

        let err = Document::parse(r#"{"title": "x", "score": 99}"#, &schema, &rank_fields).unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "age".into() });
    }
}
