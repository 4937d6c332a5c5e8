//! Schema validation for book payloads.
//!
//! The schema is an ordinary JSON Schema document compiled with `jsonschema`.
//! Violations are reported, never raised, as an ordered list of messages
//! prefixed with the offending location, e.g. `instance.pages: ...`.

use std::path::Path;

use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

const BUILTIN_SCHEMA: &str = include_str!("../../../config/book_schema.json");

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("schema document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid schema document: {0}")]
    Invalid(String),
}

/// Which constraints apply to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every required property must be present.
    Create,
    /// Properties may be omitted; the ones supplied are still checked.
    Update,
}

/// Outcome of validating one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

/// A compiled book schema.
///
/// Update payloads are checked against a copy of the document without its
/// top-level `required` list.
pub struct BookSchema {
    document: Value,
    create: Validator,
    update: Validator,
}

fn compile(document: &Value) -> Result<Validator, SchemaError> {
    jsonschema::validator_for(document).map_err(|e| SchemaError::Invalid(e.to_string()))
}

/// `/pages` => `instance.pages`, `` => `instance`
fn location(pointer: &str) -> String {
    let mut location = String::from("instance");
    for segment in pointer.split('/').skip(1) {
        location.push('.');
        location.push_str(&segment.replace("~1", "/").replace("~0", "~"));
    }
    location
}

impl BookSchema {
    /// The schema shipped in `config/book_schema.json`.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_json_str(BUILTIN_SCHEMA)
    }

    pub fn from_value(document: Value) -> Result<Self, SchemaError> {
        let create = compile(&document)?;

        let mut relaxed = document.clone();
        if let Some(object) = relaxed.as_object_mut() {
            object.remove("required");
        }
        let update = compile(&relaxed)?;

        Ok(Self {
            document,
            create,
            update,
        })
    }

    pub fn from_json_str(document: &str) -> Result<Self, SchemaError> {
        Self::from_value(serde_json::from_str(document)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let document = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&document)
    }

    /// Load the configured schema document, or the built-in schema when none is set.
    pub fn load(path: Option<&Path>) -> Result<Self, SchemaError> {
        match path {
            Some(path) => {
                let schema = Self::from_file(path)?;
                tracing::info!(path = %path.display(), "loaded book schema");
                Ok(schema)
            }
            None => Self::builtin(),
        }
    }

    /// The schema document as loaded
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Names listed in the document's top-level `required`
    pub fn required(&self) -> Vec<&str> {
        self.document
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Check `instance` against the schema.
    pub fn validate(&self, instance: &Value, mode: ValidationMode) -> ValidationReport {
        let validator = match mode {
            ValidationMode::Create => &self.create,
            ValidationMode::Update => &self.update,
        };

        let errors = validator
            .iter_errors(instance)
            .map(|error| format!("{}: {}", location(error.instance_path.as_str()), error))
            .collect();

        ValidationReport { errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    const BOOK_FIELDS: [&str; 8] = [
        "isbn",
        "amazon_url",
        "author",
        "language",
        "pages",
        "publisher",
        "title",
        "year",
    ];

    fn builtin() -> BookSchema {
        BookSchema::builtin().unwrap()
    }

    fn valid_payload() -> Value {
        json!({
            "isbn": "DM062865",
            "amazon_url": "https://amazon.com/x",
            "author": "Myatt",
            "language": "English",
            "pages": 400,
            "publisher": "ChiBorn",
            "title": "Dad's First Published",
            "year": 2021
        })
    }

    #[test]
    fn valid_payload_passes_both_modes() {
        let schema = builtin();
        assert!(schema.validate(&valid_payload(), ValidationMode::Create).is_valid());
        assert!(schema.validate(&valid_payload(), ValidationMode::Update).is_valid());
    }

    #[test]
    fn every_missing_field_is_reported() {
        let report = builtin().validate(
            &json!({ "title": "Money Being Made" }),
            ValidationMode::Create,
        );

        assert_eq!(report.errors().len(), 7);
        for field in BOOK_FIELDS.iter().filter(|field| **field != "title") {
            let quoted = format!("\"{}\"", field);
            assert!(
                report
                    .errors()
                    .iter()
                    .any(|e| e.starts_with("instance: ") && e.contains(&quoted)),
                "{field} not reported in {:?}",
                report.errors()
            );
        }
    }

    #[test]
    fn update_mode_skips_required_but_checks_types() {
        let schema = builtin();

        assert!(schema
            .validate(&json!({ "year": 2019 }), ValidationMode::Update)
            .is_valid());

        let report = schema.validate(
            &json!({ "pages": "two hundred", "year": 2019.5 }),
            ValidationMode::Update,
        );
        let errors = report.into_errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.starts_with("instance.pages: ")));
        assert!(errors.iter().any(|e| e.starts_with("instance.year: ")));
    }

    #[test]
    fn whole_number_floats_are_integers() {
        let mut payload = valid_payload();
        payload["pages"] = json!(400.0);

        assert!(builtin().validate(&payload, ValidationMode::Create).is_valid());
    }

    #[rstest]
    #[case(json!({ "isbn": "" }), "instance.isbn: ")]
    #[case(json!({ "pages": 0 }), "instance.pages: ")]
    #[case(json!({ "title": null }), "instance.title: ")]
    #[case(json!({ "pages": 12, "rating": 5 }), "instance: ")]
    #[case(json!(["not", "an", "object"]), "instance: ")]
    fn single_violation_is_reported(#[case] payload: Value, #[case] prefix: &str) {
        let report = builtin().validate(&payload, ValidationMode::Update);

        assert_eq!(report.errors().len(), 1, "{:?}", report.errors());
        assert!(report.errors()[0].starts_with(prefix), "{:?}", report.errors());
    }

    #[test]
    fn configured_keywords_are_enforced() {
        let schema = BookSchema::from_value(json!({
            "required": ["isbn"],
            "properties": {
                "isbn": { "type": "string", "maxLength": 3, "pattern": "^[0-9]+$" },
                "language": { "enum": ["English", "Spanish"] }
            }
        }))
        .unwrap();

        let report = schema.validate(
            &json!({ "isbn": "TOOLONG-abc", "language": "Klingon" }),
            ValidationMode::Create,
        );

        let errors = report.into_errors();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.starts_with("instance.isbn: "))
                .count(),
            2
        );
        assert!(errors.iter().any(|e| e.starts_with("instance.language: ")));
    }

    #[test]
    fn type_unions_are_supported() {
        let schema = BookSchema::from_json_str(
            r#"{ "properties": { "year": { "type": ["integer", "null"] } } }"#,
        )
        .unwrap();

        assert!(schema
            .validate(&json!({ "year": null }), ValidationMode::Create)
            .is_valid());
        assert!(!schema
            .validate(&json!({ "year": "1965" }), ValidationMode::Create)
            .is_valid());
    }

    #[test]
    fn relaxed_schema_allows_extra_properties() {
        let schema = BookSchema::from_json_str(
            r#"{ "required": ["isbn"], "properties": { "isbn": { "type": "string" } } }"#,
        )
        .unwrap();

        let report = schema.validate(&json!({ "isbn": "1", "notes": "signed" }), ValidationMode::Create);
        assert!(report.is_valid());
    }

    #[test]
    fn malformed_schema_is_rejected() {
        let err = BookSchema::from_json_str(r#"{ "type": 5 }"#).err().unwrap();
        assert!(matches!(err, SchemaError::Invalid(_)), "{err:?}");

        let err = BookSchema::from_json_str("{ \"type\": ").err().unwrap();
        assert!(matches!(err, SchemaError::Parse(_)), "{err:?}");
    }

    #[test]
    fn builtin_requires_every_book_field() {
        assert_eq!(builtin().required(), BOOK_FIELDS.to_vec());
        assert_eq!(builtin().document()["additionalProperties"], json!(false));
    }

    #[test]
    fn missing_schema_file_is_an_io_error() {
        let err = BookSchema::load(Some(Path::new("does/not/exist.json")))
            .err()
            .unwrap();
        assert!(matches!(err, SchemaError::Io { .. }), "{err:?}");
    }

    #[test]
    fn location_follows_json_pointer() {
        assert_eq!(location(""), "instance");
        assert_eq!(location("/pages"), "instance.pages");
        assert_eq!(location("/a~1b/0"), "instance.a/b.0");
    }
}
