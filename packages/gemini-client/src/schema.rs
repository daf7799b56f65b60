//! Type-safe schema generation for Gemini structured outputs.
//!
//! Uses the `schemars` crate to automatically generate JSON schemas from
//! Rust types, then strips the keywords Gemini's `responseSchema` rejects.
//!
//! # Example
//!
//! ```rust,ignore
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//! use gemini_client::StructuredOutput;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct Grade {
//!     score: f32,
//!     reason: String,
//! }
//!
//! let schema = Grade::gemini_schema();
//! ```

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Trait for types that can be used as Gemini structured output.
///
/// Automatically implemented for any type that implements
/// `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate a Gemini-compatible JSON schema for this type.
    ///
    /// Gemini's `responseSchema` accepts an OpenAPI-style subset; `$schema`,
    /// `$ref` definitions metadata, and `additionalProperties` are removed.
    fn gemini_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();
        sanitize_for_gemini(&mut value);
        value
    }

    /// Get the schema name for this type.
    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

// Blanket implementation for all types that satisfy the bounds
impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Strip schema keywords the Gemini API rejects.
fn sanitize_for_gemini(value: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        map.remove("$schema");
        map.remove("additionalProperties");
        map.remove("title");

        for (_, v) in map.iter_mut() {
            sanitize_for_gemini(v);
        }
    } else if let serde_json::Value::Array(arr) = value {
        for item in arr.iter_mut() {
            sanitize_for_gemini(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct TestGrade {
        score: f32,
        reason: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct TestBatch {
        grades: Vec<TestGrade>,
    }

    #[test]
    fn test_schema_has_no_meta_keywords() {
        let schema = TestBatch::gemini_schema();
        let schema_str = serde_json::to_string(&schema).unwrap();

        assert!(!schema_str.contains("$schema"));
        assert!(!schema_str.contains("additionalProperties"));
    }

    #[test]
    fn test_schema_is_object() {
        let schema = TestBatch::gemini_schema();
        assert!(schema.is_object());
    }
}
