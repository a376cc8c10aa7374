//! Flattening of raw table entities into the string-keyed form held in
//! state.
//!
//! A full-metadata read returns the user's properties mixed with service
//! metadata (`odata.*` keys, the reserved `PartitionKey`/`RowKey`/
//! `Timestamp` properties) and per-property type annotations under the
//! `{name}@odata.type` sibling-key convention. State stores everything as
//! strings, so each property is stringified and its type annotation is kept
//! (or synthesized) alongside it so a later write reproduces the remote
//! type.

use azdata::entities::EntityValue;
use std::collections::HashMap;

const RESERVED_KEYS: [&str; 3] = ["PartitionKey", "RowKey", "Timestamp"];
const ODATA_METADATA_PREFIX: &str = "odata.";
const TYPE_ANNOTATION_SUFFIX: &str = "@odata.type";

/// The primitive type tags the table service and this codec recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmType {
    Boolean,
    Double,
    Int32,
    Int64,
    String,
}

impl EdmType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Edm.Boolean" => Some(EdmType::Boolean),
            "Edm.Double" => Some(EdmType::Double),
            "Edm.Int32" => Some(EdmType::Int32),
            "Edm.Int64" => Some(EdmType::Int64),
            "Edm.String" => Some(EdmType::String),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EdmType::Boolean => "Edm.Boolean",
            EdmType::Double => "Edm.Double",
            EdmType::Int32 => "Edm.Int32",
            EdmType::Int64 => "Edm.Int64",
            EdmType::String => "Edm.String",
        }
    }
}

/// Converts a raw entity record into the flat string-to-string mapping
/// stored in state.
///
/// Reserved properties and service-level OData metadata are discarded.
/// Properties whose type cannot be determined are dropped with a warning
/// rather than failing the whole record: a single unrecognized field must
/// not make a remote entity unreadable.
pub fn flatten_entity(entity: &HashMap<String, EntityValue>) -> HashMap<String, String> {
    let mut result = HashMap::new();

    for (key, value) in entity {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        // Skip the OData annotations returned with full metadata; type
        // annotations are consumed through their target property below.
        if key.starts_with(ODATA_METADATA_PREFIX) || key.ends_with(TYPE_ANNOTATION_SUFFIX) {
            continue;
        }

        let annotation_key = format!("{}{}", key, TYPE_ANNOTATION_SUFFIX);
        match entity.get(&annotation_key) {
            Some(EntityValue::String(type_name)) => {
                if EdmType::from_name(type_name).is_none() {
                    tracing::warn!(key = %key, r#type = %type_name, "key with unexpected @odata.type");
                    continue;
                }

                // All recognized types stringify to the value's natural
                // form. Edm.Double in particular must not go through a
                // fixed-precision format: `123.123` would become
                // `"123.123000"` and fail to round-trip. Int64 values
                // already arrive as decimal strings.
                result.insert(key.clone(), stringify(value));
                result.insert(annotation_key, type_name.clone());
            }
            Some(other) => {
                tracing::warn!(key = %key, kind = other.kind(), "non-string @odata.type annotation");
                continue;
            }
            None => match value {
                // Property types that do not require the annotation to be
                // present:
                // https://docs.microsoft.com/en-us/rest/api/storageservices/payload-format-for-table-service-operations#property-types-in-a-json-feed
                EntityValue::Bool(b) => {
                    result.insert(key.clone(), b.to_string());
                    result.insert(annotation_key, EdmType::Boolean.name().to_string());
                }
                EntityValue::Number(n) => {
                    let truncated = *n as i64;
                    if *n == truncated as f64 {
                        result.insert(key.clone(), truncated.to_string());
                        result.insert(annotation_key, EdmType::Int32.name().to_string());
                    } else {
                        result.insert(key.clone(), n.to_string());
                        result.insert(annotation_key, EdmType::Double.name().to_string());
                    }
                }
                // String is the implicit default and carries no tag.
                EntityValue::String(s) => {
                    result.insert(key.clone(), s.clone());
                }
                other => {
                    tracing::warn!(key = %key, kind = other.kind(), "key with unexpected value kind");
                }
            },
        }
    }

    result
}

fn stringify(value: &EntityValue) -> String {
    match value {
        EntityValue::Bool(b) => b.to_string(),
        EntityValue::Number(n) => n.to_string(),
        EntityValue::String(s) => s.clone(),
        EntityValue::Null => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, EntityValue)]) -> HashMap<String, EntityValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn s(value: &str) -> EntityValue {
        EntityValue::String(value.to_string())
    }

    #[test]
    fn annotated_boolean_is_stringified_and_keeps_its_annotation() {
        for value in [true, false] {
            let flattened = flatten_entity(&raw(&[
                ("active", EntityValue::Bool(value)),
                ("active@odata.type", s("Edm.Boolean")),
            ]));

            assert_eq!(flattened["active"], value.to_string());
            assert_eq!(flattened["active@odata.type"], "Edm.Boolean");
        }
    }

    #[test]
    fn annotated_double_keeps_its_natural_decimal_form() {
        let flattened = flatten_entity(&raw(&[
            ("ratio", EntityValue::Number(123.123)),
            ("ratio@odata.type", s("Edm.Double")),
        ]));

        assert_eq!(flattened["ratio"], "123.123");
        assert_eq!(flattened["ratio@odata.type"], "Edm.Double");
    }

    #[test]
    fn annotated_int64_string_passes_through() {
        let flattened = flatten_entity(&raw(&[
            ("big", s("9007199254740993")),
            ("big@odata.type", s("Edm.Int64")),
        ]));

        assert_eq!(flattened["big"], "9007199254740993");
        assert_eq!(flattened["big@odata.type"], "Edm.Int64");
    }

    #[test]
    fn integral_number_is_inferred_as_int32() {
        let flattened = flatten_entity(&raw(&[("count", EntityValue::Number(42.0))]));

        assert_eq!(flattened["count"], "42");
        assert_eq!(flattened["count@odata.type"], "Edm.Int32");
    }

    #[test]
    fn negative_integral_number_is_inferred_as_int32() {
        let flattened = flatten_entity(&raw(&[("delta", EntityValue::Number(-7.0))]));

        assert_eq!(flattened["delta"], "-7");
        assert_eq!(flattened["delta@odata.type"], "Edm.Int32");
    }

    #[test]
    fn fractional_number_is_inferred_as_double() {
        let flattened = flatten_entity(&raw(&[("ratio", EntityValue::Number(3.5))]));

        assert_eq!(flattened["ratio"], "3.5");
        assert_eq!(flattened["ratio@odata.type"], "Edm.Double");
    }

    #[test]
    fn bare_boolean_is_inferred() {
        let flattened = flatten_entity(&raw(&[("active", EntityValue::Bool(true))]));

        assert_eq!(flattened["active"], "true");
        assert_eq!(flattened["active@odata.type"], "Edm.Boolean");
    }

    #[test]
    fn bare_string_gets_no_annotation() {
        let flattened = flatten_entity(&raw(&[("name", s("x"))]));

        assert_eq!(flattened["name"], "x");
        assert!(!flattened.contains_key("name@odata.type"));
    }

    #[test]
    fn reserved_keys_never_appear_in_the_output() {
        let flattened = flatten_entity(&raw(&[
            ("PartitionKey", s("p")),
            ("RowKey", s("r")),
            ("Timestamp", s("2024-01-01T00:00:00Z")),
            ("name", s("x")),
        ]));

        assert_eq!(flattened.len(), 1);
        assert_eq!(flattened["name"], "x");
    }

    #[test]
    fn service_metadata_and_annotation_keys_are_not_copied_verbatim() {
        let flattened = flatten_entity(&raw(&[
            ("odata.etag", s("W/\"datetime'2024-01-01'\"")),
            ("odata.metadata", s("https://acc1.table.core.windows.net/$metadata#t1")),
            ("foo", s("bar")),
            ("foo@odata.type", s("Edm.String")),
        ]));

        assert!(!flattened.contains_key("odata.etag"));
        assert!(!flattened.contains_key("odata.metadata"));
        // The annotation is consumed through `foo`, then re-emitted.
        assert_eq!(flattened["foo"], "bar");
        assert_eq!(flattened["foo@odata.type"], "Edm.String");
        assert_eq!(flattened.len(), 2);
    }

    #[test]
    fn unrecognized_edm_type_drops_the_key_but_not_the_record() {
        let flattened = flatten_entity(&raw(&[
            ("status", s("AAECAw==")),
            ("status@odata.type", s("Edm.Unsupported")),
            ("name", s("x")),
        ]));

        assert!(!flattened.contains_key("status"));
        assert!(!flattened.contains_key("status@odata.type"));
        assert_eq!(flattened["name"], "x");
    }

    #[test]
    fn non_string_annotation_drops_the_key() {
        let flattened = flatten_entity(&raw(&[
            ("weird", s("v")),
            ("weird@odata.type", EntityValue::Number(1.0)),
            ("name", s("x")),
        ]));

        assert!(!flattened.contains_key("weird"));
        assert_eq!(flattened["name"], "x");
    }

    #[test]
    fn null_values_are_skipped_with_the_rest_preserved() {
        let flattened = flatten_entity(&raw(&[
            ("gone", EntityValue::Null),
            ("name", s("x")),
        ]));

        assert!(!flattened.contains_key("gone"));
        assert_eq!(flattened["name"], "x");
    }

    #[test]
    fn flattening_is_idempotent() {
        let first = flatten_entity(&raw(&[
            ("count", EntityValue::Number(3.0)),
            ("count@odata.type", s("Edm.Int64")),
            ("active", EntityValue::Bool(true)),
            ("ratio", EntityValue::Number(3.5)),
            ("name", s("x")),
        ]));

        // Re-decode the output as a raw record of plain strings.
        let as_raw: HashMap<String, EntityValue> = first
            .iter()
            .map(|(k, v)| (k.clone(), s(v)))
            .collect();
        let second = flatten_entity(&as_raw);

        assert_eq!(second, first);
    }

    #[test]
    fn full_metadata_record_flattens_end_to_end() {
        let flattened = flatten_entity(&raw(&[
            ("PartitionKey", s("p")),
            ("RowKey", s("r")),
            ("Timestamp", s("t")),
            ("count", EntityValue::Number(3.0)),
            ("count@odata.type", s("Edm.Int64")),
            ("active", EntityValue::Bool(true)),
            ("name", s("x")),
        ]));

        let expected: HashMap<String, String> = [
            ("count", "3"),
            ("count@odata.type", "Edm.Int64"),
            ("active", "true"),
            ("active@odata.type", "Edm.Boolean"),
            ("name", "x"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(flattened, expected);
    }
}
