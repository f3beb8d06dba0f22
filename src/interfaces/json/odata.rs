use crate::error::{RelayError, Result};
use serde_json::Value;

/// Pulls the effective payload out of an OData response envelope (`{"value": ...}`).
///
/// String values are returned as-is, anything else is re-serialized as compact JSON.
pub fn extract_value(body: &str) -> Result<String> {
    let envelope: Value = serde_json::from_str(body)?;
    match envelope.get("value") {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(RelayError::Parse(
            "response envelope has no 'value' field".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_string_value() {
        let body = r#"{"@odata.context":"https://bc/$metadata#Edm.String","value":"SI-0001 created"}"#;
        assert_eq!(extract_value(body).unwrap(), "SI-0001 created");
    }

    #[test]
    fn test_extract_object_value() {
        let body = r#"{"value":{"no":"SI-0001"}}"#;
        assert_eq!(extract_value(body).unwrap(), r#"{"no":"SI-0001"}"#);
    }

    #[test]
    fn test_missing_value_is_parse_error() {
        assert!(matches!(
            extract_value(r#"{"error":"x"}"#),
            Err(RelayError::Parse(_))
        ));
        assert!(matches!(extract_value("plain text"), Err(RelayError::Json(_))));
    }
}
