use serde_json::{json, Value};

use crate::core::tooling::outcome::UserError;

pub(crate) fn sandbox_error(code: &str, message: &str, details: Value) -> UserError {
    let mut merged = details;
    match merged {
        Value::Object(ref mut map) => {
            map.insert("code".into(), Value::String(code.to_string()));
        }
        _ => {
            merged = json!({
                "code": code,
                "details": merged,
            });
        }
    }
    UserError::new(message, merged)
}
