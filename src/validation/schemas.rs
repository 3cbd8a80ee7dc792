use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

/// Compiled JSON schemas for request payloads checked before deserialization.
pub struct SchemaRegistry {
    pub withdrawal_v1: JSONSchema,
    pub lead_v1: JSONSchema,
}

impl SchemaRegistry {
    fn new() -> Result<Self, String> {
        Ok(Self {
            withdrawal_v1: compile("withdrawal", &withdrawal_schema_v1())?,
            lead_v1: compile("lead", &lead_schema_v1())?,
        })
    }
}

fn compile(name: &str, schema: &Value) -> Result<JSONSchema, String> {
    JSONSchema::compile(schema).map_err(|e| format!("{} schema: {}", name, e))
}

/// Global schema registry with cached compiled schemas.
pub static SCHEMAS: Lazy<Result<SchemaRegistry, String>> = Lazy::new(SchemaRegistry::new);

fn withdrawal_schema_v1() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["amount", "bank_account_id", "pin"],
        "additionalProperties": false,
        "properties": {
            "amount": {
                "oneOf": [
                    {"type": "number", "exclusiveMinimum": 0},
                    {"type": "string", "pattern": "^[0-9]+(\\.[0-9]{1,2})?$", "maxLength": 20}
                ],
                "description": "Amount in naira"
            },
            "bank_account_id": {
                "type": "string",
                "format": "uuid"
            },
            "pin": {
                "type": "string",
                "pattern": "^[0-9]{4}$"
            }
        }
    })
}

fn lead_schema_v1() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["property_id", "name", "email"],
        "additionalProperties": false,
        "properties": {
            "property_id": {"type": "string", "format": "uuid"},
            "name": {"type": "string", "minLength": 1, "maxLength": 120},
            "email": {"type": "string", "pattern": "^[^@\\s]+@[^@\\s]+$", "maxLength": 254},
            "phone": {"type": ["string", "null"], "maxLength": 32},
            "message": {"type": ["string", "null"], "maxLength": 2000},
            "promotion_code": {"type": ["string", "null"], "maxLength": 32}
        }
    })
}
