//! Tool Schema Helpers
//!
//! All skills describe themselves with the function-calling envelope
//! `{type: "function", function: {name, description, parameters}}`.

use serde_json::{json, Value};

/// Builder for a tool schema in the function-calling envelope
#[derive(Debug, Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }

    pub fn string_param(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({"type": "string", "description": description}),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn int_param(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({"type": "integer", "description": description}),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn bool_param(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({"type": "boolean", "description": description}),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn number_param(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({"type": "number", "description": description}),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn object_param(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({"type": "object", "description": description}),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn enum_param(
        mut self,
        name: &str,
        description: &str,
        values: &[&str],
        required: bool,
    ) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({"type": "string", "description": description, "enum": values}),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Render the full function-calling envelope
    pub fn build(self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": Value::Object(self.properties),
                    "required": self.required,
                }
            }
        })
    }
}

/// Extract `function.name` from a tool schema, if present
pub fn function_name(schema: &Value) -> Option<&str> {
    schema.get("function")?.get("name")?.as_str()
}

/// Extract `function.description` from a tool schema
pub fn function_description(schema: &Value) -> Option<&str> {
    schema.get("function")?.get("description")?.as_str()
}

/// Extract `function.parameters.properties` from a tool schema
pub fn function_properties(schema: &Value) -> Option<&serde_json::Map<String, Value>> {
    schema
        .get("function")?
        .get("parameters")?
        .get("properties")?
        .as_object()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let schema = ToolSpec::new("weather", "Get current weather")
            .string_param("location", "City name", true)
            .int_param("days", "Forecast days", false)
            .build();

        assert_eq!(schema["type"], "function");
        assert_eq!(function_name(&schema), Some("weather"));
        assert_eq!(
            schema["function"]["parameters"]["properties"]["location"]["type"],
            "string"
        );
        assert_eq!(schema["function"]["parameters"]["required"][0], "location");
    }

    #[test]
    fn test_function_name_missing() {
        let bare = serde_json::json!({"name": "no_envelope"});
        assert_eq!(function_name(&bare), None);
    }

    #[test]
    fn test_enum_param() {
        let schema = ToolSpec::new("notes", "Notes")
            .enum_param("action", "Operation", &["create", "append"], true)
            .build();

        let action = &schema["function"]["parameters"]["properties"]["action"];
        assert_eq!(action["enum"][0], "create");
    }
}
