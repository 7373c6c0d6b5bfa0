//! Parameter schemas for registered functions
//!
//! A small subset of JSON Schema: a flat object of typed, optionally
//! required properties. Rendered to JSON Schema for the model and used to
//! validate the arguments it sends back.

use serde_json::{Map, Value, json};

/// Type of a single parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
}

impl ParamType {
    const fn json_type(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        let ok = match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Enum(allowed) => {
                let Some(s) = value.as_str() else {
                    return Err(format!("expected one of {allowed:?}, got {value}"));
                };
                if !allowed.iter().any(|a| a == s) {
                    return Err(format!("expected one of {allowed:?}, got \"{s}\""));
                }
                true
            }
        };

        if ok {
            Ok(())
        } else {
            Err(format!("expected {}, got {value}", self.json_type()))
        }
    }
}

/// One named parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Flat object schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSchema {
    params: Vec<Parameter>,
}

impl ParameterSchema {
    /// Schema with no parameters
    #[must_use]
    pub const fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a required parameter
    #[must_use]
    pub fn required(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.with(name, kind, description, true)
    }

    /// Add an optional parameter
    #[must_use]
    pub fn optional(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.with(name, kind, description, false)
    }

    fn with(mut self, name: &str, kind: ParamType, description: &str, required: bool) -> Self {
        self.params.push(Parameter {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required,
        });
        self
    }

    /// Declared parameters
    #[must_use]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Check arguments against the schema
    ///
    /// `null` is accepted as an empty object. Unknown keys are rejected.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found
    pub fn validate(&self, arguments: &Value) -> Result<(), String> {
        let empty = Map::new();
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return Err(format!("arguments must be an object, got {other}")),
        };

        for param in &self.params {
            match object.get(&param.name) {
                Some(value) => param
                    .kind
                    .check(value)
                    .map_err(|e| format!("parameter `{}`: {e}", param.name))?,
                None if param.required => {
                    return Err(format!("missing required parameter `{}`", param.name));
                }
                None => {}
            }
        }

        if let Some(unknown) = object
            .keys()
            .find(|k| !self.params.iter().any(|p| &p.name == *k))
        {
            return Err(format!("unexpected parameter `{unknown}`"));
        }

        Ok(())
    }

    /// Render as a JSON Schema object
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut prop = json!({
                "type": param.kind.json_type(),
                "description": param.description,
            });
            if let ParamType::Enum(values) = &param.kind {
                prop["enum"] = json!(values);
            }
            properties.insert(param.name.clone(), prop);
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
