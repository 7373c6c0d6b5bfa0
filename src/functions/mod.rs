//! Functions the language model may call mid-turn

mod registry;
mod schema;

pub use registry::{
    FnHandler, FunctionDefinition, FunctionDescriptor, FunctionHandler, FunctionRegistry,
    handler_fn,
};
pub use schema::{ParamType, Parameter, ParameterSchema};

use serde::{Deserialize, Serialize};

/// A function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Provider-assigned call ID, echoed back with the result
    pub id: String,
    pub name: String,
    /// JSON object of arguments
    pub arguments: serde_json::Value,
}

impl FunctionCall {
    /// Build a call with a generated ID
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}
