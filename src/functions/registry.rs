//! Named function registry and dispatch

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::ParameterSchema;
use crate::error::HandlerError;
use crate::{Error, Result};

/// Executes a registered function
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Run the function with already-validated arguments
    async fn call(&self, arguments: Value) -> std::result::Result<Value, HandlerError>;
}

/// Adapts an async closure into a [`FunctionHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> FunctionHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, HandlerError>> + Send,
{
    async fn call(&self, arguments: Value) -> std::result::Result<Value, HandlerError> {
        (self.0)(arguments).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn FunctionHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A function the model can call
#[derive(Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    pub handler: Arc<dyn FunctionHandler>,
}

impl FunctionDescriptor {
    /// Create a descriptor
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: Arc<dyn FunctionHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Model-facing description of a function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object
    pub parameters: Value,
}

/// Set of functions keyed by unique name
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, FunctionDescriptor>,
}

impl FunctionRegistry {
    /// Create an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// Register a function
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateName` if the name is taken; the existing
    /// registration is left in place
    pub fn register(&mut self, descriptor: FunctionDescriptor) -> Result<()> {
        if descriptor.name.trim().is_empty() {
            return Err(Error::Config("function name must not be empty".to_string()));
        }
        if self.functions.contains_key(&descriptor.name) {
            return Err(Error::DuplicateName(descriptor.name));
        }

        tracing::debug!(name = %descriptor.name, "function registered");
        self.functions.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Validate arguments and invoke the named function
    ///
    /// # Errors
    ///
    /// - `Error::UnknownFunction` if nothing is registered under `name`
    /// - `Error::InvalidArguments` if `arguments` fail the schema
    /// - `Error::HandlerExecution` wrapping whatever the handler raised
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value> {
        let descriptor = self
            .functions
            .get(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))?;

        descriptor
            .parameters
            .validate(&arguments)
            .map_err(|reason| Error::InvalidArguments {
                name: name.to_string(),
                reason,
            })?;

        tracing::debug!(name, %arguments, "dispatching function");

        descriptor
            .handler
            .call(arguments)
            .await
            .map_err(|source| {
                tracing::warn!(name, error = %source, "function handler failed");
                Error::HandlerExecution {
                    name: name.to_string(),
                    source,
                }
            })
    }

    /// Definitions to advertise to the model, sorted by name
    #[must_use]
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.functions
            .values()
            .map(|d| FunctionDefinition {
                name: d.name.clone(),
                description: d.description.clone(),
                parameters: d.parameters.to_json_schema(),
            })
            .collect()
    }

    /// Look up a descriptor
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(name)
    }

    /// Whether a function is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of registered functions
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::functions::ParamType;

    fn echo(name: &str, reply: &'static str) -> FunctionDescriptor {
        FunctionDescriptor::new(
            name,
            "echo",
            ParameterSchema::new().optional("text", ParamType::String, "text"),
            handler_fn(move |_| async move { Ok::<Value, HandlerError>(json!(reply)) }),
        )
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_first() {
        let mut registry = FunctionRegistry::new();
        registry.register(echo("ping", "first")).unwrap();

        let err = registry.register(echo("ping", "second")).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(ref n) if n == "ping"));
        assert_eq!(registry.len(), 1);

        let out = registry.dispatch("ping", json!({})).await.unwrap();
        assert_eq!(out, json!("first"));
    }

    #[tokio::test]
    async fn unknown_function_is_rejected() {
        let registry = FunctionRegistry::new();
        let err = registry.dispatch("missing", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::UnknownFunction(ref n) if n == "missing"));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_handler() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(FunctionDescriptor::new(
                "strict",
                "never runs",
                ParameterSchema::new().required("n", ParamType::Integer, "n"),
                handler_fn(|_| async { Err::<Value, HandlerError>("handler must not run".into()) }),
            ))
            .unwrap();

        let err = registry
            .dispatch("strict", json!({"n": "three"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn handler_failure_is_wrapped() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(FunctionDescriptor::new(
                "flaky",
                "fails",
                ParameterSchema::new(),
                handler_fn(|_| async { Err::<Value, HandlerError>("relay tripped".into()) }),
            ))
            .unwrap();

        let err = registry.dispatch("flaky", json!({})).await.unwrap_err();
        match err {
            Error::HandlerExecution { name, source } => {
                assert_eq!(name, "flaky");
                assert_eq!(source.to_string(), "relay tripped");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn definitions_are_sorted() {
        let mut registry = FunctionRegistry::new();
        registry.register(echo("zeta", "z")).unwrap();
        registry.register(echo("alpha", "a")).unwrap();

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut registry = FunctionRegistry::new();
        assert!(matches!(
            registry.register(echo(" ", "x")),
            Err(Error::Config(_))
        ));
    }
}
