//! Assistant functions for zone temperature control

use std::sync::Arc;

use serde_json::{Value, json};

use super::{Thermostat, Zone, format_temperature};
use crate::Result;
use crate::error::HandlerError;
use crate::functions::{
    FunctionDescriptor, FunctionRegistry, ParamType, ParameterSchema, handler_fn,
};

fn zone_param() -> ParamType {
    ParamType::Enum(Zone::ALL.iter().map(|z| z.as_str().to_string()).collect())
}

fn zone_arg(arguments: &Value) -> std::result::Result<Zone, HandlerError> {
    let raw = arguments
        .get("zone")
        .and_then(Value::as_str)
        .ok_or("missing zone")?;
    Ok(raw.parse::<Zone>()?)
}

/// Register `get_temperature` and `set_temperature`
///
/// # Errors
///
/// Returns `Error::DuplicateName` if either name is already registered
pub fn register_functions(registry: &mut FunctionRegistry, thermostat: Arc<Thermostat>) -> Result<()> {
    let store = Arc::clone(&thermostat);
    registry.register(FunctionDescriptor::new(
        "get_temperature",
        "Get the current temperature of a specific zone",
        ParameterSchema::new().required("zone", zone_param(), "The zone to read"),
        handler_fn(move |arguments| {
            let store = Arc::clone(&store);
            async move {
                let zone = zone_arg(&arguments)?;
                let temperature = store
                    .get(zone)
                    .await
                    .ok_or_else(|| format!("zone not found: {zone}"))?;
                Ok::<Value, HandlerError>(json!({
                    "zone": zone,
                    "temperature": format_temperature(temperature),
                }))
            }
        }),
    ))?;

    let store = thermostat;
    registry.register(FunctionDescriptor::new(
        "set_temperature",
        "Set the temperature for a specific zone",
        ParameterSchema::new()
            .required("zone", zone_param(), "The zone to change")
            .required("temp", ParamType::Integer, "Target temperature in Celsius"),
        handler_fn(move |arguments| {
            let store = Arc::clone(&store);
            async move {
                let zone = zone_arg(&arguments)?;
                let temp = arguments
                    .get("temp")
                    .and_then(Value::as_i64)
                    .ok_or("missing temp")?;
                let temp = i32::try_from(temp)?;
                store.set(zone, temp).await;
                Ok::<Value, HandlerError>(json!({
                    "zone": zone,
                    "temperature": format_temperature(temp),
                    "message": format!("The temperature in the {} is now {}", zone.spoken(), format_temperature(temp)),
                }))
            }
        }),
    ))?;

    Ok(())
}
