//! Resolution through to a gateway

use std::collections::HashMap;

use serde::Serialize;

use super::distribution::{pick_weighted, CallAttributes, GatewaySelector};
use super::errors::{RoutingError, RoutingResult};
use super::resolver::{Decision, Resolution, Resolver};
use crate::registry::{EntityClass, RegistryError};

/// Where one call attempt goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutePlan {
    #[serde(flatten)]
    pub resolution: Resolution,
    /// Outbound interconnection chosen among the routed endpoints
    pub interconnection: Option<String>,
    pub gateway: Option<String>,
}

/// Resolve `table` for a call and pick the interconnection and gateway
pub fn plan_route(
    resolver: &Resolver,
    selector: &GatewaySelector,
    table: &str,
    vars: &HashMap<String, String>,
    call: &CallAttributes,
) -> RoutingResult<RoutePlan> {
    let resolution = resolver.resolve_call(table, vars)?;
    let Decision::Route { endpoints, weights } = &resolution.decision else {
        return Ok(RoutePlan {
            resolution,
            interconnection: None,
            gateway: None,
        });
    };

    let index = if weights.len() == endpoints.len() && endpoints.len() > 1 {
        pick_weighted(weights, &mut rand::thread_rng())
    } else {
        Some(0)
    };
    let Some(name) = index.and_then(|i| endpoints.get(i)).cloned() else {
        return Ok(RoutePlan {
            resolution,
            interconnection: None,
            gateway: None,
        });
    };

    let entity = resolver
        .registry()
        .get(EntityClass::Outbound, &name)
        .map_err(|err| match err {
            RegistryError::NotFound { .. } => RoutingError::UnknownInterconnection(name.clone()),
            other => other.into(),
        })?;
    let gateway = entity
        .as_outbound()
        .filter(|intcon| intcon.enable)
        .and_then(|intcon| selector.select(intcon, call));

    Ok(RoutePlan {
        resolution,
        interconnection: Some(name),
        gateway,
    })
}
