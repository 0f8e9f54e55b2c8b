//! Observable control-plane events.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    BootStart,
    BootComplete,
    ShutdownStart,
    ShutdownComplete,
    ConfigLoaded,
    Serving,

    // Registry
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    MutationRejected,
    MutationConflict,
    ClusterUpdated,

    // Propagation / reconciliation
    EventPropagated,
    EventReceived,
    ReconcileComplete,
    EngineCommandFailed,
    EngineUnreachable,
    ReconcilerFault,
    ReconcilerRestarted,
    ReconcilerStopped,

    // Firewall
    FirewallApplied,
    FirewallFailed,

    // Routing
    RouteDepthExceeded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "SBC_STARTUP_BEGIN",
            Event::BootComplete => "SBC_STARTUP_COMPLETE",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "SBC_SERVING",

            Event::EntityCreated => "ENTITY_CREATED",
            Event::EntityUpdated => "ENTITY_UPDATED",
            Event::EntityDeleted => "ENTITY_DELETED",
            Event::MutationRejected => "MUTATION_REJECTED",
            Event::MutationConflict => "MUTATION_CONFLICT",
            Event::ClusterUpdated => "CLUSTER_UPDATED",

            Event::EventPropagated => "EVENT_PROPAGATED",
            Event::EventReceived => "EVENT_RECEIVED",
            Event::ReconcileComplete => "RECONCILE_COMPLETE",
            Event::EngineCommandFailed => "ENGINE_COMMAND_FAILED",
            Event::EngineUnreachable => "ENGINE_UNREACHABLE",
            Event::ReconcilerFault => "RECONCILER_FAULT",
            Event::ReconcilerRestarted => "RECONCILER_RESTARTED",
            Event::ReconcilerStopped => "RECONCILER_STOPPED",

            Event::FirewallApplied => "FIREWALL_APPLIED",
            Event::FirewallFailed => "FIREWALL_FAILED",

            Event::RouteDepthExceeded => "ROUTE_DEPTH_EXCEEDED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        false
    }

    /// Events that describe a failed operation are logged at WARN or above.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::MutationRejected
                | Event::MutationConflict
                | Event::EngineCommandFailed
                | Event::EngineUnreachable
                | Event::ReconcilerFault
                | Event::FirewallFailed
                | Event::RouteDepthExceeded
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
