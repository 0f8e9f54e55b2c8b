//! Cluster event propagation
//!
//! The registry queues one [`ChangeEvent`] per affected node inside the
//! same commit as the mutation. Each node's [`Reconciler`] drains its
//! queues and turns events into call-engine commands; the [`Supervisor`]
//! keeps the reconcilers running for the life of the process.

mod commands;
mod errors;
mod event;
mod propagator;
mod reconciler;
mod supervisor;

pub use commands::plan_commands;
pub use errors::{EventsError, EventsResult};
pub use event::{Action, ChangeEvent, EventClass, EventDetail};
pub use propagator::{fan_out, EventDraft, NodeScope};
pub use reconciler::{Handled, Reconciler, ReconcilerSettings};
pub use supervisor::Supervisor;
