//! Call-engine boundary
//!
//! Only the reconciler talks to the call engine. Commands are sent in
//! order over one connection; a failed command does not stop the rest.

mod command;
mod errors;
mod esl;
mod recording;

pub use command::{is_success, CommandOutcome, EngineCommand};
pub use errors::{EngineError, EngineResult};
pub use esl::{EngineEndpoint, EslClient};
pub use recording::RecordingEngine;

use std::future::Future;
use std::pin::Pin;

/// Future returned by [`CallEngine::run`]
pub type EngineFuture<'a> =
    Pin<Box<dyn Future<Output = EngineResult<Vec<CommandOutcome>>> + Send + 'a>>;

/// Command channel to one node's call engine
pub trait CallEngine: Send + Sync {
    /// Run `commands` in order; fails only if the engine cannot be reached
    fn run<'a>(&'a self, commands: &'a [EngineCommand]) -> EngineFuture<'a>;
}
