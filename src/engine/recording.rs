//! Engine that records commands instead of sending them
//!
//! Used for nodes with no command socket configured, and in tests.

use std::collections::HashSet;
use std::sync::Mutex;

use super::command::{CommandOutcome, EngineCommand};
use super::errors::EngineError;
use super::{CallEngine, EngineFuture};

#[derive(Debug, Default)]
pub struct RecordingEngine {
    executed: Mutex<Vec<EngineCommand>>,
    failing: Mutex<HashSet<String>>,
    unreachable: Mutex<bool>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, in order
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.executed.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Answer `-ERR` to this command from now on
    pub fn fail_on(&self, command: &EngineCommand) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(command.to_string());
        }
    }

    /// Refuse connections until reset
    pub fn set_unreachable(&self, unreachable: bool) {
        if let Ok(mut flag) = self.unreachable.lock() {
            *flag = unreachable;
        }
    }

    fn record(&self, commands: &[EngineCommand]) -> Result<Vec<CommandOutcome>, EngineError> {
        if self.unreachable.lock().map(|f| *f).unwrap_or(false) {
            return Err(EngineError::Unreachable {
                address: "recording".into(),
                reason: "marked unreachable".into(),
            });
        }
        let failing = self
            .failing
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default();
        let mut executed = self
            .executed
            .lock()
            .map_err(|_| EngineError::protocol("Lock poisoned"))?;
        Ok(commands
            .iter()
            .map(|command| {
                executed.push(command.clone());
                let success = !failing.contains(&command.to_string());
                CommandOutcome {
                    command: command.clone(),
                    reply: if success { "+OK".into() } else { "-ERR".into() },
                    success,
                }
            })
            .collect())
    }
}

impl CallEngine for RecordingEngine {
    fn run<'a>(&'a self, commands: &'a [EngineCommand]) -> EngineFuture<'a> {
        let result = self.record(commands);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_fails_selected_commands() {
        let engine = RecordingEngine::new();
        engine.fail_on(&EngineCommand::ReloadAcl);
        let outcomes = engine
            .run(&[EngineCommand::ReloadXml, EngineCommand::ReloadAcl])
            .await
            .unwrap();
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert_eq!(engine.commands().len(), 2);

        engine.set_unreachable(true);
        assert!(engine.run(&[EngineCommand::ReloadXml]).await.is_err());
        assert_eq!(engine.commands().len(), 2);
    }
}
