//! Firewall boundary
//!
//! Rule files are rendered per node from registry state, staged in a
//! uniquely named file next to their final path and persisted over it, then
//! loaded with the configured apply command. Passes for one node run one at
//! a time.

mod errors;
mod rules;

pub use errors::{FirewallError, FirewallResult};
pub use rules::{FirewallState, ProfileRules};

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory rule files are written to, one per node
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,

    /// Program and leading arguments; the rule file path is appended
    #[serde(default = "default_apply_command")]
    pub apply_command: Vec<String>,
}

fn default_rules_dir() -> PathBuf {
    PathBuf::from("/var/lib/sbcplane/firewall")
}

fn default_apply_command() -> Vec<String> {
    vec!["nft".to_string(), "-f".to_string()]
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rules_dir: default_rules_dir(),
            apply_command: default_apply_command(),
        }
    }
}

pub type FirewallFuture<'a> = Pin<Box<dyn Future<Output = FirewallResult<()>> + Send + 'a>>;

/// Installs a rendered rule set for one node
pub trait Firewall: Send + Sync {
    fn apply<'a>(&'a self, nodeid: &'a str, ruleset: String) -> FirewallFuture<'a>;
}

/// nftables rule files applied through an external command
#[derive(Debug, Clone)]
pub struct NftablesFirewall {
    config: FirewallConfig,
    passes: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl NftablesFirewall {
    pub fn new(config: FirewallConfig) -> Self {
        Self {
            config,
            passes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn pass_lock(&self, nodeid: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut passes = match self.passes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        passes.entry(nodeid.to_string()).or_default().clone()
    }

    pub fn rule_path(&self, nodeid: &str) -> PathBuf {
        self.config.rules_dir.join(format!("{}.nft", nodeid))
    }

    async fn install(&self, nodeid: &str, ruleset: String) -> FirewallResult<()> {
        let lock = self.pass_lock(nodeid);
        let _pass = lock.lock().await;

        let path = self.rule_path(nodeid);
        let write_err = |e: std::io::Error| FirewallError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.config.rules_dir)
            .await
            .map_err(write_err)?;
        let dir = self.config.rules_dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_rules(&dir, &target, &ruleset))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .and_then(|written| written)
            .map_err(write_err)?;

        let Some((program, args)) = self.config.apply_command.split_first() else {
            return Err(FirewallError::ApplyFailed {
                command: String::new(),
                reason: "no apply command configured".into(),
            });
        };
        let command_line = format!("{} {}", self.config.apply_command.join(" "), path.display());
        let output = Command::new(program)
            .args(args)
            .arg(&path)
            .output()
            .await
            .map_err(|e| FirewallError::ApplyFailed {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(FirewallError::ApplyFailed {
                command: command_line,
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

fn write_rules(dir: &Path, path: &Path, ruleset: &str) -> std::io::Result<()> {
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(ruleset.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl Firewall for NftablesFirewall {
    fn apply<'a>(&'a self, nodeid: &'a str, ruleset: String) -> FirewallFuture<'a> {
        Box::pin(self.install(nodeid, ruleset))
    }
}
