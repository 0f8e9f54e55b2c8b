//! CLI command implementations
//!
//! `serve` boots in a fixed order: configuration, store, registry,
//! reconcilers, HTTP. Shutdown runs the other way round once the HTTP
//! server has drained.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::config::ServiceConfig;
use crate::engine::{CallEngine, EslClient, RecordingEngine};
use crate::events::{Reconciler, ReconcilerSettings, Supervisor};
use crate::firewall::{Firewall, NftablesFirewall};
use crate::http_server::{AppState, HttpServer};
use crate::observability::{log_event, log_event_with_fields, Event, MetricsRegistry};
use crate::registry::Registry;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::Check { config } => check(&config),
    }
}

fn load_config(config_path: &Path) -> CliResult<ServiceConfig> {
    let config = ServiceConfig::load(config_path)?;
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("node_id", &config.node_id),
            ("path", &config_path.display().to_string()),
        ],
    );
    Ok(config)
}

fn open_registry(config: &ServiceConfig) -> CliResult<Arc<Registry>> {
    let store = config.store.open()?;
    let registry = Registry::open(store, config.cluster(), Arc::new(MetricsRegistry::new()))?;
    Ok(Arc::new(registry))
}

/// Validate the configuration and print the effective settings
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let registry = open_registry(&config)?;
    let cluster = registry.cluster();
    let engines: Vec<_> = config
        .reconciled_nodes()
        .into_iter()
        .map(|nodeid| {
            let address = config.engine_for(&nodeid).map(|e| e.address());
            json!({ "nodeid": nodeid, "engine": address })
        })
        .collect();

    write_response(json!({
        "node_id": config.node_id,
        "cluster": cluster.config.as_ref(),
        "http": config.http.socket_addr(),
        "reconcilers": engines,
        "firewall": config.firewall.enabled,
    }))
}

/// Boot the control plane and serve until interrupted
pub fn serve(config_path: &Path) -> CliResult<()> {
    log_event(Event::BootStart);
    let config = load_config(config_path)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(run_service(config))
}

async fn run_service(config: ServiceConfig) -> CliResult<()> {
    let registry = open_registry(&config)?;
    let supervisor = Supervisor::start(build_reconcilers(&config, &registry));
    let server = HttpServer::new(config.http.clone(), AppState::new(registry));
    log_event_with_fields(
        Event::BootComplete,
        &[("reconcilers", &supervisor.len().to_string())],
    );

    let served = server
        .start(async {
            let _ = tokio::signal::ctrl_c().await;
            log_event(Event::ShutdownStart);
        })
        .await;

    supervisor.shutdown().await;
    log_event(Event::ShutdownComplete);
    served.map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
}

/// One reconciler per reconciled node.
///
/// A node without a configured engine socket gets a recording engine, so
/// its queue still drains and commands show up in the logs.
pub fn build_reconcilers(config: &ServiceConfig, registry: &Arc<Registry>) -> Vec<Arc<Reconciler>> {
    let firewall: Option<Arc<dyn Firewall>> = if config.firewall.enabled {
        Some(Arc::new(NftablesFirewall::new(config.firewall.clone())))
    } else {
        None
    };
    let settings = ReconcilerSettings {
        queue_timeout: config.queue_timeout(),
        fault_backoff: config.fault_backoff(),
    };

    config
        .reconciled_nodes()
        .into_iter()
        .map(|nodeid| {
            let engine: Arc<dyn CallEngine> = match config.engine_for(&nodeid) {
                Some(endpoint) => Arc::new(EslClient::new(endpoint.clone())),
                None => Arc::new(RecordingEngine::new()),
            };
            Arc::new(Reconciler::new(
                nodeid,
                registry.clone(),
                engine,
                firewall.clone(),
                settings,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_check_accepts_valid_config() {
        let file = config_file(
            r#"{
                "node_id": "node1",
                "cluster": {"name": "edge", "members": ["node1", "node2"]},
                "engines": [{"nodeid": "node1", "host": "127.0.0.1"}],
                "reconcile_nodes": ["node1", "node2"]
            }"#,
        );
        check(file.path()).unwrap();
    }

    #[test]
    fn test_check_rejects_foreign_node() {
        let file = config_file(
            r#"{"node_id": "node9", "cluster": {"name": "edge", "members": ["node1"]}}"#,
        );
        let err = check(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "SBC_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_check_rejects_undrained_members() {
        let file = config_file(
            r#"{"node_id": "node1", "cluster": {"name": "edge", "members": ["node1", "node2"]}}"#,
        );
        let err = check(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "SBC_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_check_missing_file() {
        let err = check(Path::new("/nonexistent/sbcplane.json")).unwrap_err();
        assert_eq!(err.code_str(), "SBC_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_build_reconcilers_per_node() {
        let mut config = ServiceConfig::standalone("node1");
        config.cluster = Some(crate::config::ClusterConfig {
            members: vec!["node1".into(), "node2".into()],
            ..crate::config::ClusterConfig::standalone("node1")
        });
        config.reconcile_nodes = vec!["node1".into(), "node2".into()];
        let registry = open_registry(&config).unwrap();

        let reconcilers = build_reconcilers(&config, &registry);
        let nodes: Vec<&str> = reconcilers.iter().map(|r| r.nodeid()).collect();
        assert_eq!(nodes, vec!["node1", "node2"]);
        assert_eq!(reconcilers[0].settings().queue_timeout, config.queue_timeout());
    }
}
