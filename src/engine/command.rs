//! Call-engine control verbs

use std::fmt;

/// One idempotent control command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EngineCommand {
    ProfileStart(String),
    ProfileStop(String),
    ProfileRestart(String),
    ProfileRescan(String),
    KillGateway { profile: String, gateway: String },
    ReloadXml,
    ReloadAcl,
    DistributorReload,
    /// `name=value`
    GlobalSetVar(String),
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::ProfileStart(p) => write!(f, "sofia profile {} start", p),
            EngineCommand::ProfileStop(p) => write!(f, "sofia profile {} stop", p),
            EngineCommand::ProfileRestart(p) => write!(f, "sofia profile {} restart", p),
            EngineCommand::ProfileRescan(p) => write!(f, "sofia profile {} rescan", p),
            EngineCommand::KillGateway { profile, gateway } => {
                write!(f, "sofia profile {} killgw {}", profile, gateway)
            }
            EngineCommand::ReloadXml => f.write_str("reloadxml"),
            EngineCommand::ReloadAcl => f.write_str("reloadacl"),
            EngineCommand::DistributorReload => f.write_str("distributor_ctl reload"),
            EngineCommand::GlobalSetVar(var) => write!(f, "global_setvar {}", var),
        }
    }
}

/// Result of one command against the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: EngineCommand,
    pub reply: String,
    pub success: bool,
}

/// Engines signal success with one of these markers somewhere in the reply
pub fn is_success(reply: &str) -> bool {
    reply.contains("+OK") || reply.contains("+ok") || reply.contains("Success")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbs() {
        let kill = EngineCommand::KillGateway {
            profile: "external".into(),
            gateway: "gw1".into(),
        };
        assert_eq!(kill.to_string(), "sofia profile external killgw gw1");
        assert_eq!(EngineCommand::DistributorReload.to_string(), "distributor_ctl reload");
        assert_eq!(
            EngineCommand::GlobalSetVar("rtp_start_port=10000".into()).to_string(),
            "global_setvar rtp_start_port=10000"
        );
    }

    #[test]
    fn test_success_markers() {
        assert!(is_success("+OK Reloading XML"));
        assert!(is_success("Reload ACL Success"));
        assert!(is_success("+ok"));
        assert!(!is_success("-ERR no such profile"));
        assert!(!is_success(""));
    }
}
