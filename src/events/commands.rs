//! Event to command mapping
//!
//! Each event becomes a short ordered list of idempotent engine commands.
//! Planning is pure: everything it needs travels in the event detail.

use super::event::{Action, ChangeEvent, EventClass, EventDetail};
use crate::engine::EngineCommand;

/// Commands that bring a call engine in line with `event`
pub fn plan_commands(event: &ChangeEvent) -> Vec<EngineCommand> {
    let mut commands = Vec::new();
    let new = event.new_id.clone().unwrap_or_default();
    let old = event.old_id.clone().unwrap_or_default();

    match event.class {
        EventClass::NetAlias => {
            for profile in profiles(&event.detail) {
                commands.push(EngineCommand::ProfileRestart(profile.clone()));
            }
            commands.push(EngineCommand::ReloadXml);
        }
        EventClass::Acl => {
            if event.is_rename() {
                for profile in profiles(&event.detail) {
                    commands.push(EngineCommand::ProfileRescan(profile.clone()));
                }
            }
            commands.push(EngineCommand::ReloadAcl);
        }
        EventClass::SipProfile => match event.action {
            Action::Create => commands.push(EngineCommand::ProfileStart(new)),
            Action::Delete => {
                commands.push(EngineCommand::ProfileStop(old));
                commands.push(EngineCommand::ReloadXml);
            }
            Action::Update if old == new => {
                commands.push(EngineCommand::ProfileRescan(new));
                commands.push(EngineCommand::ReloadXml);
            }
            Action::Update => {
                commands.push(EngineCommand::ProfileStop(old));
                commands.push(EngineCommand::ProfileStart(new));
                commands.push(EngineCommand::ReloadXml);
            }
            Action::Resync => {}
        },
        EventClass::Gateway => {
            for profile in profiles(&event.detail) {
                commands.push(EngineCommand::KillGateway {
                    profile: profile.clone(),
                    gateway: old.clone(),
                });
                commands.push(EngineCommand::ProfileRescan(profile.clone()));
            }
            commands.push(EngineCommand::ReloadXml);
        }
        EventClass::Outbound => plan_outbound(event, &mut commands),
        EventClass::Inbound => commands.push(EngineCommand::ReloadAcl),
        EventClass::Cluster => {
            if let EventDetail::Variables { variables } = &event.detail {
                for variable in variables {
                    commands.push(EngineCommand::GlobalSetVar(variable.clone()));
                }
            }
        }
        EventClass::Resync => {
            for profile in profiles(&event.detail) {
                commands.push(EngineCommand::ProfileRescan(profile.clone()));
            }
            commands.push(EngineCommand::ReloadXml);
            commands.push(EngineCommand::ReloadAcl);
            commands.push(EngineCommand::DistributorReload);
        }
    }
    commands
}

fn profiles(detail: &EventDetail) -> &[String] {
    match detail {
        EventDetail::Profiles { sipprofiles } => sipprofiles,
        _ => &[],
    }
}

/// A gateway is killed only when no other interconnection still uses it
fn plan_outbound(event: &ChangeEvent, commands: &mut Vec<EngineCommand>) {
    let EventDetail::Outbound {
        sipprofile,
        old_sipprofile,
        gateways,
        old_gateways,
    } = &event.detail
    else {
        return;
    };
    let kill = |profile: &str, gateway: &str| EngineCommand::KillGateway {
        profile: profile.to_string(),
        gateway: gateway.to_string(),
    };

    match event.action {
        Action::Create => {
            if let Some(profile) = sipprofile {
                commands.push(EngineCommand::ProfileRescan(profile.clone()));
            }
        }
        Action::Delete => {
            if let Some(old_profile) = old_sipprofile {
                for (gateway, users) in old_gateways {
                    if *users <= 1 {
                        commands.push(kill(old_profile, gateway));
                    }
                }
            }
        }
        Action::Update => {
            if let Some(old_profile) = old_sipprofile {
                let moved = sipprofile.as_deref() != Some(old_profile.as_str());
                for (gateway, users) in old_gateways {
                    if moved || (*users <= 1 && !gateways.contains(gateway)) {
                        commands.push(kill(old_profile, gateway));
                    }
                }
            }
            if let Some(profile) = sipprofile {
                commands.push(EngineCommand::ProfileRescan(profile.clone()));
            }
        }
        Action::Resync => {}
    }
    commands.push(EngineCommand::ReloadXml);
    commands.push(EngineCommand::DistributorReload);
}
