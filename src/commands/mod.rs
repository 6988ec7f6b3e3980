pub mod apply;
pub mod check;
pub mod status;

use anyhow::{Context as _, Result};
use hostkit::{CommandRunner, DEFAULT_TIMEOUT, LocalHost};
use std::path::Path;
use std::time::Duration;

use crate::schema::Plan;

/// Load and validate a manifest, with the path in the error chain
pub fn load_plan(path: &Path) -> Result<Plan> {
    Plan::load(path).with_context(|| format!("Invalid manifest: {}", path.display()))
}

/// Command timeout: flag, then manifest setting, then the default
pub fn command_timeout(flag: Option<u64>, plan: &Plan) -> Duration {
    flag.or(plan.settings.command_timeout_secs)
        .map_or(DEFAULT_TIMEOUT, Duration::from_secs)
}

/// Detect the live host adapters, with the plan's explicit checkers registered
pub fn detect_host(plan: &Plan, timeout: Duration) -> LocalHost {
    let host = LocalHost::detect(CommandRunner::new(timeout)).with_checkers(plan.checkers.clone());
    match host.packages.backend() {
        Some(backend) => log::debug!("Package manager: {}", backend.name()),
        None => log::debug!("No supported package manager found"),
    }
    host
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Settings;

    fn plan_with(timeout: Option<u64>) -> Plan {
        Plan {
            path: "converge.toml".into(),
            settings: Settings {
                command_timeout_secs: timeout,
                ..Default::default()
            },
            actions: Vec::new(),
            checkers: Vec::new(),
        }
    }

    #[test]
    fn test_timeout_precedence() {
        assert_eq!(command_timeout(None, &plan_with(None)), DEFAULT_TIMEOUT);
        assert_eq!(command_timeout(None, &plan_with(Some(30))), Duration::from_secs(30));
        assert_eq!(command_timeout(Some(5), &plan_with(Some(30))), Duration::from_secs(5));
    }
}
