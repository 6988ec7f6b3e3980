//! Host service manager adapter.

use crate::runner::{CommandRunner, command_line};
use reconcile::{HostError, HostResult, ServiceManager};
use std::path::Path;

/// Supported init systems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceBackend {
    Systemd,
    SysV,
}

impl ServiceBackend {
    /// systemd when it is the running init, otherwise the SysV `service` wrapper
    pub fn detect() -> Option<Self> {
        let backend = if Path::new("/run/systemd/system").is_dir() && which::which("systemctl").is_ok() {
            Some(Self::Systemd)
        } else if which::which("service").is_ok() {
            Some(Self::SysV)
        } else {
            None
        };
        log::debug!("Service backend: {backend:?}");
        backend
    }

    fn command<'a>(&self, verb: &'a str, name: &'a str) -> (&'static str, Vec<&'a str>) {
        match self {
            Self::Systemd => ("systemctl", vec![verb, name]),
            Self::SysV => ("service", vec![name, verb]),
        }
    }
}

pub struct SystemServices {
    backend: Option<ServiceBackend>,
    runner: CommandRunner,
}

impl SystemServices {
    pub fn new(backend: Option<ServiceBackend>, runner: CommandRunner) -> Self {
        Self { backend, runner }
    }

    pub fn detect(runner: CommandRunner) -> Self {
        Self::new(ServiceBackend::detect(), runner)
    }

    fn require_backend(&self) -> HostResult<ServiceBackend> {
        self.backend.ok_or_else(|| {
            HostError::Unsupported("neither systemctl nor service is available".to_string())
        })
    }

    fn control(&self, verb: &str, name: &str) -> HostResult<()> {
        let backend = self.require_backend()?;
        let (program, args) = backend.command(verb, name);
        let output = self.runner.run(program, &args)?;
        if output.success {
            Ok(())
        } else {
            Err(classify(&command_line(program, &args), &output.diagnostic(), name))
        }
    }
}

impl ServiceManager for SystemServices {
    fn is_running(&self, name: &str) -> HostResult<bool> {
        match self.require_backend()? {
            ServiceBackend::Systemd => self
                .runner
                .succeeds("systemctl", &["is-active", "--quiet", name]),
            ServiceBackend::SysV => self.runner.succeeds("service", &[name, "status"]),
        }
    }

    fn start(&self, name: &str) -> HostResult<()> {
        log::info!("Starting service {name}");
        self.control("start", name)
    }

    fn stop(&self, name: &str) -> HostResult<()> {
        log::info!("Stopping service {name}");
        self.control("stop", name)
    }

    fn reset(&self, name: &str) -> HostResult<()> {
        match self.require_backend()? {
            ServiceBackend::Systemd => {
                self.runner
                    .run_checked("systemctl", &["reset-failed", name])?;
                Ok(())
            }
            // No failed-state bookkeeping to clear
            ServiceBackend::SysV => Ok(()),
        }
    }
}

/// Map service manager output to an error category.
pub fn classify(command: &str, stderr: &str, service: &str) -> HostError {
    let lower = stderr.to_lowercase();
    if lower.contains("not found") || lower.contains("unrecognized service") || lower.contains("does not exist") {
        return HostError::NotFound {
            name: service.to_string(),
        };
    }
    if lower.contains("access denied") || lower.contains("interactive authentication required") {
        return HostError::Permission {
            message: stderr.lines().next().unwrap_or_default().trim().to_string(),
        };
    }
    HostError::CommandFailed {
        command: command.to_string(),
        stderr: stderr.trim().to_string(),
    }
}
