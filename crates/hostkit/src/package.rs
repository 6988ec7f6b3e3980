//! Host package manager adapter.

use crate::runner::{CommandOutput, CommandRunner, command_line};
use reconcile::{HostError, HostResult, PackageManager};

/// Supported package manager families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageBackend {
    Apt,
    Dnf,
    Pacman,
    Zypper,
}

impl PackageBackend {
    /// Detect the host's package manager from the tools on `PATH`
    pub fn detect() -> Option<Self> {
        let found = |tool: &str| which::which(tool).is_ok();
        let backend = if found("apt-get") && found("dpkg-query") {
            Some(Self::Apt)
        } else if found("dnf") && found("rpm") {
            Some(Self::Dnf)
        } else if found("pacman") {
            Some(Self::Pacman)
        } else if found("zypper") && found("rpm") {
            Some(Self::Zypper)
        } else {
            None
        };
        log::debug!("Package backend: {backend:?}");
        backend
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
        }
    }

    fn query_command<'a>(&self, package: &'a str) -> (&'static str, Vec<&'a str>) {
        match self {
            Self::Apt => ("dpkg-query", vec!["-W", "-f=${Status}", package]),
            Self::Dnf | Self::Zypper => ("rpm", vec!["-q", package]),
            Self::Pacman => ("pacman", vec!["-Q", package]),
        }
    }

    fn install_command<'a>(&self, package: &'a str) -> (&'static str, Vec<&'a str>) {
        match self {
            Self::Apt => (
                "apt-get",
                vec!["install", "-y", "--no-install-recommends", package],
            ),
            Self::Dnf => ("dnf", vec!["install", "-y", package]),
            Self::Pacman => ("pacman", vec!["-S", "--noconfirm", "--needed", package]),
            Self::Zypper => ("zypper", vec!["--non-interactive", "install", package]),
        }
    }

    fn installed_from(&self, output: &CommandOutput) -> bool {
        match self {
            // dpkg keeps removed-but-configured packages in its database
            Self::Apt => output.success && output.stdout.contains("install ok installed"),
            _ => output.success,
        }
    }
}

/// Packages managed through the host's native package manager
pub struct SystemPackages {
    backend: Option<PackageBackend>,
    runner: CommandRunner,
}

impl SystemPackages {
    pub fn new(backend: Option<PackageBackend>, runner: CommandRunner) -> Self {
        Self {
            backend,
            runner: runner.with_env("DEBIAN_FRONTEND", "noninteractive"),
        }
    }

    pub fn detect(runner: CommandRunner) -> Self {
        Self::new(PackageBackend::detect(), runner)
    }

    pub fn backend(&self) -> Option<PackageBackend> {
        self.backend
    }

    fn require_backend(&self) -> HostResult<PackageBackend> {
        self.backend.ok_or_else(|| {
            HostError::Unsupported(
                "no supported package manager found (apt, dnf, pacman, zypper)".to_string(),
            )
        })
    }
}

impl PackageManager for SystemPackages {
    fn is_installed(&self, name: &str) -> HostResult<bool> {
        let backend = self.require_backend()?;
        let (program, args) = backend.query_command(name);
        let output = self.runner.run(program, &args)?;
        Ok(backend.installed_from(&output))
    }

    fn install(&self, name: &str) -> HostResult<()> {
        let backend = self.require_backend()?;
        let (program, args) = backend.install_command(name);
        log::info!("Installing {name} with {}", backend.name());

        let output = self.runner.run(program, &args)?;
        if output.success {
            Ok(())
        } else {
            Err(classify(&command_line(program, &args), &output.diagnostic(), name))
        }
    }
}

/// Map package manager output to an error category.
pub fn classify(command: &str, stderr: &str, package: &str) -> HostError {
    let lower = stderr.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&[
        "could not get lock",
        "unable to acquire the dpkg frontend lock",
        "unable to lock database",
        "waiting for process with pid",
        "system management is locked",
    ]) {
        return HostError::Locked {
            message: first_line(stderr),
        };
    }

    if has(&[
        "unable to locate package",
        "no match for argument",
        "target not found",
        "not found in package names",
        "has no installation candidate",
    ]) {
        return HostError::NotFound {
            name: package.to_string(),
        };
    }

    if has(&[
        "temporary failure resolving",
        "could not resolve",
        "failed to fetch",
        "failed to download",
        "connection timed out",
        "connection refused",
        "curl error",
        "cannot find a valid baseurl",
        "network is unreachable",
    ]) {
        return HostError::Network {
            message: first_line(stderr),
        };
    }

    if has(&["are you root", "you need to be root", "permission denied", "root privileges"]) {
        return HostError::Permission {
            message: first_line(stderr),
        };
    }

    HostError::CommandFailed {
        command: command.to_string(),
        stderr: stderr.trim().to_string(),
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
