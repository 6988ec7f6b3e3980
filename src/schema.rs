//! Manifest format
//!
//! A manifest is a TOML file with optional `[settings]` and an ordered list
//! of `[[action]]` tables. Loading validates everything up front, so a run
//! never starts from a manifest with a known problem.

use crate::paths;
use anyhow::{Context, Result, bail};
use reconcile::{ActionKind, Desired, Ownership, ResourceAction, parse_mode};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9/][A-Za-z0-9._:/@+-]*$").expect("id pattern is a valid regex")
});

// ============================================================================
// On-disk Schema
// ============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default, rename = "action")]
    pub actions: Vec<ActionSpec>,
}

/// Run settings; command-line flags take precedence
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub backup_dir: Option<String>,
    pub report_dir: Option<String>,
    pub command_timeout_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    /// Defaults to `target`
    pub id: Option<String>,
    pub kind: ActionKind,
    pub target: String,

    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub requires: Vec<String>,
    /// Explicit syntax checker, `{}` is replaced by the candidate's path
    pub check: Option<Vec<String>>,

    // file_content
    pub content: Option<String>,
    pub source: Option<String>,

    // file_owner_mode / directory_owner_mode
    pub owner: Option<String>,
    pub mode: Option<String>,
    pub dir_mode: Option<String>,
    pub file_mode: Option<String>,

    // service_running
    pub running: Option<bool>,
    #[serde(default)]
    pub stale_files: Vec<String>,
}

// ============================================================================
// Validated Plan
// ============================================================================

/// A manifest that passed validation
#[derive(Debug)]
pub struct Plan {
    pub path: PathBuf,
    pub settings: Settings,
    pub actions: Vec<ResourceAction>,
    /// Per-target checker commands
    pub checkers: Vec<(PathBuf, Vec<String>)>,
}

impl Plan {
    /// Read, parse and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;
        let manifest: Manifest = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in manifest: {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_manifest(manifest, path, base)
    }

    /// Validate a parsed manifest; relative `source` paths resolve against `base`
    pub fn from_manifest(manifest: Manifest, path: &Path, base: &Path) -> Result<Self> {
        let mut problems = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut actions = Vec::with_capacity(manifest.actions.len());
        let mut checkers = Vec::new();

        for (index, spec) in manifest.actions.into_iter().enumerate() {
            let label = format!(
                "action #{} ({})",
                index + 1,
                spec.id.as_deref().unwrap_or(&spec.target)
            );
            match convert(spec, base, &seen) {
                Ok((action, checker)) => {
                    seen.insert(action.id.clone());
                    if let Some(command) = checker {
                        checkers.push((action.path(), command));
                    }
                    actions.push(action);
                }
                Err(e) => problems.push(format!("{label}: {e:#}")),
            }
        }

        if !problems.is_empty() {
            bail!(
                "{} has {} problem(s):\n  - {}",
                path.display(),
                problems.len(),
                problems.join("\n  - ")
            );
        }

        log::debug!("Loaded {} action(s) from {}", actions.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            settings: manifest.settings,
            actions,
            checkers,
        })
    }
}

fn convert(
    spec: ActionSpec,
    base: &Path,
    seen: &HashSet<String>,
) -> Result<(ResourceAction, Option<Vec<String>>)> {
    let is_path_kind = !matches!(spec.kind, ActionKind::PackageInstalled | ActionKind::ServiceRunning);
    let target = if is_path_kind {
        absolute(&spec.target)?.display().to_string()
    } else {
        spec.target.trim().to_string()
    };
    if target.is_empty() {
        bail!("target is empty");
    }

    let id = spec.id.clone().unwrap_or_else(|| target.clone());
    if !ID_RE.is_match(&id) {
        bail!("id '{id}' must start with a letter, digit or / and use only letters, digits and ._:/@+-");
    }
    if seen.contains(&id) {
        bail!("duplicate id '{id}'");
    }
    for required in &spec.requires {
        if required == &id {
            bail!("'{id}' requires itself");
        }
        if !seen.contains(required) {
            bail!("requires '{required}', which is not declared earlier in the manifest");
        }
    }
    check_unused_fields(&spec)?;

    let desired = match spec.kind {
        ActionKind::PackageInstalled => Desired::PackageInstalled,
        ActionKind::FileContent => Desired::FileContent {
            content: file_content(&spec, base)?,
        },
        ActionKind::FileOwnerMode => Desired::FileOwnerMode {
            owner: owner(spec.owner.as_deref())?,
            mode: mode(spec.mode.as_deref(), "mode")?.context("`mode` is required")?,
        },
        ActionKind::ServiceRunning => Desired::ServiceRunning {
            running: spec.running.unwrap_or(true),
            stale_files: spec
                .stale_files
                .iter()
                .map(|f| absolute(f))
                .collect::<Result<_>>()?,
        },
        ActionKind::DirectoryOwnerMode => Desired::DirectoryOwnerMode {
            owner: owner(spec.owner.as_deref())?,
            dir_mode: mode(spec.dir_mode.as_deref(), "dir_mode")?,
            file_mode: mode(spec.file_mode.as_deref(), "file_mode")?,
        },
    };

    let checker = match spec.check {
        Some(command) if command.is_empty() => bail!("`check` must name a command"),
        Some(_) if !is_path_kind => bail!("`check` only applies to file and directory actions"),
        other => other,
    };

    let action = ResourceAction {
        id,
        target,
        desired,
        requires: spec.requires,
        sensitive: spec.sensitive,
    };
    Ok((action, checker))
}

/// Reject fields that have no meaning for the action's kind
fn check_unused_fields(spec: &ActionSpec) -> Result<()> {
    let set = [
        ("content", spec.content.is_some()),
        ("source", spec.source.is_some()),
        ("owner", spec.owner.is_some()),
        ("mode", spec.mode.is_some()),
        ("dir_mode", spec.dir_mode.is_some()),
        ("file_mode", spec.file_mode.is_some()),
        ("running", spec.running.is_some()),
        ("stale_files", !spec.stale_files.is_empty()),
    ];
    let allowed: &[&str] = match spec.kind {
        ActionKind::PackageInstalled => &[],
        ActionKind::FileContent => &["content", "source"],
        ActionKind::FileOwnerMode => &["owner", "mode"],
        ActionKind::ServiceRunning => &["running", "stale_files"],
        ActionKind::DirectoryOwnerMode => &["owner", "dir_mode", "file_mode"],
    };

    let unused: Vec<&str> = set
        .iter()
        .filter(|(name, present)| *present && !allowed.contains(name))
        .map(|(name, _)| *name)
        .collect();
    if !unused.is_empty() {
        bail!("{} not used by {}", unused.join(", "), spec.kind);
    }
    Ok(())
}

fn absolute(raw: &str) -> Result<PathBuf> {
    let path = paths::expand_strict(raw.trim())?;
    if !path.is_absolute() {
        bail!("'{}' must be an absolute path", path.display());
    }
    Ok(path)
}

fn file_content(spec: &ActionSpec, base: &Path) -> Result<Vec<u8>> {
    match (&spec.content, &spec.source) {
        (Some(content), None) => Ok(content.clone().into_bytes()),
        (None, Some(source)) => {
            let path = paths::expand_strict(source)?;
            let path = if path.is_absolute() { path } else { base.join(path) };
            std::fs::read(&path).with_context(|| format!("Could not read source {}", path.display()))
        }
        (Some(_), Some(_)) => bail!("set either `content` or `source`, not both"),
        (None, None) => bail!("one of `content` or `source` is required"),
    }
}

fn owner(raw: Option<&str>) -> Result<Ownership> {
    let raw = raw.context("`owner` is required")?;
    raw.parse::<Ownership>().map_err(anyhow::Error::msg)
}

fn mode(raw: Option<&str>, field: &str) -> Result<Option<u32>> {
    raw.map(|m| parse_mode(m).map_err(|e| anyhow::anyhow!("`{field}`: {e}")))
        .transpose()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plan(toml_text: &str) -> Result<Plan> {
        let manifest: Manifest = toml::from_str(toml_text)?;
        Plan::from_manifest(manifest, Path::new("converge.toml"), Path::new("/nonexistent"))
    }

    const DESKTOP: &str = r#"
[settings]
backup_dir = "/var/backups/converge"
command_timeout_secs = 120

[[action]]
kind = "package_installed"
target = "xfce4"

[[action]]
id = "startwm"
kind = "file_content"
target = "/etc/xrdp/startwm.sh"
content = "xfce4-session\n"
sensitive = true
requires = ["xfce4"]
check = ["sh", "-n", "{}"]

[[action]]
kind = "file_owner_mode"
target = "/etc/sudoers"
owner = "root:root"
mode = "0440"
sensitive = true

[[action]]
kind = "service_running"
target = "xrdp"
stale_files = ["/var/run/xrdp/xrdp-sesman.pid"]
requires = ["xfce4"]
"#;

    #[test]
    fn test_loads_desktop_manifest() {
        let plan = plan(DESKTOP).unwrap();
        assert_eq!(plan.actions.len(), 4);
        assert_eq!(plan.settings.command_timeout_secs, Some(120));

        let xfce4 = &plan.actions[0];
        assert_eq!(xfce4.id, "xfce4");
        assert_eq!(xfce4.desired, Desired::PackageInstalled);

        let startwm = &plan.actions[1];
        assert!(startwm.sensitive);
        assert_eq!(startwm.requires, vec!["xfce4".to_string()]);
        assert_eq!(
            startwm.desired,
            Desired::FileContent {
                content: b"xfce4-session\n".to_vec()
            }
        );

        assert_eq!(
            plan.actions[2].desired,
            Desired::FileOwnerMode {
                owner: Ownership::new("root", Some("root")),
                mode: 0o440
            }
        );
        assert_eq!(
            plan.actions[3].desired,
            Desired::ServiceRunning {
                running: true,
                stale_files: vec![PathBuf::from("/var/run/xrdp/xrdp-sesman.pid")]
            }
        );
        assert_eq!(
            plan.checkers,
            vec![(
                PathBuf::from("/etc/xrdp/startwm.sh"),
                vec!["sh".to_string(), "-n".to_string(), "{}".to_string()]
            )]
        );
    }

    #[test]
    fn test_requires_must_be_declared_earlier() {
        let err = plan(
            r#"
[[action]]
kind = "file_content"
target = "/etc/xrdp/startwm.sh"
content = "x"
requires = ["xfce4"]

[[action]]
kind = "package_installed"
target = "xfce4"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("requires 'xfce4', which is not declared earlier"));
    }

    #[test]
    fn test_all_problems_are_reported() {
        let err = plan(
            r#"
[[action]]
kind = "package_installed"
target = "vim"

[[action]]
kind = "package_installed"
target = "vim"

[[action]]
kind = "file_owner_mode"
target = "/etc/sudoers"
owner = "root"
mode = "0999"

[[action]]
kind = "file_content"
target = "relative/path"
content = "x"
"#,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("3 problem(s)"));
        assert!(err.contains("duplicate id 'vim'"));
        assert!(err.contains("not an octal mode"));
        assert!(err.contains("must be an absolute path"));
    }

    #[test]
    fn test_content_and_source_are_exclusive() {
        let err = plan(
            r#"
[[action]]
kind = "file_content"
target = "/etc/motd"
content = "a"
source = "motd.txt"
"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("not both"));
    }

    #[test]
    fn test_fields_must_match_kind() {
        let err = plan(
            r#"
[[action]]
kind = "package_installed"
target = "sudo"
mode = "0755"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("mode not used by package_installed"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: std::result::Result<Manifest, _> = toml::from_str(
            r#"
[[action]]
kind = "package_installed"
target = "sudo"
versoin = "1.9"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_ids_rejected() {
        let err = plan(
            r#"
[[action]]
id = "-oops"
kind = "package_installed"
target = "sudo"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("id '-oops'"));
    }

    #[test]
    fn test_source_is_relative_to_manifest() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("files")).unwrap();
        std::fs::write(temp.path().join("files/startwm.sh"), "#!/bin/sh\nexec xfce4-session\n").unwrap();
        let manifest_path = temp.path().join("desktop.toml");
        std::fs::write(
            &manifest_path,
            r#"
[[action]]
id = "startwm"
kind = "file_content"
target = "/etc/xrdp/startwm.sh"
source = "files/startwm.sh"
"#,
        )
        .unwrap();

        let plan = Plan::load(&manifest_path).unwrap();
        assert_eq!(
            plan.actions[0].desired,
            Desired::FileContent {
                content: b"#!/bin/sh\nexec xfce4-session\n".to_vec()
            }
        );
    }

    #[test]
    fn test_default_id_is_expanded_target() {
        let plan = plan(
            r#"
[[action]]
kind = "directory_owner_mode"
target = "~/.minecraft"
owner = "alice"
dir_mode = "0755"
"#,
        )
        .unwrap();
        let expected = dirs::home_dir().unwrap().join(".minecraft");
        assert_eq!(plan.actions[0].target, expected.display().to_string());
        assert_eq!(plan.actions[0].id, plan.actions[0].target);
    }

    #[test]
    fn test_directory_modes() {
        let plan = plan(
            r#"
[[action]]
id = "minecraft"
kind = "directory_owner_mode"
target = "/srv/minecraft"
owner = "alice:alice"
dir_mode = "0755"
file_mode = "0644"
"#,
        )
        .unwrap();
        assert_eq!(
            plan.actions[0].desired,
            Desired::DirectoryOwnerMode {
                owner: Ownership::new("alice", Some("alice")),
                dir_mode: Some(0o755),
                file_mode: Some(0o644)
            }
        );
    }
}
