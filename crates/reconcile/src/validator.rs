//! Validator: pre-commit checks for sensitive actions
//!
//! Validation always looks at the *candidate* content. The policy checker
//! receives bytes, never a path to the live file, so a live file that is
//! valid cannot vouch for new content that is not (and vice versa).

use crate::context::Host;
use crate::types::{Desired, ResourceAction, Verdict};

/// Validate the content an action would commit.
pub fn validate(host: &Host<'_>, action: &ResourceAction) -> Verdict {
    let path = action.path();
    let verdict = match &action.desired {
        Desired::FileContent { content } => check(host, &path, content),
        Desired::FileOwnerMode { .. } => match host.fs.read(&path) {
            Ok(Some(live)) => check(host, &path, &live),
            Ok(None) => Verdict::fail(format!("{} does not exist", path.display())),
            Err(e) => Verdict::fail(format!("cannot read candidate: {}", e.actionable())),
        },
        Desired::DirectoryOwnerMode { .. } => validate_tree(host, action),
        // Nothing content-bearing to check
        Desired::PackageInstalled | Desired::ServiceRunning { .. } => Verdict::Pass,
    };

    match &verdict {
        Verdict::Pass => log::debug!("{}: validation passed", action.id),
        Verdict::Fail { reason } => log::info!("{}: validation failed: {reason}", action.id),
    }
    verdict
}

fn check(host: &Host<'_>, path: &std::path::Path, candidate: &[u8]) -> Verdict {
    match host.checker.check(path, candidate) {
        Ok(verdict) => verdict,
        Err(e) => Verdict::fail(format!("syntax checker unavailable: {}", e.actionable())),
    }
}

fn validate_tree(host: &Host<'_>, action: &ResourceAction) -> Verdict {
    let entries = match host.fs.walk(&action.path()) {
        Ok(entries) => entries,
        Err(e) => return Verdict::fail(format!("cannot list tree: {}", e.actionable())),
    };

    for (path, _) in entries.iter().filter(|(_, m)| !m.is_dir) {
        let content = match host.fs.read(path) {
            Ok(Some(content)) => content,
            Ok(None) => continue,
            Err(e) => return Verdict::fail(format!("cannot read candidate: {}", e.actionable())),
        };
        if let Verdict::Fail { reason } = check(host, path, &content) {
            return Verdict::fail(format!("{}: {reason}", path.display()));
        }
    }
    Verdict::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    #[test]
    fn test_candidate_content_is_checked_not_live_file() {
        let fake = FakeHost::new()
            .with_file("/etc/sudoers.d/rdp", b"valid\n", 0, 0, 0o440)
            .reject("/etc/sudoers.d/rdp", "syntax error near line 1");
        let action = ResourceAction::new(
            "rdp",
            "/etc/sudoers.d/rdp",
            Desired::FileContent {
                content: b"broken(\n".to_vec(),
            },
        )
        .sensitive(true);

        let verdict = validate(&fake.host(), &action);
        assert_eq!(verdict, Verdict::fail("syntax error near line 1"));
        assert_eq!(fake.content("/etc/sudoers.d/rdp").unwrap(), b"valid\n");
        assert_eq!(fake.mutations(), 0);
    }

    #[test]
    fn test_owner_mode_on_missing_file_fails() {
        let fake = FakeHost::new();
        let action = ResourceAction::new(
            "sudoers",
            "/etc/sudoers",
            Desired::FileOwnerMode {
                owner: "root:root".parse().unwrap(),
                mode: 0o440,
            },
        );
        assert!(!validate(&fake.host(), &action).is_pass());
    }

    #[test]
    fn test_packages_pass_without_checker() {
        let fake = FakeHost::new();
        let action = ResourceAction::new("sudo", "sudo", Desired::PackageInstalled);
        assert!(validate(&fake.host(), &action).is_pass());
        assert_eq!(fake.check_calls.get(), 0);
    }

    #[test]
    fn test_tree_reports_first_rejected_file() {
        let fake = FakeHost::new()
            .with_dir("/etc/sudoers.d", 0, 0, 0o750)
            .with_file("/etc/sudoers.d/a", b"ok", 0, 0, 0o440)
            .with_file("/etc/sudoers.d/b", b"bad", 0, 0, 0o440)
            .reject("/etc/sudoers.d/b", "parse error");
        let action = ResourceAction::new(
            "dropins",
            "/etc/sudoers.d",
            Desired::DirectoryOwnerMode {
                owner: "root:root".parse().unwrap(),
                dir_mode: Some(0o750),
                file_mode: Some(0o440),
            },
        );
        assert_eq!(
            validate(&fake.host(), &action),
            Verdict::fail("/etc/sudoers.d/b: parse error")
        );
    }
}
