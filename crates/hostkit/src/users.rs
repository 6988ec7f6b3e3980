//! User and group name resolution from the local account databases.

use reconcile::{HostError, HostResult, Ownership, ResolvedOwner};
use std::fs;
use std::path::{Path, PathBuf};

/// `/etc/passwd` and `/etc/group` readers
#[derive(Debug, Clone)]
pub struct UserDb {
    passwd: PathBuf,
    group: PathBuf,
}

impl Default for UserDb {
    fn default() -> Self {
        Self::new("/etc/passwd", "/etc/group")
    }
}

impl UserDb {
    pub fn new(passwd: impl Into<PathBuf>, group: impl Into<PathBuf>) -> Self {
        Self {
            passwd: passwd.into(),
            group: group.into(),
        }
    }

    /// Resolve names (or numeric ids) to uid/gid
    pub fn resolve(&self, owner: &Ownership) -> HostResult<ResolvedOwner> {
        let uid = lookup(&self.passwd, &owner.user)?;
        let gid = match &owner.group {
            Some(group) => Some(lookup(&self.group, group)?),
            None => None,
        };
        Ok(ResolvedOwner { uid, gid })
    }
}

fn lookup(db: &Path, name: &str) -> HostResult<u32> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(id);
    }
    let content = fs::read_to_string(db).map_err(|e| HostError::io(db, e))?;
    find_id(&content, name).ok_or_else(|| HostError::UnknownOwner {
        name: name.to_string(),
    })
}

/// Find the id (third field) for `name` in passwd/group formatted text
pub fn find_id(content: &str, name: &str) -> Option<u32> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let mut fields = line.split(':');
            let entry = fields.next()?;
            let id = fields.nth(1)?;
            (entry == name).then(|| id.parse().ok()).flatten()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::ErrorCategory;
    use tempfile::TempDir;

    const PASSWD: &str = "root:x:0:0:root:/root:/bin/bash\n\
                          # comment\n\
                          alice:x:1000:1000:Alice,,,:/home/alice:/bin/bash\n";
    const GROUP: &str = "root:x:0:\nsudo:x:27:alice\nalice:x:1000:\n";

    fn db(temp: &TempDir) -> UserDb {
        let passwd = temp.path().join("passwd");
        let group = temp.path().join("group");
        fs::write(&passwd, PASSWD).unwrap();
        fs::write(&group, GROUP).unwrap();
        UserDb::new(passwd, group)
    }

    #[test]
    fn test_find_id() {
        assert_eq!(find_id(PASSWD, "alice"), Some(1000));
        assert_eq!(find_id(GROUP, "sudo"), Some(27));
        assert_eq!(find_id(PASSWD, "bob"), None);
    }

    #[test]
    fn test_resolve_names_and_numbers() {
        let temp = TempDir::new().unwrap();
        let users = db(&temp);

        let owner = users.resolve(&"alice:sudo".parse().unwrap()).unwrap();
        assert_eq!(owner, ResolvedOwner { uid: 1000, gid: Some(27) });

        let owner = users.resolve(&"0".parse().unwrap()).unwrap();
        assert_eq!(owner, ResolvedOwner { uid: 0, gid: None });
    }

    #[test]
    fn test_unknown_user() {
        let temp = TempDir::new().unwrap();
        let err = db(&temp).resolve(&"mallory".parse().unwrap()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::UnknownOwner);
    }
}
