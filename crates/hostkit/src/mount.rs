//! Mount table inspection via `/proc/self/mounts`.

use reconcile::{HostError, HostResult, MountFlags, MountInspector};
use std::fs;
use std::path::{Path, PathBuf};

pub struct ProcMounts {
    table: PathBuf,
}

impl Default for ProcMounts {
    fn default() -> Self {
        Self::new("/proc/self/mounts")
    }
}

impl ProcMounts {
    pub fn new(table: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl MountInspector for ProcMounts {
    fn flags_for(&self, path: &Path) -> HostResult<MountFlags> {
        let content = fs::read_to_string(&self.table).map_err(|e| HostError::io(&self.table, e))?;
        // Best effort: a path that does not exist yet is matched as written
        let resolved = nearest_existing(path)
            .and_then(|p| p.canonicalize().ok())
            .unwrap_or_else(|| path.to_path_buf());
        longest_match(&content, &resolved).ok_or_else(|| {
            HostError::Unsupported(format!("no mount found for {}", path.display()))
        })
    }
}

fn nearest_existing(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

/// Flags of the mount whose mount point is the longest prefix of `path`
pub fn longest_match(table: &str, path: &Path) -> Option<MountFlags> {
    table
        .lines()
        .filter_map(parse_line)
        .filter(|flags| path.starts_with(&flags.mount_point))
        .max_by_key(|flags| flags.mount_point.as_os_str().len())
}

fn parse_line(line: &str) -> Option<MountFlags> {
    let mut fields = line.split_whitespace();
    let _device = fields.next()?;
    let mount_point = unescape(fields.next()?);
    let fs_type = fields.next()?.to_string();
    let options = fields.next()?;

    let has = |opt: &str| options.split(',').any(|o| o == opt);
    Some(MountFlags {
        mount_point: PathBuf::from(mount_point),
        fs_type,
        read_only: has("ro"),
        nosuid: has("nosuid"),
    })
}

/// Undo the kernel's octal escaping of spaces, tabs and backslashes
fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 4);
        match code.and_then(|c| u8::from_str_radix(c, 8).ok()) {
            Some(byte) => {
                out.push(char::from(byte));
                rest = &rest[pos + 4..];
            }
            None => {
                out.push('\\');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
/dev/sda1 / ext4 rw,relatime 0 0
tmpfs /tmp tmpfs rw,nosuid,nodev 0 0
/dev/sdb1 /srv ext4 ro,relatime 0 0
C:\\134 /mnt/c 9p rw,noatime,dirsync,aname=drvfs 0 0
/dev/sdc1 /media/usb\\040stick vfat rw,nosuid,nodev 0 0
";

    #[test]
    fn test_longest_prefix_wins() {
        let flags = longest_match(TABLE, Path::new("/tmp/x/suid-helper")).unwrap();
        assert_eq!(flags.mount_point, PathBuf::from("/tmp"));
        assert!(flags.nosuid);

        let flags = longest_match(TABLE, Path::new("/etc/sudoers")).unwrap();
        assert_eq!(flags.mount_point, PathBuf::from("/"));
        assert!(!flags.nosuid);
        assert!(!flags.read_only);
    }

    #[test]
    fn test_component_prefix_not_string_prefix() {
        let flags = longest_match(TABLE, Path::new("/srvdata/file")).unwrap();
        assert_eq!(flags.mount_point, PathBuf::from("/"));
        assert!(longest_match(TABLE, Path::new("/srv/www")).unwrap().read_only);
    }

    #[test]
    fn test_permission_mapping_filesystems() {
        let flags = longest_match(TABLE, Path::new("/mnt/c/Users")).unwrap();
        assert_eq!(flags.fs_type, "9p");
        assert!(flags.maps_permissions());
    }

    #[test]
    fn test_escaped_mount_point() {
        let flags = longest_match(TABLE, Path::new("/media/usb stick/a")).unwrap();
        assert_eq!(flags.mount_point, PathBuf::from("/media/usb stick"));
        assert_eq!(flags.fs_type, "vfat");
    }

    #[test]
    fn test_reads_table_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let table = temp.path().join("mounts");
        fs::write(&table, TABLE).unwrap();
        let flags = ProcMounts::new(&table)
            .flags_for(Path::new("/tmp/does-not-exist-yet"))
            .unwrap();
        assert_eq!(flags.fs_type, "tmpfs");
    }
}
