//! Host identity and privilege.

/// Whether the process runs with effective uid 0
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Effective uid of the process
pub fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

/// The host's name, `"localhost"` when it cannot be determined
pub fn hostname() -> String {
    let mut buf = [0u8; 256];

    // SAFETY: the buffer is valid for `buf.len()` bytes; we check the return
    // value and only read up to the first NUL.
    let result = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if result != 0 {
        log::debug!("gethostname failed: {}", std::io::Error::last_os_error());
        return "localhost".to_string();
    }

    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_is_not_empty() {
        assert!(!hostname().is_empty());
    }

    #[test]
    fn test_root_matches_uid() {
        assert_eq!(is_root(), effective_uid() == 0);
    }
}
