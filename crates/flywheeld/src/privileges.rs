//! Dropping root after the listening socket is bound.

use std::ffi::CString;
use std::io;

use anyhow::{bail, Context};

/// Switch the process to `user`, given by name or numeric uid.
///
/// The group is switched first; once the uid changes the process may no
/// longer be allowed to.
pub fn drop_to(user: &str) -> anyhow::Result<(u32, u32)> {
    let (uid, gid) = lookup(user)?;

    // SAFETY: plain syscalls on integer ids.
    if unsafe { libc::setgid(gid) } != 0 {
        return Err(io::Error::last_os_error()).with_context(|| format!("setgid({gid}) failed"));
    }
    // SAFETY: as above.
    if unsafe { libc::setuid(uid) } != 0 {
        return Err(io::Error::last_os_error()).with_context(|| format!("setuid({uid}) failed"));
    }
    Ok((uid, gid))
}

fn lookup(user: &str) -> anyhow::Result<(libc::uid_t, libc::gid_t)> {
    let name = CString::new(user).context("user name contains a NUL byte")?;

    // SAFETY: getpwnam returns null or a pointer to a static record that
    // stays valid until the next getpw* call; both fields are copied out
    // before returning.
    unsafe {
        let pw = libc::getpwnam(name.as_ptr());
        if !pw.is_null() {
            return Ok(((*pw).pw_uid, (*pw).pw_gid));
        }
    }

    match user.parse::<libc::uid_t>() {
        Ok(uid) => Ok((uid, uid)),
        Err(_) => bail!("unknown user {user:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_root() {
        assert_eq!(lookup("root").unwrap(), (0, 0));
    }

    #[test]
    fn numeric_ids_are_accepted() {
        assert_eq!(lookup("65534").map(|(uid, _)| uid).unwrap(), 65534);
    }

    #[test]
    fn unknown_user_is_an_error() {
        let err = lookup("no-such-user-flywheel").unwrap_err();
        assert!(err.to_string().contains("unknown user"));
    }
}
