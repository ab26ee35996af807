//! Dropping root privileges before touching application-owned files.
//!
//! The kernel invokes core handlers as root with cwd `/`. Once the handler
//! starts writing next to the crashed application it must run as that
//! application's owner instead. The drop fails closed: a partial drop
//! leaves the process with inconsistent privileges, so any syscall error
//! here aborts the whole run.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::sys::stat::{umask, Mode};
use nix::unistd::{setgid, setgroups, setuid, Gid, Uid};
use tracing::debug;

use crate::errors::HandlerError;

/// The uid/gid owning `path`.
pub fn owner_of(path: &Path) -> Result<(Uid, Gid), HandlerError> {
    let meta = std::fs::metadata(path).map_err(|source| HandlerError::OwnerLookup {
        path: path.to_owned(),
        source,
    })?;
    Ok((Uid::from_raw(meta.uid()), Gid::from_raw(meta.gid())))
}

/// Lower privileges to `uid`/`gid`.
///
/// A no-op when the process is not root. Order matters: supplementary
/// groups are cleared first, then the gid is set, then the uid — setuid
/// comes last because it forfeits the right to do the other two.
pub fn drop_privileges(uid: Uid, gid: Gid) -> Result<(), HandlerError> {
    if !Uid::effective().is_root() {
        debug!("not running as root, nothing to drop");
        return Ok(());
    }
    setgroups(&[]).map_err(HandlerError::PrivilegeDrop)?;
    setgid(gid).map_err(HandlerError::PrivilegeDrop)?;
    setuid(uid).map_err(HandlerError::PrivilegeDrop)?;
    // Files created from here on are private to the owner.
    umask(Mode::from_bits_truncate(0o077));
    debug!("now running as uid {uid}");
    Ok(())
}
