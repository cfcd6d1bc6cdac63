// src/proc/kill.rs

//! Process-group signalling.
//!
//! Children are spawned into their own session (`setsid` in `pre_exec`), so
//! the child's pid doubles as the process-group id for its whole tree and a
//! single `kill(-pgid, sig)` reaches every descendant, including wrapper
//! shells and whatever they spawned.

use std::io;

/// Send `SIGTERM` to the whole tree rooted at `pgid`.
#[cfg(unix)]
pub fn terminate_tree(pgid: i32) -> io::Result<()> {
    signal_group(pgid, libc::SIGTERM)
}

/// Send `SIGKILL` to the whole tree rooted at `pgid`.
#[cfg(unix)]
pub fn kill_tree(pgid: i32) -> io::Result<()> {
    signal_group(pgid, libc::SIGKILL)
}

#[cfg(unix)]
fn signal_group(pgid: i32, sig: libc::c_int) -> io::Result<()> {
    let rc = unsafe { libc::kill(-pgid, sig) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    // The group is already gone; that's exactly what we wanted.
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

/// Is any process with this pid still alive? Signal 0 performs the
/// permission/existence checks without delivering anything.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as i32, 0) };
    if rc == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

// On non-Unix targets there is no process-group signal; the lifecycle
// controller falls back to killing the direct child through its handle.
#[cfg(not(unix))]
pub fn terminate_tree(_pgid: i32) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub fn kill_tree(_pgid: i32) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    false
}
