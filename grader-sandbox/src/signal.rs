use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::debug;

/// Sends `SIGKILL` to every process in the group led by `pgid`.
pub fn kill_group(pgid: Pid) -> nix::Result<()> {
    let result = signal::killpg(pgid, Signal::SIGKILL);
    debug!("killpg pgid = {}, result = {:?}", pgid, result);
    result
}

/// `11` becomes `"SIGSEGV"`.
pub fn signal_name(signal: i32) -> Option<&'static str> {
    Signal::try_from(signal).ok().map(Signal::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(signal_name(libc::SIGSEGV), Some("SIGSEGV"));
        assert_eq!(signal_name(libc::SIGKILL), Some("SIGKILL"));
        assert_eq!(signal_name(0), None);
    }
}
