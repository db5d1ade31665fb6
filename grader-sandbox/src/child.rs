use crate::limit::AppliedLimits;
use crate::SandboxArgs;

use std::process::Stdio;

use tokio::process::Command;

pub fn build_command(args: &SandboxArgs, limits: Option<AppliedLimits>) -> Command {
    let mut cmd = Command::new(&args.cmd.bin);
    cmd.args(&args.cmd.args);

    cmd.env_clear();
    for (k, v) in args.cmd.env_pairs() {
        cmd.env(k, v);
    }

    if let Some(ref dir) = args.current_dir {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    // the child leads its own group so that its descendants die with it
    cmd.process_group(0);
    cmd.kill_on_drop(true);

    // SAFETY: the hook only calls prctl(2), getrlimit(2) and setrlimit(2),
    // all of which are async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            #[cfg(target_os = "linux")]
            {
                let _ = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
            }
            if let Some(ref limits) = limits {
                limits.apply();
            }
            Ok(())
        });
    }

    cmd
}
