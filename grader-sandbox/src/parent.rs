use crate::signal;
use crate::{SandboxArgs, SandboxError, SandboxOutput};

use std::os::unix::process::ExitStatusExt;
use std::time::{Duration, Instant};

use nix::unistd::Pid;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::time;
use tracing::debug;

pub async fn run_parent(
    args: &SandboxArgs,
    mut child: Child,
    t0: Instant,
) -> Result<SandboxOutput, SandboxError> {
    let pgid = child.id().map(|id| Pid::from_raw(id as i32));
    debug!(?pgid, "child spawned");

    // stray descendants are killed on every exit path
    let _group = scopeguard::guard(pgid, |pgid| {
        if let Some(pgid) = pgid {
            let _ = signal::kill_group(pgid);
        }
    });

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let limit = args.output_limit;

    let feed = async move {
        if let Some(mut pipe) = stdin {
            // the child may exit without reading its input
            let _ = pipe.write_all(&args.stdin).await;
        }
    };

    let collect = async {
        let ((), out, err, status) = tokio::join!(
            feed,
            read_capped(stdout, limit),
            read_capped(stderr, limit),
            child.wait(),
        );
        Ok::<_, io::Error>((out?, err?, status?))
    };

    let real_time_limit = Duration::from_millis(args.real_time_limit);
    let waited = time::timeout(real_time_limit, collect).await;
    match waited {
        Ok(result) => {
            let (stdout, stderr, status) = result?;
            let real_time = t0.elapsed().as_millis() as u64;
            debug!(?status, real_time, "child exited");
            Ok(SandboxOutput {
                code: status.code(),
                signal: status.signal(),
                timed_out: false,
                real_time,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            if let Some(pgid) = pgid {
                let _ = signal::kill_group(pgid);
            }
            let _ = child.start_kill();
            let status = child.wait().await.ok();
            let real_time = t0.elapsed().as_millis() as u64;
            debug!(?status, real_time, "real time limit exceeded, child killed");
            Ok(SandboxOutput {
                code: None,
                signal: status.and_then(|s| s.signal()),
                timed_out: true,
                real_time,
                stdout: Vec::new(),
                stderr: Vec::new(),
            })
        }
    }
}

/// Keeps at most `limit` bytes and drains the rest, so that a flooding child
/// never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;
        io::copy(&mut reader, &mut io::sink()).await?;
    }
    Ok(buf)
}
