use std::sync::Once;

use grader_sandbox::{SandboxArgs, SandboxError, SandboxOutput};
use grader_utils::os_cmd::OsCmd;
use grader_utils::tracing::setup_tracing;

use tracing::{debug, error};

pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        setup_tracing();
    });
}

pub fn sh(script: &str) -> SandboxArgs {
    let mut cmd = OsCmd::new("/bin/sh");
    cmd.arg("-c").arg(script).inherit_env("PATH");
    SandboxArgs::new(cmd)
}

pub async fn run(args: &SandboxArgs) -> Result<SandboxOutput, SandboxError> {
    debug!("sandbox args = {:?}", args);
    match grader_sandbox::run(args).await {
        Ok(output) => {
            debug!("sandbox output = {:?}", output);
            Ok(output)
        }
        Err(err) => {
            error!("sandbox error:\n{:?}", err);
            Err(err)
        }
    }
}
