use grader_engine::{Config, Grader, MemoryVerdictStore};
use grader_protocol::GradeRequest;
use grader_utils::tracing::setup_tracing;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dotenv::dotenv;
use structopt::StructOpt;
use tracing::{error, info};

#[derive(Debug, StructOpt)]
#[structopt(name = "grader", about = "Grades submissions for the bug-fixing game")]
struct Opt {
    #[structopt(long, parse(from_os_str), default_value = "grader.toml")]
    config: PathBuf,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Grades one request and prints the verdict as JSON
    Grade {
        #[structopt(parse(from_os_str))]
        request: PathBuf,
    },
    /// Grades each request's reference solution against itself
    SelfCheck {
        #[structopt(parse(from_os_str), required = true)]
        requests: Vec<PathBuf>,
    },
}

#[tracing::instrument(err)]
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!("{} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    info!("loading config from {}", path.display());
    let config = Config::from_file(path)?;
    info!("config is loaded:\n{:#?}", config);
    Ok(config)
}

fn load_request(path: &Path) -> Result<GradeRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read request: path = {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse request: path = {}", path.display()))
}

fn challenge_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn grade(grader: &Grader, path: &Path) -> Result<()> {
    let (challenge, submission) = load_request(path)?.into_parts();
    let store = MemoryVerdictStore::new();
    let (attempt_id, verdict) = grader
        .grade_and_record(&challenge_id(path), &challenge, &submission, &store)
        .await?;
    info!(%attempt_id, "graded");
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

async fn self_check(grader: &Grader, paths: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in paths {
        let (challenge, submission) = load_request(path)?.into_parts();
        let verdict = grader.self_check(&challenge, submission.stdin).await;
        if verdict.is_solved() {
            println!("ok    {}", path.display());
        } else {
            failed += 1;
            error!(path = %path.display(), outcome = %verdict.outcome, message = %verdict.message, "self-check failed");
            println!("FAIL  {}  {}: {}", path.display(), verdict.outcome, verdict.message);
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} self-checks failed", failed, paths.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    setup_tracing();

    let opt = Opt::from_args();
    let grader = Grader::new(load_config(&opt.config)?);

    match opt.cmd {
        Command::Grade { request } => grade(&grader, &request).await,
        Command::SelfCheck { requests } => self_check(&grader, &requests).await,
    }
}
