use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use logscribe_mcp::supervisor::{parse_extensions, Supervisor, SupervisorConfig};
use tracing_subscriber::EnvFilter;

const WATCH_EXT_ENV: &str = "LOGSCRIBE_WATCH_EXT";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args_os().skip(1);
    let (Some(watch_dir), Some(program)) = (args.next(), args.next()) else {
        bail!("usage: logscribe-dev <watch_dir> <command> [args...]");
    };
    let watch_dir = PathBuf::from(watch_dir);
    if !watch_dir.is_dir() {
        bail!("not a directory: {}", watch_dir.display());
    }

    let extensions = parse_extensions(&std::env::var(WATCH_EXT_ENV).unwrap_or_else(|_| "rs".into()));
    if extensions.is_empty() {
        bail!("{WATCH_EXT_ENV} names no extensions");
    }

    let config = SupervisorConfig {
        watch_dir,
        extensions,
        program,
        args: args.collect::<Vec<OsString>>(),
    };

    Supervisor::new(config)
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("supervisor failed")
}
