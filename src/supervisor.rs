//! Restart-on-change helper for local development.
//!
//! Runs a child command and restarts it whenever a watched file in a
//! directory is modified or created.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config as WatchConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{LogQueryError, Result};

/// Quiet period that folds a burst of save events into one restart.
pub const DEBOUNCE: Duration = Duration::from_millis(250);
/// How long a child gets to exit after SIGTERM before it is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub watch_dir: PathBuf,
    /// Extensions without the leading dot, e.g. `rs`.
    pub extensions: Vec<String>,
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl SupervisorConfig {
    pub fn is_watched(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|w| w.eq_ignore_ascii_case(ext)))
    }
}

/// Split a comma-separated extension list, dropping blanks and leading dots.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Send SIGTERM. Returns false when the signal could not be delivered
/// (process gone, or platform without `Signal::Term`).
fn terminate(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .and_then(|process| process.kill_with(Signal::Term))
        .unwrap_or(false)
}

fn is_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

pub struct Supervisor {
    config: SupervisorConfig,
    child: Option<Child>,
    restarts: usize,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            child: None,
            restarts: 0,
        }
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    pub fn start(&mut self) -> Result<()> {
        info!(program = ?self.config.program, "starting child");
        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .kill_on_drop(true)
            .spawn()?;
        self.child = Some(child);
        Ok(())
    }

    /// Ask the running child to terminate and wait for it; kill it if it
    /// is still running after `grace`.
    pub async fn stop_within(&mut self, grace: Duration) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Some(pid) = child.id() {
            if terminate(pid) {
                if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                    debug!("child exited: {:?}", status?);
                    return Ok(());
                }
                warn!(pid, "child ignored SIGTERM, killing");
            }
        }
        if let Err(e) = child.kill().await {
            // already exited
            debug!("kill failed: {e}");
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.stop_within(STOP_GRACE).await
    }

    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await?;
        self.restarts += 1;
        self.start()
    }

    /// Watch until `shutdown` resolves, restarting the child on every
    /// debounced batch of relevant change events.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let watched = self.config.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) if is_change(&event.kind) => {
                    for path in event.paths.into_iter().filter(|p| watched.is_watched(p)) {
                        let _ = tx.send(path);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("watch error: {e}"),
            },
            WatchConfig::default(),
        )
        .map_err(|e| self.watch_error(e))?;
        watcher
            .watch(&self.config.watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| self.watch_error(e))?;

        self.start()?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = rx.recv() => {
                    let Some(path) = changed else { break };
                    // swallow the rest of the burst
                    while let Ok(Some(_)) = tokio::time::timeout(DEBOUNCE, rx.recv()).await {}
                    info!("file changed: {}, restarting", path.display());
                    self.restart().await?;
                }
            }
        }

        info!("stopping supervisor");
        self.stop().await
    }

    fn watch_error(&self, e: notify::Error) -> LogQueryError {
        LogQueryError::Watch {
            path: self.config.watch_dir.clone(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(exts: &str) -> SupervisorConfig {
        SupervisorConfig {
            watch_dir: PathBuf::from("."),
            extensions: parse_extensions(exts),
            program: OsString::from("true"),
            args: Vec::new(),
        }
    }

    #[test]
    fn extension_list_parsing() {
        assert_eq!(parse_extensions("rs, .toml,,yaml "), vec!["rs", "toml", "yaml"]);
        assert!(parse_extensions(" , ").is_empty());
    }

    #[test]
    fn only_listed_extensions_are_watched() {
        let cfg = config("rs,toml");
        assert!(cfg.is_watched(Path::new("src/main.rs")));
        assert!(cfg.is_watched(Path::new("Cargo.TOML")));
        assert!(!cfg.is_watched(Path::new("logs/app1.log")));
        assert!(!cfg.is_watched(Path::new("Makefile")));
    }

    #[test]
    fn modify_and_create_trigger_restart() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        assert!(is_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_change(&EventKind::Create(CreateKind::File)));
        assert!(!is_change(&EventKind::Remove(RemoveKind::File)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_replaces_child() {
        let mut sup = Supervisor::new(SupervisorConfig {
            watch_dir: PathBuf::from("."),
            extensions: vec!["rs".into()],
            program: OsString::from("sleep"),
            args: vec![OsString::from("30")],
        });
        sup.start().unwrap();
        let first = sup.child.as_ref().and_then(|c| c.id());
        sup.restart().await.unwrap();
        let second = sup.child.as_ref().and_then(|c| c.id());
        assert_eq!(sup.restarts(), 1);
        assert!(second.is_some());
        assert_ne!(first, second);
        sup.stop().await.unwrap();
        assert!(sup.child.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_terminates_gracefully() {
        // exits 0 on SIGTERM; a SIGKILL would leave no marker file
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("stopped");
        let script = format!(
            "trap 'touch {}; exit 0' TERM; while true; do sleep 0.05; done",
            marker.display()
        );
        let mut sup = Supervisor::new(SupervisorConfig {
            watch_dir: PathBuf::from("."),
            extensions: vec!["rs".into()],
            program: OsString::from("sh"),
            args: vec![OsString::from("-c"), OsString::from(script)],
        });
        sup.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        sup.stop_within(Duration::from_secs(5)).await.unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("rs");
        cfg.watch_dir = dir.path().to_path_buf();
        cfg.program = OsString::from(if cfg!(windows) { "cmd" } else { "true" });
        if cfg!(windows) {
            cfg.args = vec![OsString::from("/C"), OsString::from("exit")];
        }
        Supervisor::new(cfg).run(async {}).await.unwrap();
    }
}
