//! Restarting the host application: stop it by process name, then launch the
//! first candidate executable that exists.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process;

use crate::paths::{first_existing, Platform};

/// One external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Wait for the command and require success, instead of leaving it running.
    pub wait: bool,
}

impl Invocation {
    fn new(program: impl Into<String>, args: &[&str], wait: bool) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            wait,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a restart will run, in order. The stop step may fail (nothing running).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPlan {
    pub stop: Invocation,
    pub launch: Invocation,
    /// Candidate that will be launched, `None` when falling back to the bare name.
    pub executable: Option<PathBuf>,
}

/// Build the restart commands for `platform` from already-expanded candidates.
///
/// Windows has no bare-name fallback: without an existing candidate the plan
/// fails with `ExecutableNotFound`.
pub fn plan_restart(platform: Platform, candidates: &[PathBuf]) -> Result<RestartPlan, RestartError> {
    let found = first_existing(candidates).cloned();
    if let Some(path) = &found {
        log::debug!("Using host executable {}", path.display());
    }

    let plan = match platform {
        Platform::MacOs => {
            let app = found.as_deref().map(path_str).unwrap_or_else(|| "Claude".to_string());
            RestartPlan {
                stop: Invocation::new("pkill", &["-f", "Claude"], false),
                launch: Invocation::new("open", &["-a", &app], true),
                executable: found,
            }
        }
        Platform::Windows => {
            let path = found.ok_or_else(|| RestartError::ExecutableNotFound(candidates.to_vec()))?;
            RestartPlan {
                stop: Invocation::new("taskkill", &["/f", "/im", "Claude.exe"], false),
                launch: Invocation::new(path_str(&path), &[], false),
                executable: Some(path),
            }
        }
        Platform::Linux => RestartPlan {
            stop: Invocation::new("pkill", &["-f", "claude"], false),
            launch: Invocation::new(
                found.as_deref().map(path_str).unwrap_or_else(|| "claude".to_string()),
                &[],
                false,
            ),
            executable: found,
        },
    };
    Ok(plan)
}

/// Run a plan. A failed stop is logged and ignored; a failed launch is an error.
pub fn execute(plan: &RestartPlan) -> Result<(), RestartError> {
    log::info!("Attempting to restart Claude Desktop...");

    match process::Command::new(&plan.stop.program).args(&plan.stop.args).status() {
        Ok(s) if !s.success() => log::debug!("'{}' exited with {} (host not running?)", plan.stop, s),
        Ok(_) => {}
        Err(e) => log::warn!("Could not run '{}': {}", plan.stop, e),
    }

    let mut cmd = process::Command::new(&plan.launch.program);
    cmd.args(&plan.launch.args);
    if plan.launch.wait {
        let status = cmd.status().map_err(|e| RestartError::Spawn(plan.launch.to_string(), e))?;
        if !status.success() {
            return Err(RestartError::LaunchFailed(plan.launch.to_string(), status.code()));
        }
    } else {
        cmd.spawn().map_err(|e| RestartError::Spawn(plan.launch.to_string(), e))?;
    }

    log::info!("Claude Desktop restarted successfully");
    Ok(())
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum RestartError {
    #[error("Claude Desktop executable not found (checked {} paths); set one in settings", .0.len())]
    ExecutableNotFound(Vec<PathBuf>),
    #[error("Failed to run '{0}': {1}")]
    Spawn(String, #[source] std::io::Error),
    #[error("'{}' failed with exit code {}", .0, .1.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    LaunchFailed(String, Option<i32>),
}
