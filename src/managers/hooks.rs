//! Pre/post backup hook scripts
//!
//! A hook directory holds `*.sh` files that run with `sh`, one after another
//! in lexical order of file name. A directory that does not exist has no
//! hooks.

use crate::utils::executor::CommandExecutor;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Scripts in `dir`, sorted by file name
pub fn list_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        debug!("Hook directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    // Scripts run with their own directory as cwd, so use absolute paths
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve hook directory {}", dir.display()))?;

    let mut scripts: Vec<PathBuf> = std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to read hook directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "sh"))
        .collect();
    scripts.sort();
    Ok(scripts)
}

/// Run every script in `dir`, stopping at the first failure
pub async fn run_hooks(
    executor: &dyn CommandExecutor,
    dir: &Path,
    env: &[(&str, &str)],
) -> Result<usize> {
    let scripts = list_scripts(dir)?;
    for script in &scripts {
        info!("Running hook {}", script.display());
        executor
            .run_script(script, env, None)
            .await
            .with_context(|| format!("Hook {} failed", script.display()))?;
    }
    Ok(scripts.len())
}

/// Run every script in `dir`, returning a message per failure instead of
/// stopping
pub async fn run_hooks_best_effort(
    executor: &dyn CommandExecutor,
    dir: &Path,
    env: &[(&str, &str)],
) -> Vec<String> {
    let scripts = match list_scripts(dir) {
        Ok(scripts) => scripts,
        Err(e) => {
            warn!("{:#}", e);
            return vec![format!("{:#}", e)];
        }
    };

    let mut failures = Vec::new();
    for script in &scripts {
        info!("Running hook {}", script.display());
        if let Err(e) = executor.run_script(script, env, None).await {
            let message = format!("Hook {} failed: {:#}", script.display(), e);
            warn!("{}", message);
            failures.push(message);
        }
    }
    failures
}
