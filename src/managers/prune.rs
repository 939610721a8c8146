//! Retention enforcement across backup targets

use crate::artifact::{Artifact, ArtifactError};
use crate::managers::retention::{Retention, RetentionError};
use crate::storage::{Storage, StorageError, TargetErrors};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PruneError {
    #[error("no targets")]
    NoTargets,

    #[error("invalid retention string: {input}")]
    InvalidRetention {
        input: String,
        #[source]
        source: RetentionError,
    },

    #[error(transparent)]
    TargetsFailed(#[from] TargetErrors),
}

/// Outcome for a single target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPruneReport {
    pub target: String,
    pub deleted: Vec<String>,
    pub kept: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub targets: Vec<TargetPruneReport>,
}

impl PruneReport {
    pub fn deleted_count(&self) -> usize {
        self.targets.iter().map(|t| t.deleted.len()).sum()
    }
}

/// Backup artifacts among `names`; anything else is ignored
fn recognised(names: &[String]) -> Vec<Artifact> {
    names
        .iter()
        .filter_map(|name| match Artifact::parse(name) {
            Ok(artifact) => Some(artifact),
            Err(ArtifactError::NoMatch(_)) => None,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                None
            }
        })
        .collect()
}

/// Split recognised artifacts into (delete, keep) under `retention`
pub fn select_for_deletion(
    names: &[String],
    retention: Retention,
    now: DateTime<Utc>,
) -> (Vec<String>, usize) {
    let mut artifacts = recognised(names);

    let delete: Vec<String> = match retention {
        Retention::Duration { hours } => {
            let Some(cutoff) = i64::try_from(hours)
                .ok()
                .and_then(chrono::Duration::try_hours)
            else {
                // Longer than chrono can represent: nothing is that old
                return (Vec::new(), artifacts.len());
            };
            artifacts
                .iter()
                .filter(|a| a.age(now) > cutoff)
                .map(|a| a.name.clone())
                .collect()
        }
        Retention::Count { keep } => {
            artifacts.sort_by(|a, b| {
                b.timestamp
                    .cmp(&a.timestamp)
                    .then_with(|| b.name.cmp(&a.name))
            });
            artifacts
                .iter()
                .skip(keep)
                .map(|a| a.name.clone())
                .collect()
        }
    };

    let kept = artifacts.len() - delete.len();
    (delete, kept)
}

async fn prune_target(
    target: &dyn Storage,
    retention: Retention,
    now: DateTime<Utc>,
) -> (TargetPruneReport, Vec<StorageError>) {
    let mut report = TargetPruneReport {
        target: target.url().to_string(),
        ..Default::default()
    };

    let names = match target.list().await {
        Ok(names) => names,
        Err(e) => {
            warn!("Failed to list {}: {}", target.url(), e);
            return (report, vec![e]);
        }
    };

    let (candidates, kept) = select_for_deletion(&names, retention, now);
    report.kept = kept;

    let mut errors = Vec::new();
    for name in candidates {
        match target.delete(&name).await {
            Ok(()) => {
                debug!("Deleted {} from {}", name, target.url());
                report.deleted.push(name);
            }
            Err(e) => {
                warn!("Failed to delete {} from {}: {}", name, target.url(), e);
                report.kept += 1;
                errors.push(e);
            }
        }
    }

    info!(
        "Pruned {}: deleted {}, kept {}",
        report.target,
        report.deleted.len(),
        report.kept
    );
    (report, errors)
}

/// Delete every artifact on every target that falls outside `retention`
///
/// `now` is the reference time ages are measured from. Targets are pruned
/// concurrently; a failure on one never stops the others, and every failure
/// is returned together.
pub async fn prune(
    targets: &[Arc<dyn Storage>],
    retention: &str,
    now: DateTime<Utc>,
) -> Result<PruneReport, PruneError> {
    if targets.is_empty() {
        return Err(PruneError::NoTargets);
    }

    let policy = Retention::parse(retention).map_err(|source| PruneError::InvalidRetention {
        input: retention.to_string(),
        source,
    })?;

    info!("Pruning {} target(s), retention {}", targets.len(), policy);

    let results = join_all(
        targets
            .iter()
            .map(|target| prune_target(target.as_ref(), policy, now)),
    )
    .await;

    let mut report = PruneReport::default();
    let mut errors = TargetErrors::default();
    for (target_report, failures) in results {
        for failure in failures {
            errors.push(&target_report.target, failure);
        }
        report.targets.push(target_report);
    }

    if errors.is_empty() {
        Ok(report)
    } else {
        Err(errors.into())
    }
}
