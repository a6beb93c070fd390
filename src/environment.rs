// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Facts about the running installation reported to the app

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;

/// Package version reported by the `version` query
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime the process was launched from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeContext {
    None,
    Colab,
    Databricks,
    IPython,
}

impl RuntimeContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeContext::None => "NONE",
            RuntimeContext::Colab => "COLAB",
            RuntimeContext::Databricks => "DATABRICKS",
            RuntimeContext::IPython => "IPYTHON",
        }
    }

    /// Detect the context from environment variables set by the host runtime
    pub fn detect<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("COLAB_GPU").is_some() || lookup("COLAB_RELEASE_TAG").is_some() {
            RuntimeContext::Colab
        } else if lookup("DATABRICKS_RUNTIME_VERSION").is_some() {
            RuntimeContext::Databricks
        } else if lookup("JPY_PARENT_PID").is_some() {
            RuntimeContext::IPython
        } else {
            RuntimeContext::None
        }
    }

    pub fn from_env() -> Self {
        Self::detect(|key| std::env::var(key).ok())
    }
}

/// Development or release-candidate build
pub fn is_dev_build(forced: bool) -> bool {
    forced || VERSION.contains("dev") || VERSION.contains("rc")
}

async fn read_user_id(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(uid) => Ok(Some(uid.trim().to_string()).filter(|uid| !uid.is_empty())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read user id: {}", path.display())),
    }
}

/// Read the persistent user id, creating it on first use.
///
/// Returns the id and whether it was created by this call. The id is
/// written to a scratch file and linked into place, so concurrent first
/// calls agree on a single id.
pub async fn user_id(path: &Path) -> Result<(String, bool)> {
    if let Some(uid) = read_user_id(path).await? {
        return Ok((uid, false));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let uid = uuid::Uuid::new_v4().to_string();
    let scratch = path.with_extension(format!("{}.tmp", uid));
    tokio::fs::write(&scratch, &uid)
        .await
        .with_context(|| format!("Failed to write user id: {}", scratch.display()))?;
    let linked = tokio::fs::hard_link(&scratch, path).await;
    if let Err(e) = tokio::fs::remove_file(&scratch).await {
        tracing::warn!("Failed to remove {}: {}", scratch.display(), e);
    }

    match linked {
        Ok(()) => {
            tracing::info!("Created user id at {}", path.display());
            Ok((uid, true))
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => match read_user_id(path).await? {
            Some(existing) => Ok((existing, false)),
            None => {
                // an empty id file is replaced
                tokio::fs::write(path, &uid)
                    .await
                    .with_context(|| format!("Failed to write user id: {}", path.display()))?;
                Ok((uid, true))
            }
        },
        Err(e) => Err(e).with_context(|| format!("Failed to write user id: {}", path.display())),
    }
}

#[derive(Debug, Deserialize)]
struct TeamsSubmission {
    #[serde(default)]
    submitted: bool,
}

/// Whether the teams form was submitted; false when the marker file is absent
pub async fn teams_submission(path: &Path) -> Result<bool> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let marker: TeamsSubmission =
        serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(marker.submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("labelscope-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_context_detection() {
        assert_eq!(RuntimeContext::detect(|_| None), RuntimeContext::None);
        assert_eq!(
            RuntimeContext::detect(|k| (k == "DATABRICKS_RUNTIME_VERSION").then(|| "12.2".to_string())),
            RuntimeContext::Databricks
        );
        assert_eq!(
            RuntimeContext::detect(|k| (k == "JPY_PARENT_PID").then(|| "1".to_string())).as_str(),
            "IPYTHON"
        );
    }

    #[tokio::test]
    async fn test_user_id_is_stable() {
        let dir = scratch_dir();
        let path = dir.join("var").join("uid");

        let (first, created) = user_id(&path).await.unwrap();
        assert!(created);
        let (second, created) = user_id(&path).await.unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(dir.join("var")).unwrap().count(), 1);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_agrees_on_one_id() {
        let dir = scratch_dir();
        let path = dir.join("uid");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                tokio::spawn(async move { user_id(&path).await.unwrap() })
            })
            .collect();
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }

        assert_eq!(ids.iter().filter(|(_, created)| *created).count(), 1);
        assert!(ids.iter().all(|(uid, _)| *uid == ids[0].0));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ids[0].0);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_empty_user_id_is_replaced() {
        let dir = scratch_dir();
        let path = dir.join("uid");
        std::fs::write(&path, "  \n").unwrap();

        let (uid, created) = user_id(&path).await.unwrap();
        assert!(created);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), uid);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_teams_submission() {
        let dir = scratch_dir();
        let path = dir.join("teams.json");
        assert!(!teams_submission(&path).await.unwrap());

        std::fs::write(&path, r#"{"submitted": true}"#).unwrap();
        assert!(teams_submission(&path).await.unwrap());

        std::fs::write(&path, "not json").unwrap();
        assert!(teams_submission(&path).await.is_err());

        std::fs::remove_dir_all(dir).ok();
    }
}
