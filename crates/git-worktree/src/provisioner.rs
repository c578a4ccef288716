//! Per-issue worktree provisioning

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::commands::{
    branch_exists, detect_default_branch, git_command, git_command_checked, is_git_repository,
};
use crate::error::{Result, WorktreeError};

/// Result of a provisioning call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeResult {
    /// Absolute path to the worktree
    pub worktree_path: PathBuf,
    /// Branch checked out in the worktree
    pub branch_name: String,
    /// Whether the branch (and its worktree) already existed
    pub branch_existed: bool,
}

/// A worktree as reported by `git worktree list`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worktree {
    pub path: PathBuf,
    pub branch: String,
    pub head: String,
    pub is_main: bool,
}

/// Configuration for the provisioner
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Directory (relative to the repository root) where worktrees live
    pub worktree_dir: PathBuf,
    /// Prefix for issue branch names
    pub branch_prefix: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            worktree_dir: PathBuf::from(".worktrees"),
            branch_prefix: "issue-".to_string(),
        }
    }
}

/// Provisions one isolated worktree per (repository, issue) pair.
///
/// Mutating git operations are serialized through a per-repository lock:
/// requests against the same repository queue up in FIFO order, requests
/// against unrelated repositories proceed concurrently. A failed request
/// releases the lock like any other, so the queue never stalls.
pub struct WorktreeProvisioner {
    config: ProvisionerConfig,
    repo_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl WorktreeProvisioner {
    pub fn new() -> Self {
        Self::with_config(ProvisionerConfig::default())
    }

    pub fn with_config(config: ProvisionerConfig) -> Self {
        Self {
            config,
            repo_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The serial-queue lock for one repository. Keyed by canonical path so
    /// two spellings of the same repository share a queue.
    async fn repo_lock(&self, repo_path: &Path) -> Arc<Mutex<()>> {
        let key = repo_path
            .canonicalize()
            .unwrap_or_else(|_| repo_path.to_path_buf());
        let mut locks = self.repo_locks.lock().await;
        Arc::clone(locks.entry(key).or_default())
    }

    fn branch_name(&self, issue_number: u64) -> String {
        format!("{}{}", self.config.branch_prefix, issue_number)
    }

    fn worktree_path(&self, repo_path: &Path, branch_name: &str) -> PathBuf {
        repo_path.join(&self.config.worktree_dir).join(branch_name)
    }

    /// Ensure a worktree exists for the given issue.
    ///
    /// Idempotent: if the issue branch already exists the existing worktree
    /// path is returned with `branch_existed = true` (re-checking it out if
    /// the directory was pruned). Otherwise a new branch is cut from
    /// `base_branch` (the repository default when `None`) at its current tip.
    pub async fn create_worktree_for_issue(
        &self,
        repo_path: &Path,
        issue_number: u64,
        base_branch: Option<&str>,
    ) -> Result<WorktreeResult> {
        if !is_git_repository(repo_path).await? {
            return Err(WorktreeError::NotAGitRepository {
                path: repo_path.to_path_buf(),
            });
        }

        let lock = self.repo_lock(repo_path).await;
        let _guard = lock.lock().await;

        let branch_name = self.branch_name(issue_number);
        let worktree_path = self.worktree_path(repo_path, &branch_name);

        if branch_exists(repo_path, &branch_name).await? {
            if !worktree_path.exists() {
                // The branch survived but its checkout was removed; prune the
                // stale registration and check it out again.
                debug!(
                    "Re-checking out existing branch {} at {:?}",
                    branch_name, worktree_path
                );
                git_command_checked(repo_path, &["worktree", "prune"]).await?;
                tokio::fs::create_dir_all(repo_path.join(&self.config.worktree_dir)).await?;
                git_command_checked(
                    repo_path,
                    &[
                        "worktree",
                        "add",
                        worktree_path.to_string_lossy().as_ref(),
                        &branch_name,
                    ],
                )
                .await?;
            }

            return Ok(WorktreeResult {
                worktree_path,
                branch_name,
                branch_existed: true,
            });
        }

        let base = match base_branch {
            Some(base) => base.to_string(),
            None => detect_default_branch(repo_path).await?,
        };
        if !branch_exists(repo_path, &base).await? {
            return Err(WorktreeError::BranchNotFound { branch: base });
        }

        tokio::fs::create_dir_all(repo_path.join(&self.config.worktree_dir)).await?;

        info!(
            "Creating worktree for issue {} at {:?} from branch {}",
            issue_number, worktree_path, base
        );

        git_command_checked(
            repo_path,
            &[
                "worktree",
                "add",
                "-b",
                &branch_name,
                worktree_path.to_string_lossy().as_ref(),
                &base,
            ],
        )
        .await?;

        Ok(WorktreeResult {
            worktree_path,
            branch_name,
            branch_existed: false,
        })
    }

    /// Remove a worktree checkout. Removing an already-absent path succeeds
    /// silently; the branch is left alone.
    pub async fn remove_worktree(&self, repo_path: &Path, worktree_path: &Path) -> Result<()> {
        let lock = self.repo_lock(repo_path).await;
        let _guard = lock.lock().await;

        if worktree_path.exists() {
            info!("Removing worktree at {:?}", worktree_path);
            git_command_checked(
                repo_path,
                &[
                    "worktree",
                    "remove",
                    "--force",
                    worktree_path.to_string_lossy().as_ref(),
                ],
            )
            .await?;
        } else {
            debug!("Worktree at {:?} already absent", worktree_path);
        }

        // Drop any stale registration either way.
        if let Err(e) = git_command_checked(repo_path, &["worktree", "prune"]).await {
            warn!("git worktree prune failed: {}", e);
        }

        Ok(())
    }

    /// List all worktrees of a repository
    pub async fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<Worktree>> {
        let output =
            git_command_checked(repo_path, &["worktree", "list", "--porcelain"]).await?;

        let mut worktrees = Vec::new();
        let mut current: Option<Worktree> = None;

        for line in output.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                if let Some(wt) = current.take() {
                    worktrees.push(wt);
                }
                current = Some(Worktree {
                    path: PathBuf::from(path),
                    branch: String::new(),
                    head: String::new(),
                    is_main: false,
                });
            } else if let Some(ref mut wt) = current {
                if let Some(head) = line.strip_prefix("HEAD ") {
                    wt.head = head.to_string();
                } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
                    wt.branch = branch.to_string();
                }
            }
        }
        if let Some(wt) = current {
            worktrees.push(wt);
        }

        // The first entry is the primary working directory.
        if let Some(first) = worktrees.first_mut() {
            first.is_main = true;
        }

        Ok(worktrees)
    }

    /// Check if a worktree has uncommitted changes
    pub async fn has_uncommitted_changes(&self, worktree_path: &Path) -> Result<bool> {
        let output = git_command(worktree_path, &["status", "--porcelain"]).await?;
        Ok(!output.stdout.trim().is_empty())
    }
}

impl Default for WorktreeProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::git_command_checked;
    use tempfile::TempDir;

    async fn init_test_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git_command_checked(dir.path(), &["init", "-b", "main"])
            .await
            .unwrap();
        git_command_checked(dir.path(), &["config", "user.email", "test@test.com"])
            .await
            .unwrap();
        git_command_checked(dir.path(), &["config", "user.name", "Test"])
            .await
            .unwrap();

        let test_file = dir.path().join("test.txt");
        tokio::fs::write(&test_file, "test content").await.unwrap();
        git_command_checked(dir.path(), &["add", "."])
            .await
            .unwrap();
        git_command_checked(dir.path(), &["commit", "-m", "Initial commit"])
            .await
            .unwrap();

        dir
    }

    #[tokio::test]
    async fn test_create_worktree_for_issue() {
        let dir = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        let result = provisioner
            .create_worktree_for_issue(dir.path(), 42, Some("main"))
            .await
            .unwrap();

        assert!(result.worktree_path.exists());
        assert_eq!(result.branch_name, "issue-42");
        assert!(!result.branch_existed);
    }

    #[tokio::test]
    async fn test_provisioning_is_idempotent() {
        let dir = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        let first = provisioner
            .create_worktree_for_issue(dir.path(), 42, Some("main"))
            .await
            .unwrap();
        let second = provisioner
            .create_worktree_for_issue(dir.path(), 42, Some("main"))
            .await
            .unwrap();

        assert!(second.branch_existed);
        assert_eq!(second.worktree_path, first.worktree_path);
        assert_eq!(second.branch_name, first.branch_name);
    }

    #[tokio::test]
    async fn test_concurrent_same_issue_yields_one_worktree() {
        let dir = init_test_repo().await;
        let provisioner = Arc::new(WorktreeProvisioner::new());

        let a = {
            let provisioner = Arc::clone(&provisioner);
            let path = dir.path().to_path_buf();
            tokio::spawn(async move {
                provisioner
                    .create_worktree_for_issue(&path, 7, Some("main"))
                    .await
            })
        };
        let b = {
            let provisioner = Arc::clone(&provisioner);
            let path = dir.path().to_path_buf();
            tokio::spawn(async move {
                provisioner
                    .create_worktree_for_issue(&path, 7, Some("main"))
                    .await
            })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a.worktree_path, b.worktree_path);
        // Exactly one of the two actually created the branch.
        assert!(a.branch_existed != b.branch_existed);
    }

    #[tokio::test]
    async fn test_independent_repositories_do_not_interfere() {
        let repo_a = init_test_repo().await;
        let repo_b = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        let (a, b) = tokio::join!(
            provisioner.create_worktree_for_issue(repo_a.path(), 1, Some("main")),
            provisioner.create_worktree_for_issue(repo_b.path(), 1, Some("main")),
        );

        assert!(a.unwrap().worktree_path.starts_with(repo_a.path()));
        assert!(b.unwrap().worktree_path.starts_with(repo_b.path()));
    }

    #[tokio::test]
    async fn test_default_branch_used_when_base_omitted() {
        let dir = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        let result = provisioner
            .create_worktree_for_issue(dir.path(), 3, None)
            .await
            .unwrap();
        assert_eq!(result.branch_name, "issue-3");
        assert!(result.worktree_path.exists());
    }

    #[tokio::test]
    async fn test_missing_base_branch() {
        let dir = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        let result = provisioner
            .create_worktree_for_issue(dir.path(), 5, Some("nonexistent"))
            .await;
        assert!(matches!(result, Err(WorktreeError::BranchNotFound { .. })));
    }

    #[tokio::test]
    async fn test_not_a_git_repository() {
        let dir = TempDir::new().unwrap();
        let provisioner = WorktreeProvisioner::new();

        let result = provisioner
            .create_worktree_for_issue(dir.path(), 1, None)
            .await;
        assert!(matches!(
            result,
            Err(WorktreeError::NotAGitRepository { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_worktree_is_idempotent() {
        let dir = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        let result = provisioner
            .create_worktree_for_issue(dir.path(), 42, Some("main"))
            .await
            .unwrap();
        let path = result.worktree_path.clone();
        assert!(path.exists());

        provisioner
            .remove_worktree(dir.path(), &path)
            .await
            .unwrap();
        assert!(!path.exists());

        // Second removal of the now-absent path succeeds silently.
        provisioner
            .remove_worktree(dir.path(), &path)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reprovision_after_checkout_removed() {
        let dir = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        let first = provisioner
            .create_worktree_for_issue(dir.path(), 9, Some("main"))
            .await
            .unwrap();
        provisioner
            .remove_worktree(dir.path(), &first.worktree_path)
            .await
            .unwrap();

        // The branch survives removal, so re-provisioning reuses it.
        let second = provisioner
            .create_worktree_for_issue(dir.path(), 9, Some("main"))
            .await
            .unwrap();
        assert!(second.branch_existed);
        assert!(second.worktree_path.exists());
    }

    #[tokio::test]
    async fn test_list_worktrees() {
        let dir = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        provisioner
            .create_worktree_for_issue(dir.path(), 1, Some("main"))
            .await
            .unwrap();

        let worktrees = provisioner.list_worktrees(dir.path()).await.unwrap();
        assert!(worktrees.len() >= 2);
        assert!(worktrees[0].is_main);
        assert!(worktrees.iter().any(|wt| wt.branch == "issue-1"));
    }

    #[tokio::test]
    async fn test_has_uncommitted_changes() {
        let dir = init_test_repo().await;
        let provisioner = WorktreeProvisioner::new();

        let result = provisioner
            .create_worktree_for_issue(dir.path(), 2, Some("main"))
            .await
            .unwrap();

        assert!(!provisioner
            .has_uncommitted_changes(&result.worktree_path)
            .await
            .unwrap());

        tokio::fs::write(result.worktree_path.join("new.txt"), "x")
            .await
            .unwrap();
        assert!(provisioner
            .has_uncommitted_changes(&result.worktree_path)
            .await
            .unwrap());
    }
}
