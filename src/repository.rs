use crate::error::RagError;
use log::info;
use std::fs;
use std::path::Path;
use std::process::Command;

/// Turn `owner/name` into a GitHub clone URL; full URLs and local paths pass through
pub fn repository_url(repo: &str) -> String {
    let repo = repo.trim();
    if repo.contains("://") || repo.starts_with("git@") || Path::new(repo).is_absolute() {
        return repo.to_string();
    }
    format!("https://github.com/{}.git", repo.trim_end_matches(".git"))
}

/// Shallow-clone `repo` into `dest`, replacing whatever is there
pub fn clone_repository(repo: &str, dest: &Path) -> Result<(), RagError> {
    let url = repository_url(repo);
    let fail = |reason: String| RagError::RepositoryAcquisition {
        repo: repo.to_string(),
        reason,
    };

    if dest.exists() {
        info!("Removing stale checkout at {}", dest.display());
        fs::remove_dir_all(dest)
            .map_err(|e| fail(format!("failed to remove {}: {}", dest.display(), e)))?;
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| fail(format!("failed to create {}: {}", parent.display(), e)))?;
    }

    info!("Cloning {} into {}", url, dest.display());

    let output = Command::new("git")
        .args(["clone", "--depth", "1", "--quiet"])
        .arg(&url)
        .arg(dest)
        .output()
        .map_err(|e| fail(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(fail(format!("git clone exited with {}: {}", output.status, stderr.trim())));
    }

    Ok(())
}
