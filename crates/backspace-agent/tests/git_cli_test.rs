//! `GitCli` against a throwaway local "remote".
//!
//! Skipped when no `git` binary is on PATH.

use std::path::Path;
use std::process::Command;

use backspace_agent::config::{CommitIdentity, Secret};
use backspace_agent::git::{GitCli, GitError, SourceControl};

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Seed", "-c", "user.email=seed@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Bare repo with one commit containing `app.py`.
fn seeded_remote(root: &Path) -> std::path::PathBuf {
    let remote = root.join("remote.git");
    std::fs::create_dir(&remote).unwrap();
    git(&remote, &["init", "--bare", "--quiet"]);
    git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    let seed = root.join("seed");
    std::fs::create_dir(&seed).unwrap();
    git(&seed, &["init", "--quiet"]);
    std::fs::write(seed.join("app.py"), "x = 1\n").unwrap();
    git(&seed, &["add", "."]);
    git(&seed, &["commit", "--quiet", "-m", "seed"]);
    git(&seed, &["push", "--quiet", remote.to_str().unwrap(), "HEAD:refs/heads/main"]);
    remote
}

#[tokio::test]
async fn test_clone_branch_commit_push() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let remote = seeded_remote(root.path());
    let work = root.path().join("work");
    std::fs::create_dir(&work).unwrap();

    let cli = GitCli::default();
    let token = Secret::new("unused-token");
    cli.clone_repo(remote.to_str().unwrap(), &token, &work)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(work.join("app.py")).unwrap(), "x = 1\n");

    cli.configure_identity(&work, &CommitIdentity::default())
        .await
        .unwrap();

    let record = cli.checkout_branch(&work, "backspace-1").await.unwrap();
    assert_eq!(record.command, "git checkout -b backspace-1");
    assert_eq!(record.output, "Switched to a new branch 'backspace-1'");

    std::fs::write(work.join("app.py"), "x = 2\n").unwrap();
    let record = cli.add_all(&work).await.unwrap();
    assert_eq!(record.command, "git add .");

    let record = cli.commit(&work, "Automated changes: bump x").await.unwrap();
    assert_eq!(record.command, "git commit -m 'Automated changes: bump x'");
    assert!(record.output.ends_with("Automated changes: bump x"), "{}", record.output);

    let record = cli.push(&work, "backspace-1").await.unwrap();
    assert_eq!(record.command, "git push origin backspace-1");

    let branches = git(&remote, &["branch", "--list", "backspace-1"]);
    assert!(branches.contains("backspace-1"));
    let author = git(&remote, &["log", "-1", "--format=%an <%ae>", "backspace-1"]);
    assert_eq!(author, "Coding Agent <backspace-agent@users.noreply.github.com>");
}

#[tokio::test]
async fn test_commit_without_changes_is_error() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let remote = seeded_remote(root.path());
    let work = root.path().join("work");
    std::fs::create_dir(&work).unwrap();

    let cli = GitCli::default();
    cli.clone_repo(remote.to_str().unwrap(), &Secret::new("t"), &work)
        .await
        .unwrap();
    cli.configure_identity(&work, &CommitIdentity::default())
        .await
        .unwrap();
    cli.add_all(&work).await.unwrap();
    assert!(matches!(
        cli.commit(&work, "nothing").await,
        Err(GitError::NothingToCommit)
    ));
}

#[tokio::test]
async fn test_clone_failure_redacts_token() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("work");
    std::fs::create_dir(&work).unwrap();

    let token = Secret::new("ghp_very_secret");
    let missing = root.path().join("does-not-exist.git");
    let err = GitCli::default()
        .clone_repo(missing.to_str().unwrap(), &token, &work)
        .await
        .unwrap_err();
    assert!(matches!(err, GitError::Failed { .. }));
    assert!(!err.to_string().contains("ghp_very_secret"));
}
