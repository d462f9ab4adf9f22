// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository synchronization.
//!
//! The dotfiles repository, every shell plugin, the prompt theme, and the
//! multiplexer plugin manager all follow the same protocol: clone the remote
//! if the local destination does not exist yet, otherwise pull inside the
//! existing destination. A destination is never recreated or deleted.
//!
//! # Backends
//!
//! The protocol is driven through the [`Syncer`] trait. [`GitCli`] calls the
//! git binary, while [`Git2Syncer`] talks to remotes through libgit2 and
//! shows transfer progress. Both honor shallow clones.
//!
//! # Failure Policy
//!
//! Clone failures always propagate. Pull failures are subject to the
//! [`FailurePolicy`] of the repository descriptor, which lets the multiplexer
//! plugin manager keep going when its update fails while everything else
//! aborts.

mod libgit2;

pub use libgit2::{Git2Syncer, IndicatifPrompter};

use crate::{
    config::{FailurePolicy, RepoEntry},
    syscall::{Invocation, Syscall},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Repository descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    /// Remote URL to clone from.
    pub url: String,

    /// Local destination of clone.
    pub path: PathBuf,

    /// Only fetch the latest commit.
    pub shallow: bool,

    /// What to do when pulling fails.
    pub on_update_failure: FailurePolicy,
}

impl RepoSpec {
    /// Construct new repository descriptor that aborts on update failure.
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            shallow: false,
            on_update_failure: FailurePolicy::Abort,
        }
    }

    /// Construct repository descriptor for entry placed inside a directory.
    pub fn from_entry(entry: &RepoEntry, parent: impl AsRef<Path>) -> Self {
        Self::new(&entry.url, parent.as_ref().join(&entry.name)).shallow(entry.shallow)
    }

    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    pub fn on_update_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_update_failure = policy;
        self
    }
}

/// Result of synchronizing one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Destination did not exist, and was cloned.
    Cloned,

    /// Destination existed, and was pulled.
    Updated,

    /// Destination existed, pulling failed, and failure was tolerated.
    UpdateSkipped,
}

impl Display for SyncOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Cloned => fmt.write_str("cloned"),
            Self::Updated => fmt.write_str("updated"),
            Self::UpdateSkipped => fmt.write_str("update skipped"),
        }
    }
}

/// Layer of indirection for git operations.
pub trait Syncer {
    /// Clone remote into destination, which does not exist yet.
    fn clone_repo(&self, spec: &RepoSpec) -> Result<()>;

    /// Pull into existing destination.
    fn pull(&self, spec: &RepoSpec) -> Result<()>;
}

/// Clone or update repository.
///
/// # Errors
///
/// - Return [`SyncError`] if clone fails.
/// - Return [`SyncError`] if pull fails and descriptor does not tolerate it.
#[instrument(skip(syncer, spec), fields(path = %spec.path.display()), level = "debug")]
pub fn sync(syncer: &dyn Syncer, spec: &RepoSpec) -> Result<SyncOutcome> {
    if !spec.path.exists() {
        info!("clone {} into {}", spec.url, spec.path.display());
        syncer.clone_repo(spec)?;
        return Ok(SyncOutcome::Cloned);
    }

    info!("update {}", spec.path.display());
    match syncer.pull(spec) {
        Ok(()) => Ok(SyncOutcome::Updated),
        Err(error) if spec.on_update_failure.is_tolerated() => {
            warn!("ignoring failed update of {}: {error}", spec.path.display());
            Ok(SyncOutcome::UpdateSkipped)
        }
        Err(error) => Err(error),
    }
}

/// Git operations through the git binary.
pub struct GitCli<'a> {
    syscall: &'a dyn Syscall,
}

impl<'a> GitCli<'a> {
    /// Construct new git binary syncer.
    pub fn new(syscall: &'a dyn Syscall) -> Self {
        Self { syscall }
    }
}

impl Syncer for GitCli<'_> {
    fn clone_repo(&self, spec: &RepoSpec) -> Result<()> {
        let mut invocation = Invocation::new("git").arg("clone");
        if spec.shallow {
            invocation = invocation.args(["--depth", "1"]);
        }
        invocation = invocation.arg(&spec.url).arg(&spec.path);

        self.syscall.interactive(&invocation).map_err(|source| SyncError::Clone {
            source: Box::new(source),
            url: spec.url.clone(),
        })
    }

    fn pull(&self, spec: &RepoSpec) -> Result<()> {
        let invocation = Invocation::new("git")
            .arg("-C")
            .arg(&spec.path)
            .arg("pull");

        self.syscall.interactive(&invocation).map_err(|source| SyncError::Pull {
            source: Box::new(source),
            path: spec.path.clone(),
        })
    }
}

/// Repository synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Cloning remote failed.
    #[error("failed to clone {url}")]
    Clone {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        url: String,
    },

    /// Pulling into existing clone failed.
    #[error("failed to update {:?}", path.display())]
    Pull {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        path: PathBuf,
    },

    /// Local branch cannot be fast-forwarded to remote branch.
    #[error("cannot fast-forward {:?}, local and remote have diverged", path.display())]
    Diverged { path: PathBuf },

    /// Incoming changes would overwrite uncommitted edits in local clone.
    #[error("cannot update {:?}, uncommitted changes would be overwritten", path.display())]
    LocalChanges { path: PathBuf },

    /// Local clone has no branch checked out.
    #[error("cannot update {:?}, HEAD is detached", path.display())]
    DetachedHead { path: PathBuf },

    /// Parent directory of clone cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

impl SyncError {
    /// Exit code of a failed git binary call, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Clone { source, .. } | Self::Pull { source, .. } => source
                .downcast_ref::<crate::syscall::SyscallError>()
                .and_then(|error| error.exit_code()),
            _ => None,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::fake::FakeSyscall;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{cell::RefCell, fs::create_dir_all};

    /// Syncer that creates the destination on clone, like git would.
    #[derive(Default)]
    struct DirSyncer {
        log: RefCell<Vec<String>>,
        fail_pull: bool,
    }

    impl Syncer for DirSyncer {
        fn clone_repo(&self, spec: &RepoSpec) -> Result<()> {
            self.log.borrow_mut().push(format!("clone {}", spec.url));
            create_dir_all(&spec.path).map_err(|source| SyncError::CreateDir {
                source,
                path: spec.path.clone(),
            })
        }

        fn pull(&self, spec: &RepoSpec) -> Result<()> {
            self.log.borrow_mut().push(format!("pull {}", spec.url));
            if self.fail_pull {
                return Err(SyncError::Diverged {
                    path: spec.path.clone(),
                });
            }
            Ok(())
        }
    }

    #[sealed_test]
    fn sync_clones_once_then_updates() -> anyhow::Result<()> {
        let syncer = DirSyncer::default();
        let spec = RepoSpec::new("https://blah.org/dots.git", std::env::current_dir()?.join("dots"));

        assert_eq!(sync(&syncer, &spec)?, SyncOutcome::Cloned);
        assert_eq!(sync(&syncer, &spec)?, SyncOutcome::Updated);
        assert_eq!(
            syncer.log.into_inner(),
            vec![
                "clone https://blah.org/dots.git".to_string(),
                "pull https://blah.org/dots.git".to_string(),
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn sync_honors_update_failure_policy() -> anyhow::Result<()> {
        let syncer = DirSyncer {
            fail_pull: true,
            ..Default::default()
        };
        let path = std::env::current_dir()?.join("tpm");
        create_dir_all(&path)?;

        let strict = RepoSpec::new("https://blah.org/tpm", &path);
        assert!(matches!(sync(&syncer, &strict), Err(SyncError::Diverged { .. })));

        let lenient = strict.on_update_failure(FailurePolicy::Tolerate);
        assert_eq!(sync(&syncer, &lenient)?, SyncOutcome::UpdateSkipped);

        Ok(())
    }

    #[test]
    fn git_cli_command_lines() -> anyhow::Result<()> {
        let syscall = FakeSyscall::new();
        let git = GitCli::new(&syscall);
        let entry = RepoEntry::new("powerlevel10k", "https://blah.org/p10k.git", true);
        let spec = RepoSpec::from_entry(&entry, "/home/blah/custom/themes");

        git.clone_repo(&spec)?;
        git.pull(&spec)?;
        assert_eq!(
            syscall.command_lines(),
            vec![
                "git clone --depth 1 https://blah.org/p10k.git /home/blah/custom/themes/powerlevel10k",
                "git -C /home/blah/custom/themes/powerlevel10k pull",
            ]
        );

        Ok(())
    }

    #[test]
    fn git_cli_clone_failure_keeps_exit_code() {
        let syscall = FakeSyscall::new().with_failure("git clone");
        let git = GitCli::new(&syscall);
        let result = git.clone_repo(&RepoSpec::new("https://blah.org/dots.git", "/nowhere/dots"));

        match result {
            Err(error @ SyncError::Clone { .. }) => assert_eq!(error.exit_code(), Some(1)),
            other => panic!("expected clone error, got {other:?}"),
        }
    }
}
