// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository synchronization through libgit2.

use crate::repo::{RepoSpec, Result, SyncError, Syncer};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Config, ErrorCode, FetchOptions, RemoteCallbacks, Repository,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{path::Path, time};
use tracing::{debug, info, instrument};

/// Git operations through libgit2.
///
/// Transfer progress is drawn through a progress bar per operation. If any
/// credentials are required, then the user will be prompted for them, and the
/// progress bar will be suspended for user input.
#[derive(Debug, Default, Clone)]
pub struct Git2Syncer {
    hidden: bool,
}

impl Git2Syncer {
    /// Construct new libgit2 syncer that draws progress bars.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct new libgit2 syncer that never draws progress bars.
    pub fn hidden() -> Self {
        Self { hidden: true }
    }

    fn progress_bar(&self, message: impl Into<String>) -> Result<ProgressBar> {
        if self.hidden {
            return Ok(ProgressBar::hidden());
        }

        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(message.into());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        Ok(bar)
    }

    fn fetch_options<'cb>(
        &self,
        spec: &RepoSpec,
        authenticator: &'cb GitAuthenticator,
        config: &'cb Config,
        bar: ProgressBar,
    ) -> FetchOptions<'cb> {
        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(config));
        rc.transfer_progress(move |progress| {
            let stats = progress.to_owned();
            let bar_size = stats.total_objects() as u64;
            let bar_pos = stats.received_objects() as u64;
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                bar.set_length(bar_size);
                bar.set_position(bar_pos);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        if spec.shallow {
            fo.depth(1);
        }

        fo
    }

    fn fast_forward(&self, spec: &RepoSpec, bar: ProgressBar) -> Result<()> {
        let repository = Repository::open(&spec.path)?;
        let head = repository.head()?;
        let branch = head
            .shorthand()
            .filter(|_| head.is_branch())
            .ok_or_else(|| SyncError::DetachedHead {
                path: spec.path.clone(),
            })?
            .to_string();

        let authenticator =
            GitAuthenticator::default().set_prompter(IndicatifPrompter::new(bar.clone()));
        let config = Config::open_default()?;
        let mut fo = self.fetch_options(spec, &authenticator, &config, bar);
        let mut remote = repository.find_remote("origin")?;
        remote.fetch(&[branch.as_str()], Some(&mut fo), None)?;

        let fetch_head = repository.find_reference("FETCH_HEAD")?;
        let fetch_commit = repository.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repository.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            debug!("{} already up to date", spec.path.display());
            return Ok(());
        }

        if !analysis.is_fast_forward() {
            return Err(SyncError::Diverged {
                path: spec.path.clone(),
            });
        }

        // INVARIANT: Bring work tree along first, then move branch.
        //   - Safe checkout keeps uncommitted edits, and refuses when incoming
        //     changes would overwrite them.
        let target = repository.find_object(fetch_commit.id(), None)?;
        repository
            .checkout_tree(&target, Some(CheckoutBuilder::default().safe()))
            .map_err(|error| match error.code() {
                ErrorCode::Conflict => SyncError::LocalChanges {
                    path: spec.path.clone(),
                },
                _ => SyncError::Git2(error),
            })?;

        let refname = format!("refs/heads/{branch}");
        let mut reference = repository.find_reference(&refname)?;
        reference.set_target(fetch_commit.id(), "dotstrap: fast-forward")?;
        repository.set_head(&refname)?;
        info!("fast-forwarded {} to {}", spec.path.display(), fetch_commit.id());

        Ok(())
    }
}

impl Syncer for Git2Syncer {
    #[instrument(skip(self, spec), level = "debug")]
    fn clone_repo(&self, spec: &RepoSpec) -> Result<()> {
        if let Some(parent) = spec.path.parent() {
            mkdirp::mkdirp(parent).map_err(|source| SyncError::CreateDir {
                source,
                path: parent.to_path_buf(),
            })?;
        }

        let bar = self.progress_bar(spec.url.as_str())?;
        let authenticator =
            GitAuthenticator::default().set_prompter(IndicatifPrompter::new(bar.clone()));
        let config = Config::open_default()?;
        let fo = self.fetch_options(spec, &authenticator, &config, bar.clone());
        let result = RepoBuilder::new()
            .fetch_options(fo)
            .clone(&spec.url, &spec.path)
            .map(|_| ());
        bar.finish_and_clear();

        result.map_err(|source| SyncError::Clone {
            source: Box::new(source),
            url: spec.url.clone(),
        })
    }

    #[instrument(skip(self, spec), level = "debug")]
    fn pull(&self, spec: &RepoSpec) -> Result<()> {
        let bar = self.progress_bar(spec.path.display().to_string())?;
        let result = self.fast_forward(spec, bar.clone());
        bar.finish_and_clear();

        // INVARIANT: Raw libgit2 failures always name the clone being pulled.
        result.map_err(|error| match error {
            SyncError::Git2(source) => SyncError::Pull {
                source: Box::new(source),
                path: spec.path.clone(),
            },
            other => other,
        })
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}
