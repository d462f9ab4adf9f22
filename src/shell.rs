// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Login shell switching.

use crate::{
    config::ShellSettings,
    syscall::{Invocation, Syscall, SyscallError},
};

use std::{
    fs::canonicalize,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// Snapshot of the invoking user's session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Session {
    /// Current login shell, i.e., `$SHELL`.
    pub shell: Option<PathBuf>,

    /// Name of invoking user, i.e., `$USER`.
    pub user: Option<String>,
}

impl Session {
    /// Read session from current process environment.
    pub fn from_env() -> Self {
        Self {
            shell: std::env::var_os("SHELL")
                .filter(|shell| !shell.is_empty())
                .map(PathBuf::from),
            user: std::env::var("USER").ok().filter(|user| !user.is_empty()),
        }
    }
}

/// What happened to the login shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    /// Login shell already is the target shell.
    Unchanged,

    /// Login shell was changed to target shell at path.
    Changed(PathBuf),

    /// Target shell is not installed yet, so it could not be switched to.
    Pending(String),
}

/// Change login shell to target shell.
pub struct ShellSwitcher<'a> {
    settings: &'a ShellSettings,
    syscall: &'a dyn Syscall,
}

impl<'a> ShellSwitcher<'a> {
    /// Construct new shell switcher.
    pub fn new(settings: &'a ShellSettings, syscall: &'a dyn Syscall) -> Self {
        Self { settings, syscall }
    }

    /// Change login shell if it differs from target shell.
    ///
    /// Both shells are compared by resolved path, so `/bin/zsh` and
    /// `/usr/bin/zsh` count as the same shell when one links to the other.
    ///
    /// # Errors
    ///
    /// - Return [`ShellError::NotFound`] if target shell is not on search
    ///   path.
    /// - Return [`ShellError::NoChangeCommand`] if change command is empty.
    /// - Return [`ShellError::Change`] if change command fails.
    #[instrument(skip(self, session), level = "debug")]
    pub fn switch(&self, session: &Session) -> Result<ShellOutcome> {
        let target = self
            .syscall
            .locate(&self.settings.target)
            .ok_or_else(|| ShellError::NotFound(self.settings.target.clone()))?;
        let target = resolve(&target);

        if session.shell.as_deref().map(resolve).as_ref() == Some(&target) {
            info!("login shell already is {}", target.display());
            return Ok(ShellOutcome::Unchanged);
        }

        info!("change login shell to {}", target.display());
        let mut invocation = Invocation::from_command_line(&self.settings.change)
            .ok_or(ShellError::NoChangeCommand)?
            .arg(&target);
        if let Some(user) = &session.user {
            invocation = invocation.arg(user);
        }
        self.syscall.interactive(&invocation)?;

        Ok(ShellOutcome::Changed(target))
    }
}

fn resolve(path: &Path) -> PathBuf {
    canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Shell switching error types.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Target shell is not installed.
    #[error("shell {0:?} not found on search path")]
    NotFound(String),

    /// No shell change command configured.
    #[error("no command configured to change login shell")]
    NoChangeCommand,

    /// Shell change command failed.
    #[error(transparent)]
    Change(#[from] SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = ShellError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::fake::FakeSyscall;
    use pretty_assertions::assert_eq;

    #[test]
    fn same_shell_means_no_change_request() -> anyhow::Result<()> {
        let settings = ShellSettings::default();
        let syscall = FakeSyscall::new().with_tools(["zsh"]);
        let session = Session {
            shell: Some(PathBuf::from("/fake/bin/zsh")),
            user: Some("blah".into()),
        };

        let outcome = ShellSwitcher::new(&settings, &syscall).switch(&session)?;
        assert_eq!(outcome, ShellOutcome::Unchanged);
        assert!(syscall.command_lines().is_empty());

        Ok(())
    }

    #[test]
    fn different_shell_requests_change_for_user() -> anyhow::Result<()> {
        let settings = ShellSettings::default();
        let syscall = FakeSyscall::new().with_tools(["zsh"]);
        let session = Session {
            shell: Some(PathBuf::from("/fake/bin/bash")),
            user: Some("blah".into()),
        };

        let outcome = ShellSwitcher::new(&settings, &syscall).switch(&session)?;
        assert_eq!(outcome, ShellOutcome::Changed(PathBuf::from("/fake/bin/zsh")));
        assert_eq!(syscall.command_lines(), vec!["sudo chsh -s /fake/bin/zsh blah"]);

        Ok(())
    }

    #[test]
    fn unknown_session_still_changes_shell() -> anyhow::Result<()> {
        let settings = ShellSettings {
            change: vec!["chsh".into(), "-s".into()],
            ..ShellSettings::default()
        };
        let syscall = FakeSyscall::new().with_tools(["zsh"]);

        ShellSwitcher::new(&settings, &syscall).switch(&Session::default())?;
        assert_eq!(syscall.command_lines(), vec!["chsh -s /fake/bin/zsh"]);

        Ok(())
    }

    #[test]
    fn missing_target_shell_is_an_error() {
        let settings = ShellSettings::default();
        let syscall = FakeSyscall::new();

        let result = ShellSwitcher::new(&settings, &syscall).switch(&Session::default());
        assert!(matches!(result, Err(ShellError::NotFound(name)) if name == "zsh"));
    }

    #[test]
    fn failed_change_is_fatal() {
        let settings = ShellSettings::default();
        let syscall = FakeSyscall::new().with_tools(["zsh"]).with_failure("sudo chsh");

        let result = ShellSwitcher::new(&settings, &syscall).switch(&Session::default());
        assert!(matches!(result, Err(ShellError::Change(_))));
    }
}
