// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External program invocation.
//!
//! Every step of a bootstrap run boils down to calling some external program:
//! a package manager, git, curl, sh, chsh. This module models those calls as
//! plain [`Invocation`] values, and routes them through the [`Syscall`] trait
//! so the caller can swap real process spawning for a dry run.
//!
//! Interactive calls inherit the standard streams of the current process,
//! which lets sudo, git credential helpers, and chsh prompt the user directly.
//! Captured calls collect standard output instead.

use crate::path::locate_executable;

use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    process::Command,
};
use tracing::{debug, info};

/// A single external program call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl Invocation {
    /// Construct new invocation of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Construct invocation from a command line whose first item is the
    /// program.
    ///
    /// Returns `None` for an empty command line.
    pub fn from_command_line(line: impl IntoIterator<Item = impl Into<OsString>>) -> Option<Self> {
        let mut line = line.into_iter().map(Into::into);
        let program = line.next()?;
        Some(Self::new(program).args(line))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.envs.iter().map(|(key, value)| (key, value)));

        command
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for (key, value) in &self.envs {
            write!(fmt, "{}={} ", key.to_string_lossy(), value.to_string_lossy())?;
        }

        write!(fmt, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(fmt, " {arg:?}")?;
            } else {
                write!(fmt, " {arg}")?;
            }
        }

        Ok(())
    }
}

/// Layer of indirection for calling external programs.
pub trait Syscall {
    /// Run program attached to current process' standard streams.
    fn interactive(&self, invocation: &Invocation) -> Result<()>;

    /// Run program and capture its standard output.
    fn captured(&self, invocation: &Invocation) -> Result<String>;

    /// Locate executable on the search path.
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// Call external programs for real.
#[derive(Debug, Default, Clone)]
pub struct SystemCall;

impl Syscall for SystemCall {
    fn interactive(&self, invocation: &Invocation) -> Result<()> {
        debug!("run {invocation}");
        let status = invocation
            .to_command()
            .spawn()
            .map_err(|source| SyscallError::Spawn {
                source,
                program: invocation.program.clone(),
            })?
            .wait()
            .map_err(|source| SyscallError::Spawn {
                source,
                program: invocation.program.clone(),
            })?;

        if !status.success() {
            return Err(SyscallError::Status {
                program: invocation.program.clone(),
                code: status.code(),
                message: String::new(),
            });
        }

        Ok(())
    }

    fn captured(&self, invocation: &Invocation) -> Result<String> {
        debug!("capture {invocation}");
        let output = invocation
            .to_command()
            .output()
            .map_err(|source| SyscallError::Spawn {
                source,
                program: invocation.program.clone(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(output.stderr.as_slice());

            // INVARIANT: Chomp trailing newlines.
            let message = stderr.trim_end_matches(['\r', '\n']).to_string();
            return Err(SyscallError::Status {
                program: invocation.program.clone(),
                code: output.status.code(),
                message,
            });
        }

        Ok(String::from_utf8_lossy(output.stdout.as_slice()).into_owned())
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        locate_executable(name, std::env::var_os("PATH").unwrap_or_default())
    }
}

/// Log external program calls without running them.
///
/// Executables are still located on the real search path, so a dry run
/// reports the same decisions a real run would make.
#[derive(Debug, Default, Clone)]
pub struct DryRun;

impl Syscall for DryRun {
    fn interactive(&self, invocation: &Invocation) -> Result<()> {
        info!("would run: {invocation}");
        Ok(())
    }

    fn captured(&self, invocation: &Invocation) -> Result<String> {
        info!("would run: {invocation}");
        Ok(String::new())
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        SystemCall.locate(name)
    }
}

/// External program call error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Program could not be started or waited on.
    #[error("failed to run {:?}", program)]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    /// Program exited unsuccessfully.
    #[error("command {:?} failed{}", program, exit_detail(*code, message))]
    Status {
        program: OsString,
        code: Option<i32>,
        message: String,
    },
}

impl SyscallError {
    /// Exit code of the failed program, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Spawn { .. } => None,
            Self::Status { code, .. } => *code,
        }
    }
}

fn exit_detail(code: Option<i32>, message: &str) -> String {
    let mut detail = match code {
        Some(code) => format!(" with exit code {code}"),
        None => " by signal".to_string(),
    };

    if !message.is_empty() {
        detail.push_str(":\n");
        detail.push_str(message);
    }

    detail
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;
