// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bootstrap run orchestration.
//!
//! A bootstrap run is a strictly linear sequence of [`Step`]s. Each step
//! completes before the next one starts, and the first fatal error ends the
//! run. There are no retries and no rollback, so a failed run leaves behind
//! whatever earlier steps already did. Running again simply picks up from the
//! filesystem state: existing clones get pulled instead of cloned, and
//! existing link targets get backed up again.

use crate::{
    config::{BootstrapConfig, ConfigError},
    deps::{DependencyChecker, DependencyError},
    framework::{FrameworkError, FrameworkInstaller, FrameworkOutcome},
    link::{ConfigLinker, LinkError, LinkPlan},
    repo::{sync, RepoSpec, SyncError, SyncOutcome, Syncer},
    shell::{Session, ShellError, ShellOutcome, ShellSwitcher},
    syscall::Syscall,
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{info, info_span};

/// Stage of a bootstrap run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Dependencies,
    Dotfiles,
    Framework,
    Plugins,
    Theme,
    Multiplexer,
    Links,
    Shell,
}

impl Step {
    /// Every step in execution order.
    pub const ALL: [Step; 8] = [
        Step::Dependencies,
        Step::Dotfiles,
        Step::Framework,
        Step::Plugins,
        Step::Theme,
        Step::Multiplexer,
        Step::Links,
        Step::Shell,
    ];
}

impl Display for Step {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Dependencies => "deps",
            Self::Dotfiles => "repo",
            Self::Framework => "framework",
            Self::Plugins => "plugins",
            Self::Theme => "theme",
            Self::Multiplexer => "multiplexer",
            Self::Links => "links",
            Self::Shell => "shell",
        };

        fmt.write_str(name)
    }
}

/// Everything a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub installed: Vec<String>,
    pub dotfiles: SyncOutcome,
    pub framework: FrameworkOutcome,
    pub plugins: Vec<(String, SyncOutcome)>,
    pub theme: SyncOutcome,
    pub multiplexer: SyncOutcome,
    pub links: LinkPlan,
    pub shell: ShellOutcome,
}

/// Linear bootstrap run.
pub struct Bootstrap<'a> {
    config: &'a BootstrapConfig,
    syscall: &'a dyn Syscall,
    syncer: &'a dyn Syncer,
    home: PathBuf,
    session: Session,
    dry_run: bool,
}

impl<'a> Bootstrap<'a> {
    /// Construct new bootstrap run.
    pub fn new(
        config: &'a BootstrapConfig,
        syscall: &'a dyn Syscall,
        syncer: &'a dyn Syncer,
        home: impl Into<PathBuf>,
        session: Session,
    ) -> Self {
        Self {
            config,
            syscall,
            syncer,
            home: home.into(),
            session,
            dry_run: false,
        }
    }

    /// Only plan links instead of creating them.
    ///
    /// External programs are not affected by this flag. Pair it with a
    /// dry-run [`Syscall`] to keep a run entirely side-effect free.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run every step in order.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError::Config`] before any step runs if the
    ///   configuration is incomplete.
    /// - Return [`BootstrapError`] naming the first step that failed.
    pub fn run(&self) -> Result<Report> {
        self.config.validate()?;

        let installed = self.in_step(Step::Dependencies, || {
            Ok(DependencyChecker::new(&self.config.dependencies, self.syscall).ensure_installed()?)
        })?;

        let dotfiles = self.in_step(Step::Dotfiles, || {
            let dotfiles = &self.config.dotfiles;
            self.sync(Step::Dotfiles, &RepoSpec::new(&dotfiles.url, &dotfiles.path))
        })?;

        let (framework, custom) = self.in_step(Step::Framework, || {
            Ok(FrameworkInstaller::new(&self.config.framework, self.syscall).install_or_upgrade()?)
        })?;

        let plugins = self.in_step(Step::Plugins, || {
            let parent = custom.plugins();
            self.config
                .plugins
                .iter()
                .map(|entry| {
                    let outcome = self.sync(Step::Plugins, &RepoSpec::from_entry(entry, &parent))?;
                    Ok((entry.name.clone(), outcome))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let theme = self.in_step(Step::Theme, || {
            self.sync(
                Step::Theme,
                &RepoSpec::from_entry(&self.config.theme, custom.themes()),
            )
        })?;

        let multiplexer = self.in_step(Step::Multiplexer, || {
            let multiplexer = &self.config.multiplexer;
            let spec = RepoSpec::new(&multiplexer.url, &multiplexer.path)
                .on_update_failure(multiplexer.on_update_failure);
            self.sync(Step::Multiplexer, &spec)
        })?;

        let links = self.in_step(Step::Links, || {
            let linker = ConfigLinker::new(&self.config.dotfiles.path, &self.home);
            if self.dry_run {
                if !self.config.dotfiles.path.exists() {
                    info!(
                        "dotfiles not cloned yet at {}, link plan is incomplete",
                        self.config.dotfiles.path.display()
                    );
                }
                let plan = linker.plan(&self.config.dotfiles.links);
                for action in &plan.actions {
                    info!(
                        "would link {} -> {}",
                        action.target.display(),
                        action.source.display()
                    );
                }
                return Ok(plan);
            }

            Ok(linker.link_all(&self.config.dotfiles.links)?)
        })?;

        let shell = self.in_step(Step::Shell, || {
            match ShellSwitcher::new(&self.config.shell, self.syscall).switch(&self.session) {
                // INVARIANT: Dry runs never install anything, so target shell may not exist yet.
                Err(ShellError::NotFound(target)) if self.dry_run => {
                    info!("would change login shell to {target} once installed");
                    Ok(ShellOutcome::Pending(target))
                }
                result => Ok(result?),
            }
        })?;

        Ok(Report {
            installed,
            dotfiles,
            framework,
            plugins,
            theme,
            multiplexer,
            links,
            shell,
        })
    }

    fn in_step<T>(&self, step: Step, body: impl FnOnce() -> Result<T>) -> Result<T> {
        let _span = info_span!("step", %step).entered();
        body()
    }

    fn sync(&self, step: Step, spec: &RepoSpec) -> Result<SyncOutcome> {
        sync(self.syncer, spec).map_err(|source| BootstrapError::Sync { step, source })
    }
}

/// Bootstrap error types.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Configuration is missing something a run needs.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Required tools cannot be installed.
    #[error("failed to install required tools")]
    Dependencies(#[from] DependencyError),

    /// Repository cannot be cloned or updated.
    #[error("failed to sync repository during {step} step")]
    Sync {
        step: Step,
        #[source]
        source: SyncError,
    },

    /// Shell framework cannot be installed or upgraded.
    #[error("failed to set up shell framework")]
    Framework(#[from] FrameworkError),

    /// Configuration files cannot be linked.
    #[error("failed to link configuration files")]
    Link(#[from] LinkError),

    /// Login shell cannot be changed.
    #[error("failed to change login shell")]
    Shell(#[from] ShellError),
}

impl BootstrapError {
    /// Step the run stopped at.
    pub fn step(&self) -> Step {
        match self {
            Self::Config(_) => Step::Dotfiles,
            Self::Dependencies(_) => Step::Dependencies,
            Self::Sync { step, .. } => *step,
            Self::Framework(_) => Step::Framework,
            Self::Link(_) => Step::Links,
            Self::Shell(_) => Step::Shell,
        }
    }

    /// Process exit code to report for this error.
    ///
    /// Uses the exit code of the failed external program when there is one.
    pub fn exit_code(&self) -> i32 {
        let code = match self {
            Self::Dependencies(DependencyError::Install(error)) => error.exit_code(),
            Self::Sync { source, .. } => source.exit_code(),
            Self::Framework(error) => error.exit_code(),
            Self::Shell(ShellError::Change(error)) => error.exit_code(),
            _ => None,
        };

        code.filter(|code| *code != 0).unwrap_or(1)
    }
}

/// Friendly result alias :3
pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{FailurePolicy, RepoEntry},
        repo::GitCli,
        syscall::fake::FakeSyscall,
    };
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        fs::{create_dir_all, read_link, write},
        path::Path,
    };

    fn config_in(root: &Path) -> BootstrapConfig {
        let mut config = BootstrapConfig::default();
        config.dotfiles.url = "https://blah.org/dots.git".into();
        config.dotfiles.path = root.join("dotfiles");
        config.framework.path = root.join("omz");
        config.multiplexer.path = root.join("tpm");
        config.plugins = vec![
            RepoEntry::new("foo", "https://blah.org/foo.git", false),
            RepoEntry::new("bar", "https://blah.org/bar.git", false),
        ];
        config.theme = RepoEntry::new("baz", "https://blah.org/baz.git", true);
        config
    }

    fn git_lines(syscall: &FakeSyscall) -> Vec<String> {
        syscall
            .command_lines()
            .into_iter()
            .filter(|line| line.starts_with("git"))
            .collect()
    }

    fn session() -> Session {
        Session {
            shell: Some(PathBuf::from("/fake/bin/zsh")),
            user: Some("blah".into()),
        }
    }

    #[test]
    fn steps_run_in_declared_order() {
        let mut sorted = Step::ALL;
        sorted.sort();
        assert_eq!(sorted, Step::ALL);
        assert_eq!(
            Step::ALL.map(|step| step.to_string()),
            ["deps", "repo", "framework", "plugins", "theme", "multiplexer", "links", "shell"]
        );
    }

    #[sealed_test]
    fn fresh_run_clones_everything() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config = config_in(&root);
        let syscall = FakeSyscall::new().with_tools(["git", "curl", "zsh", "tmux"]);
        let git = GitCli::new(&syscall);

        let report = Bootstrap::new(&config, &syscall, &git, root.join("home"), session()).run()?;
        assert!(report.installed.is_empty());
        assert_eq!(report.dotfiles, SyncOutcome::Cloned);
        assert_eq!(report.framework, FrameworkOutcome::Installed);
        assert_eq!(report.shell, ShellOutcome::Unchanged);

        let custom = root.join("omz").join("custom");
        assert_eq!(
            git_lines(&syscall),
            vec![
                format!("git clone https://blah.org/dots.git {}", root.join("dotfiles").display()),
                format!(
                    "git clone https://blah.org/foo.git {}",
                    custom.join("plugins/foo").display()
                ),
                format!(
                    "git clone https://blah.org/bar.git {}",
                    custom.join("plugins/bar").display()
                ),
                format!(
                    "git clone --depth 1 https://blah.org/baz.git {}",
                    custom.join("themes/baz").display()
                ),
                format!("git clone https://github.com/tmux-plugins/tpm {}", root.join("tpm").display()),
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn dotfiles_clone_failure_stops_before_plugins() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config = config_in(&root);
        let syscall = FakeSyscall::new()
            .with_tools(["git", "curl", "zsh", "tmux"])
            .with_failure("git clone https://blah.org/dots.git");
        let git = GitCli::new(&syscall);

        let result = Bootstrap::new(&config, &syscall, &git, root.join("home"), session()).run();
        match result {
            Err(error) => {
                assert_eq!(error.step(), Step::Dotfiles);
                assert_eq!(error.exit_code(), 1);
            }
            Ok(report) => panic!("expected failure, got {report:?}"),
        }

        assert_eq!(syscall.command_lines().len(), 1);
        assert!(!syscall.command_lines().iter().any(|line| line.contains("foo.git")));

        Ok(())
    }

    #[sealed_test]
    fn failed_child_exit_code_is_reported() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config = config_in(&root);
        let syscall = FakeSyscall::new()
            .with_tools(["git", "curl", "zsh", "tmux"])
            .with_exit_code("git clone https://blah.org/dots.git", 128);
        let git = GitCli::new(&syscall);

        let result = Bootstrap::new(&config, &syscall, &git, root.join("home"), session()).run();
        match result {
            Err(error) => {
                assert_eq!(error.step(), Step::Dotfiles);
                assert_eq!(error.exit_code(), 128);
            }
            Ok(report) => panic!("expected failure, got {report:?}"),
        }

        Ok(())
    }

    #[sealed_test]
    fn missing_dotfiles_url_runs_nothing() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let mut config = config_in(&root);
        config.dotfiles.url = String::new();
        let syscall = FakeSyscall::new().with_tools(["git", "curl"]);
        let git = GitCli::new(&syscall);

        let result = Bootstrap::new(&config, &syscall, &git, root.join("home"), session()).run();
        match result {
            Err(error @ BootstrapError::Config(ConfigError::MissingDotfilesUrl)) => {
                assert_eq!(error.step(), Step::Dotfiles);
                assert_eq!(error.exit_code(), 1);
            }
            other => panic!("expected missing url error, got {other:?}"),
        }
        assert!(syscall.command_lines().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn existing_clones_are_pulled_and_multiplexer_failure_tolerated() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config = config_in(&root);
        for dir in ["dotfiles", "omz/custom/plugins/foo", "omz/custom/plugins/bar", "omz/custom/themes/baz", "tpm"] {
            create_dir_all(root.join(dir))?;
        }
        let syscall = FakeSyscall::new()
            .with_tools(["git", "curl", "zsh", "tmux"])
            .with_failure(format!("git -C {} pull", root.join("tpm").display()));
        let git = GitCli::new(&syscall);

        let report = Bootstrap::new(&config, &syscall, &git, root.join("home"), session()).run()?;
        assert_eq!(report.dotfiles, SyncOutcome::Updated);
        assert_eq!(report.framework, FrameworkOutcome::Upgraded);
        assert_eq!(
            report.plugins,
            vec![
                ("foo".to_string(), SyncOutcome::Updated),
                ("bar".to_string(), SyncOutcome::Updated),
            ]
        );
        assert_eq!(report.theme, SyncOutcome::Updated);
        assert_eq!(report.multiplexer, SyncOutcome::UpdateSkipped);
        assert!(!git_lines(&syscall).iter().any(|line| line.starts_with("git clone")));

        Ok(())
    }

    #[sealed_test]
    fn strict_multiplexer_policy_aborts_before_linking() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let mut config = config_in(&root);
        config.multiplexer.on_update_failure = FailurePolicy::Abort;
        create_dir_all(root.join("tpm"))?;
        create_dir_all(root.join("home"))?;
        let syscall = FakeSyscall::new()
            .with_tools(["git", "curl", "zsh", "tmux"])
            .with_failure(format!("git -C {} pull", root.join("tpm").display()));
        let git = GitCli::new(&syscall);

        let result = Bootstrap::new(&config, &syscall, &git, root.join("home"), session()).run();
        assert!(matches!(
            result,
            Err(BootstrapError::Sync { step: Step::Multiplexer, .. })
        ));

        Ok(())
    }

    #[sealed_test]
    fn links_made_and_shell_changed() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config = config_in(&root);
        create_dir_all(root.join("dotfiles"))?;
        create_dir_all(root.join("home"))?;
        write(root.join("dotfiles/.zshrc"), "repo zshrc")?;
        let syscall = FakeSyscall::new().with_tools(["git", "curl", "zsh", "tmux"]);
        let git = GitCli::new(&syscall);
        let bash = Session {
            shell: Some(PathBuf::from("/fake/bin/bash")),
            user: None,
        };

        let report = Bootstrap::new(&config, &syscall, &git, root.join("home"), bash).run()?;
        assert_eq!(report.links.actions.len(), 1);
        assert_eq!(read_link(root.join("home/.zshrc"))?, root.join("dotfiles/.zshrc"));
        assert_eq!(report.shell, ShellOutcome::Changed(PathBuf::from("/fake/bin/zsh")));
        assert_eq!(
            syscall.command_lines().last().map(String::as_str),
            Some("sudo chsh -s /fake/bin/zsh")
        );

        Ok(())
    }

    #[sealed_test]
    fn dry_run_leaves_home_untouched() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config = config_in(&root);
        create_dir_all(root.join("dotfiles"))?;
        create_dir_all(root.join("home"))?;
        write(root.join("dotfiles/.zshrc"), "repo zshrc")?;
        let syscall = FakeSyscall::new().with_tools(["git", "curl", "zsh", "tmux"]);
        let git = GitCli::new(&syscall);

        let report = Bootstrap::new(&config, &syscall, &git, root.join("home"), session())
            .dry_run(true)
            .run()?;
        assert_eq!(report.links.actions.len(), 1);
        assert!(!root.join("home/.zshrc").exists());

        Ok(())
    }

    #[sealed_test]
    fn dry_run_tolerates_uninstalled_target_shell() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config = config_in(&root);
        let syscall = FakeSyscall::new().with_tools(["git", "curl", "tmux"]);
        let git = GitCli::new(&syscall);

        let report = Bootstrap::new(&config, &syscall, &git, root.join("home"), session())
            .dry_run(true)
            .run()?;
        assert_eq!(report.installed, vec!["zsh"]);
        assert_eq!(report.shell, ShellOutcome::Pending("zsh".into()));
        assert!(!syscall.command_lines().iter().any(|line| line.contains("chsh")));

        let result = Bootstrap::new(&config, &syscall, &git, root.join("home"), session()).run();
        assert!(matches!(result, Err(BootstrapError::Shell(ShellError::NotFound(_)))));

        Ok(())
    }

    #[sealed_test]
    fn dry_run_before_clone_plans_no_links() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config = config_in(&root);
        let syscall = FakeSyscall::new().with_tools(["git", "curl", "zsh", "tmux"]);
        let git = GitCli::new(&syscall);

        let report = Bootstrap::new(&config, &syscall, &git, root.join("home"), session())
            .dry_run(true)
            .run()?;
        assert!(report.links.actions.is_empty());
        assert_eq!(report.links.skipped, config.dotfiles.links);
        assert!(!root.join("home").exists());

        Ok(())
    }
}
