// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that drives a bootstrap run.
//! Every section is optional. Anything left out falls back to the stock
//! setup: apt for packages, oh-my-zsh as the shell framework, a handful of
//! zsh plugins, powerlevel10k as the prompt theme, and tpm for tmux.
//!
//! # Path Expansion
//!
//! Path fields may use `~` or environment variables like `$HOME`. They are
//! expanded once right after parsing, so the rest of the crate only ever sees
//! absolute paths.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Bootstrap configuration layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Git backend used for clone and pull operations.
    pub git: GitSettings,

    /// Required tools and how to install them.
    pub dependencies: DependencySettings,

    /// Dotfiles repository and the files to link out of it.
    pub dotfiles: DotfilesSettings,

    /// Shell framework installation.
    pub framework: FrameworkSettings,

    /// Shell plugins installed into the framework's custom directory.
    #[serde(rename = "plugin")]
    pub plugins: Vec<RepoEntry>,

    /// Prompt theme installed into the framework's custom directory.
    pub theme: RepoEntry,

    /// Terminal multiplexer plugin manager.
    pub multiplexer: MultiplexerSettings,

    /// Login shell to switch to.
    pub shell: ShellSettings,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            git: GitSettings::default(),
            dependencies: DependencySettings::default(),
            dotfiles: DotfilesSettings::default(),
            framework: FrameworkSettings::default(),
            plugins: default_plugins(),
            theme: default_theme(),
            multiplexer: MultiplexerSettings::default(),
            shell: ShellSettings::default(),
        }
    }
}

impl BootstrapConfig {
    /// Load configuration from file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid TOML.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        read_to_string(path)
            .map_err(|source| ConfigError::ReadFile {
                source,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Load configuration from file, or use defaults if file does not exist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if existing file cannot be loaded.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Self::default().expand_paths()
        }
    }

    /// Perform shell expansion on every path field.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if a variable cannot be
    ///   looked up.
    pub fn expand_paths(mut self) -> Result<Self> {
        self.dotfiles.path = expand(&self.dotfiles.path)?;
        self.framework.path = expand(&self.framework.path)?;
        self.framework.custom = self.framework.custom.as_deref().map(expand).transpose()?;
        self.multiplexer.path = expand(&self.multiplexer.path)?;

        Ok(self)
    }

    /// Check that everything a run needs is configured.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingDotfilesUrl`] if no dotfiles repository
    ///   is configured.
    pub fn validate(&self) -> Result<()> {
        if self.dotfiles.url.trim().is_empty() {
            return Err(ConfigError::MissingDotfilesUrl);
        }

        Ok(())
    }
}

impl FromStr for BootstrapConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let config: BootstrapConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Paths are always expanded after parsing.
        config.expand_paths()
    }
}

impl Display for BootstrapConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Git backend selection.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitSettings {
    /// Backend to clone and pull with.
    pub backend: GitBackend,
}

/// Ways to talk to remote repositories.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GitBackend {
    /// Call the git binary.
    #[default]
    Cli,

    /// Use libgit2 directly.
    Libgit2,
}

/// Required tool settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DependencySettings {
    /// Executables that must resolve on the search path.
    pub tools: Vec<String>,

    /// Command run once before installing, e.g., to refresh package lists.
    pub refresh: Option<Vec<String>>,

    /// Command that installs packages. Missing tool names are appended.
    pub install: Vec<String>,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            tools: strings(["git", "curl", "zsh", "tmux"]),
            refresh: Some(strings(["sudo", "apt-get", "update"])),
            install: strings(["sudo", "apt-get", "install", "-y"]),
        }
    }
}

/// Dotfiles repository settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DotfilesSettings {
    /// Remote URL to clone dotfiles from. Has no default, and must be set.
    pub url: String,

    /// Local clone of the dotfiles repository.
    pub path: PathBuf,

    /// Files to link from the dotfiles repository into the home directory.
    pub links: Vec<String>,
}

impl Default for DotfilesSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            path: PathBuf::from("~/dotfiles"),
            links: strings([".zshrc", ".tmux.conf", ".vimrc", ".gitconfig", ".p10k.zsh"]),
        }
    }
}

/// Shell framework settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrameworkSettings {
    /// URL of installer script to fetch and run when framework is missing.
    pub installer: String,

    /// Install directory of the framework.
    pub path: PathBuf,

    /// Custom extensions directory. Defaults to `<path>/custom`.
    pub custom: Option<PathBuf>,

    /// Upgrade script, relative to install directory.
    pub upgrade: PathBuf,

    /// What to do when the upgrade script fails.
    pub on_upgrade_failure: FailurePolicy,
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            installer: "https://raw.githubusercontent.com/ohmyzsh/ohmyzsh/master/tools/install.sh"
                .into(),
            path: PathBuf::from("~/.oh-my-zsh"),
            custom: None,
            upgrade: PathBuf::from("tools/upgrade.sh"),
            on_upgrade_failure: FailurePolicy::Tolerate,
        }
    }
}

/// Repository entry for plugins and themes.
///
/// Destination is derived from the framework's custom extensions directory
/// and the entry name.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepoEntry {
    /// Directory name to clone into.
    pub name: String,

    /// Remote URL to clone from.
    pub url: String,

    /// Only fetch the latest commit.
    pub shallow: bool,
}

impl RepoEntry {
    /// Construct new repository entry.
    pub fn new(name: impl Into<String>, url: impl Into<String>, shallow: bool) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            shallow,
        }
    }
}

/// Terminal multiplexer plugin manager settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MultiplexerSettings {
    /// Remote URL of plugin manager.
    pub url: String,

    /// Local clone of plugin manager.
    pub path: PathBuf,

    /// What to do when updating the plugin manager fails.
    pub on_update_failure: FailurePolicy,
}

impl Default for MultiplexerSettings {
    fn default() -> Self {
        Self {
            url: "https://github.com/tmux-plugins/tpm".into(),
            path: PathBuf::from("~/.tmux/plugins/tpm"),
            on_update_failure: FailurePolicy::Tolerate,
        }
    }
}

/// Login shell settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShellSettings {
    /// Shell to switch to, resolved on the search path.
    pub target: String,

    /// Command that changes the login shell. Shell path and user are appended.
    pub change: Vec<String>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            target: "zsh".into(),
            change: strings(["sudo", "chsh", "-s"]),
        }
    }
}

/// Handling of a failed step.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run.
    #[default]
    Abort,

    /// Log a warning and keep going.
    Tolerate,
}

impl FailurePolicy {
    pub fn is_tolerated(self) -> bool {
        matches!(self, Self::Tolerate)
    }
}

fn default_plugins() -> Vec<RepoEntry> {
    vec![
        RepoEntry::new(
            "zsh-autosuggestions",
            "https://github.com/zsh-users/zsh-autosuggestions",
            false,
        ),
        RepoEntry::new(
            "zsh-syntax-highlighting",
            "https://github.com/zsh-users/zsh-syntax-highlighting.git",
            false,
        ),
        RepoEntry::new(
            "zsh-completions",
            "https://github.com/zsh-users/zsh-completions",
            false,
        ),
        RepoEntry::new(
            "zsh-history-substring-search",
            "https://github.com/zsh-users/zsh-history-substring-search",
            false,
        ),
    ]
}

fn default_theme() -> RepoEntry {
    RepoEntry::new(
        "powerlevel10k",
        "https://github.com/romkatv/powerlevel10k.git",
        true,
    )
}

fn strings<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.into_iter().map(Into::into).collect()
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file at {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// No dotfiles repository to clone from.
    #[error("no dotfiles repository configured, set `url` under [dotfiles]")]
    MissingDotfilesUrl,

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
