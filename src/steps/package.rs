use std::fmt;

use anyhow::{Result, bail};

use super::{Step, StepState};
use crate::runner::RunContext;

/// Supported system package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Homebrew (macOS); runs as the invoking user.
    Brew,
    /// APT (Debian, Ubuntu).
    Apt,
    /// pacman (Arch Linux).
    Pacman,
}

impl PackageManager {
    /// Parse the configuration spelling.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "brew" => Some(Self::Brew),
            "apt" => Some(Self::Apt),
            "pacman" => Some(Self::Pacman),
            _ => None,
        }
    }

    /// Executable that must be on `PATH`.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Brew => "brew",
            Self::Apt => "apt-get",
            Self::Pacman => "pacman",
        }
    }

    /// Whether installs must run with elevated privileges.
    #[must_use]
    pub const fn needs_privilege(self) -> bool {
        !matches!(self, Self::Brew)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Brew => "brew",
            Self::Apt => "apt",
            Self::Pacman => "pacman",
        })
    }
}

/// A package that must be installed.
#[derive(Debug, Clone)]
pub struct Package {
    /// Package manager to use.
    pub manager: PackageManager,
    /// Package name.
    pub name: String,
}

impl Step for Package {
    fn description(&self) -> String {
        format!("package {}", self.name)
    }

    fn requires_privilege(&self) -> bool {
        self.manager.needs_privilege()
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        if !ctx.executor.which(self.manager.program()) {
            bail!("{} not found on PATH", self.manager.program());
        }
        let installed = match self.manager {
            PackageManager::Brew => ctx
                .run_unchecked("brew", &["list", "--versions", &self.name])?
                .success,
            PackageManager::Apt => {
                let result =
                    ctx.run_unchecked("dpkg-query", &["-W", "-f=${Status}", &self.name])?;
                result.success && result.stdout.contains("install ok installed")
            }
            PackageManager::Pacman => ctx.run_unchecked("pacman", &["-Q", &self.name])?.success,
        };
        Ok(if installed {
            StepState::Satisfied
        } else {
            StepState::Missing
        })
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        match self.manager {
            PackageManager::Brew => ctx.run("brew", &["install", &self.name])?,
            PackageManager::Apt => {
                ctx.run_privileged("apt-get", &["install", "-y", "--no-install-recommends", &self.name])?
            }
            PackageManager::Pacman => {
                ctx.run_privileged("pacman", &["-S", "--needed", "--noconfirm", &self.name])?
            }
        };
        Ok(())
    }
}
