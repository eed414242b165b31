use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context as _, Result};

use super::{Step, StepState, require_macos};
use crate::runner::RunContext;

/// Which host name a [`Hostname`] step manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostnameKind {
    /// macOS `HostName` (fully qualified).
    HostName,
    /// macOS Bonjour `LocalHostName`.
    LocalHostName,
    /// macOS user-visible `ComputerName`.
    ComputerName,
    /// Linux static host name via `hostnamectl`.
    Static,
}

impl HostnameKind {
    /// Kinds to manage on the current platform.
    #[must_use]
    pub const fn for_platform(macos: bool) -> &'static [Self] {
        if macos {
            &[Self::HostName, Self::LocalHostName, Self::ComputerName]
        } else {
            &[Self::Static]
        }
    }

    const fn scutil_key(self) -> &'static str {
        match self {
            Self::HostName => "HostName",
            Self::LocalHostName => "LocalHostName",
            Self::ComputerName => "ComputerName",
            Self::Static => "",
        }
    }
}

/// `LocalHostName` only allows letters, digits and hyphens in a single label.
fn local_host_name(name: &str) -> String {
    name.split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// The machine's host name.
#[derive(Debug, Clone)]
pub struct Hostname {
    /// Which name to set.
    pub kind: HostnameKind,
    /// Desired name, as configured.
    pub name: String,
}

impl Hostname {
    fn desired(&self) -> String {
        match self.kind {
            HostnameKind::LocalHostName => local_host_name(&self.name),
            _ => self.name.clone(),
        }
    }
}

impl Step for Hostname {
    fn description(&self) -> String {
        match self.kind {
            HostnameKind::Static => format!("hostname {}", self.desired()),
            kind => format!("{} {}", kind.scutil_key(), self.desired()),
        }
    }

    fn requires_privilege(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        let result = match self.kind {
            HostnameKind::Static => ctx.run_unchecked("hostnamectl", &["--static"])?,
            kind => {
                require_macos(ctx, "scutil")?;
                ctx.run_unchecked("scutil", &["--get", kind.scutil_key()])?
            }
        };
        let current = result.stdout.trim();
        Ok(if !result.success || current.is_empty() {
            StepState::Missing
        } else if current == self.desired() {
            StepState::Satisfied
        } else {
            StepState::Differs {
                current: current.to_string(),
            }
        })
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        let desired = self.desired();
        match self.kind {
            HostnameKind::Static => {
                ctx.run_privileged("hostnamectl", &["set-hostname", &desired])?
            }
            kind => {
                require_macos(ctx, "scutil")?;
                ctx.run_privileged("scutil", &["--set", kind.scutil_key(), &desired])?
            }
        };
        Ok(())
    }
}

/// Default location of the NTP configuration `systemsetup` maintains.
pub const NTP_CONF: &str = "/etc/ntp.conf";

/// Network time synchronisation against a single server.
#[derive(Debug, Clone)]
pub struct NetworkTime {
    /// NTP server host name.
    pub server: String,
    /// File holding the `server` line.
    pub conf_path: PathBuf,
}

impl NetworkTime {
    /// Manage `server` through the default configuration file.
    #[must_use]
    pub fn new(server: &str) -> Self {
        Self {
            server: server.to_string(),
            conf_path: PathBuf::from(NTP_CONF),
        }
    }
}

impl Step for NetworkTime {
    fn description(&self) -> String {
        format!("network time server {}", self.server)
    }

    fn requires_privilege(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        require_macos(ctx, "systemsetup")?;
        let conf = match fs::read_to_string(&self.conf_path) {
            Ok(conf) => conf,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StepState::Missing),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.conf_path.display()));
            }
        };
        let current = conf
            .lines()
            .filter_map(|l| l.trim().strip_prefix("server "))
            .map(str::trim)
            .next();
        Ok(match current {
            Some(server) if server == self.server => StepState::Satisfied,
            Some(server) => StepState::Differs {
                current: server.to_string(),
            },
            None => StepState::Missing,
        })
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        require_macos(ctx, "systemsetup")?;
        ctx.run_privileged("systemsetup", &["-setnetworktimeserver", &self.server])?;
        ctx.run_privileged("systemsetup", &["-setusingnetworktime", "on"])?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::platform::Os;
    use crate::runner::test_helpers::{FakeExecutor, context, fail, ok};

    #[test]
    fn local_host_name_is_sanitized() {
        assert_eq!(local_host_name("mbp.home.arpa"), "mbp");
        assert_eq!(local_host_name("dev box_1"), "dev-box-1");
    }

    #[test]
    fn macos_manages_three_names() {
        assert_eq!(HostnameKind::for_platform(true).len(), 3);
        assert_eq!(HostnameKind::for_platform(false), &[HostnameKind::Static]);
    }

    #[test]
    fn unset_scutil_name_is_missing() {
        let exec = FakeExecutor::new(|cmd| {
            (cmd == "scutil --get HostName").then(|| fail("HostName: not set"))
        });
        let ctx = context(exec, Os::MacOs);
        let step = Hostname {
            kind: HostnameKind::HostName,
            name: "mbp.home.arpa".to_string(),
        };
        assert_eq!(step.check(&ctx).unwrap(), StepState::Missing);
    }

    #[test]
    fn local_host_name_compares_sanitized_value() {
        let exec = FakeExecutor::new(|cmd| match cmd {
            "scutil --get LocalHostName" => Some(ok("mbp\n")),
            _ => None,
        });
        let ctx = context(exec, Os::MacOs);
        let step = Hostname {
            kind: HostnameKind::LocalHostName,
            name: "mbp.home.arpa".to_string(),
        };
        assert_eq!(step.check(&ctx).unwrap(), StepState::Satisfied);
        assert_eq!(step.description(), "LocalHostName mbp");
    }

    #[test]
    fn linux_uses_hostnamectl() {
        let exec = FakeExecutor::new(|cmd| match cmd {
            "hostnamectl --static" => Some(ok("localhost\n")),
            "sudo -n hostnamectl set-hostname nas" => Some(ok("")),
            _ => None,
        });
        let ctx = context(exec.clone(), Os::Linux);
        let step = Hostname {
            kind: HostnameKind::Static,
            name: "nas".to_string(),
        };
        assert_eq!(
            step.check(&ctx).unwrap(),
            StepState::Differs {
                current: "localhost".to_string()
            }
        );
        ctx.privilege.ensure("test").unwrap();
        step.apply(&ctx).unwrap();
        assert_eq!(
            exec.calls().last().map(String::as_str),
            Some("sudo -n hostnamectl set-hostname nas")
        );
    }

    #[test]
    fn ntp_conf_server_line_is_compared() {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("ntp.conf");
        let step = NetworkTime {
            server: "time.apple.com".to_string(),
            conf_path: conf_path.clone(),
        };
        let ctx = context(FakeExecutor::new(|_| None), Os::MacOs);

        assert_eq!(step.check(&ctx).unwrap(), StepState::Missing);
        fs::write(&conf_path, "server time.euro.apple.com\n").unwrap();
        assert_eq!(
            step.check(&ctx).unwrap(),
            StepState::Differs {
                current: "time.euro.apple.com".to_string()
            }
        );
        fs::write(&conf_path, "# managed\nserver time.apple.com\n").unwrap();
        assert_eq!(step.check(&ctx).unwrap(), StepState::Satisfied);
    }

    #[test]
    fn ntp_apply_sets_server_and_enables_sync() {
        let exec = FakeExecutor::new(|_| Some(ok("")));
        let ctx = context(exec.clone(), Os::MacOs);
        ctx.privilege.ensure("test").unwrap();
        NetworkTime::new("time.apple.com").apply(&ctx).unwrap();
        assert_eq!(
            exec.calls(),
            vec![
                "sudo -n systemsetup -setnetworktimeserver time.apple.com",
                "sudo -n systemsetup -setusingnetworktime on",
            ]
        );
    }
}
