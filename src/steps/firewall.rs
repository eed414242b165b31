use anyhow::{Result, bail};

use super::{Step, StepState, require_macos};
use crate::runner::RunContext;

/// Application firewall control utility.
pub const SOCKETFILTERFW: &str = "/usr/libexec/ApplicationFirewall/socketfilterfw";

/// A boolean setting of the macOS application firewall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallSetting {
    /// Firewall on or off.
    GlobalState,
    /// Stealth mode (ignore ICMP probes).
    StealthMode,
}

impl FirewallSetting {
    const fn flags(self) -> (&'static str, &'static str) {
        match self {
            Self::GlobalState => ("--getglobalstate", "--setglobalstate"),
            Self::StealthMode => ("--getstealthmode", "--setstealthmode"),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::GlobalState => "firewall",
            Self::StealthMode => "stealth mode",
        }
    }
}

/// Interpret `socketfilterfw --get…` output.
///
/// Releases differ: "Firewall is enabled. (State = 1)", "Stealth mode
/// enabled", "Firewall stealth mode is on".
fn parse_enabled(stdout: &str) -> Option<bool> {
    let out = stdout.to_ascii_lowercase();
    if out.contains("state = 1") || out.contains("state = 2") {
        return Some(true);
    }
    if out.contains("state = 0") {
        return Some(false);
    }
    if out.contains("disabled") || out.contains("is off") {
        return Some(false);
    }
    if out.contains("enabled") || out.contains("is on") {
        return Some(true);
    }
    None
}

/// Desired state of one firewall setting.
#[derive(Debug, Clone)]
pub struct Firewall {
    /// Setting to manage.
    pub setting: FirewallSetting,
    /// Whether it should be on.
    pub enabled: bool,
}

const fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

impl Step for Firewall {
    fn description(&self) -> String {
        format!("{} {}", self.setting.label(), on_off(self.enabled))
    }

    fn requires_privilege(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        require_macos(ctx, "socketfilterfw")?;
        let (get, _) = self.setting.flags();
        let result = ctx.run(SOCKETFILTERFW, &[get])?;
        let Some(current) = parse_enabled(&result.stdout) else {
            bail!(
                "unrecognized {} state: {}",
                self.setting.label(),
                result.stdout.trim()
            );
        };
        Ok(if current == self.enabled {
            StepState::Satisfied
        } else {
            StepState::Differs {
                current: on_off(current).to_string(),
            }
        })
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        require_macos(ctx, "socketfilterfw")?;
        let (_, set) = self.setting.flags();
        ctx.run_privileged(SOCKETFILTERFW, &[set, on_off(self.enabled)])?;
        Ok(())
    }
}
