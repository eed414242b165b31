use anyhow::{Context as _, Result};

use super::{Step, StepState, require_macos};
use crate::runner::RunContext;

/// Parse `networksetup -get…` output into entries.
///
/// `networksetup` prints a sentence ("There aren't any DNS Servers set on
/// Wi-Fi.") instead of an empty list.
fn parse_list(stdout: &str) -> Vec<String> {
    if stdout.trim_start().starts_with("There aren't any") {
        return Vec::new();
    }
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn compare(current: &[String], desired: &[String]) -> StepState {
    if current == desired {
        StepState::Satisfied
    } else if current.is_empty() {
        StepState::Missing
    } else {
        StepState::Differs {
            current: current.join(", "),
        }
    }
}

/// `Empty` is how `networksetup` clears a list.
fn set_args<'a>(flag: &'a str, service: &'a str, values: &'a [String]) -> Vec<&'a str> {
    let mut args = vec![flag, service];
    if values.is_empty() {
        args.push("Empty");
    } else {
        args.extend(values.iter().map(String::as_str));
    }
    args
}

/// DNS resolvers for a network service, in order.
#[derive(Debug, Clone)]
pub struct DnsServers {
    /// Network service name, e.g. `Wi-Fi`.
    pub service: String,
    /// Resolver addresses.
    pub servers: Vec<String>,
}

impl Step for DnsServers {
    fn description(&self) -> String {
        format!("dns servers on {}", self.service)
    }

    fn requires_privilege(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        require_macos(ctx, "networksetup")?;
        let result = ctx.run("networksetup", &["-getdnsservers", &self.service])?;
        Ok(compare(&parse_list(&result.stdout), &self.servers))
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        require_macos(ctx, "networksetup")?;
        ctx.run_privileged(
            "networksetup",
            &set_args("-setdnsservers", &self.service, &self.servers),
        )
        .with_context(|| format!("setting dns servers on {}", self.service))?;
        Ok(())
    }
}

/// Search domains for a network service.
#[derive(Debug, Clone)]
pub struct SearchDomains {
    /// Network service name.
    pub service: String,
    /// Domains, in order.
    pub domains: Vec<String>,
}

impl Step for SearchDomains {
    fn description(&self) -> String {
        format!("search domains on {}", self.service)
    }

    fn requires_privilege(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        require_macos(ctx, "networksetup")?;
        let result = ctx.run("networksetup", &["-getsearchdomains", &self.service])?;
        Ok(compare(&parse_list(&result.stdout), &self.domains))
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        require_macos(ctx, "networksetup")?;
        ctx.run_privileged(
            "networksetup",
            &set_args("-setsearchdomains", &self.service, &self.domains),
        )
        .with_context(|| format!("setting search domains on {}", self.service))?;
        Ok(())
    }
}
