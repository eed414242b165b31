//! Built-in modules, derived from the configuration document.
//!
//! A built-in module is registered only when its domain is configured.
//! User-defined modules come from `[modules.<id>]` tables and may depend on
//! built-in ones.
use std::path::Path;

use toml::{Table, Value};

use super::{Module, ModuleRegistry};
use crate::config::{ConfigurationDocument, DeviceProfile};
use crate::error::RegistryError;
use crate::platform::Platform;
use crate::steps::Step;
use crate::steps::file::TemplateFile;
use crate::steps::firewall::{Firewall, FirewallSetting};
use crate::steps::network::{DnsServers, SearchDomains};
use crate::steps::package::{Package, PackageManager};
use crate::steps::preference::{Preference, PreferenceValue};
use crate::steps::shell::ShellCommand;
use crate::steps::system::{Hostname, HostnameKind, NetworkTime};

/// Network service used when `network.service` is not set.
pub const DEFAULT_NETWORK_SERVICE: &str = "Wi-Fi";

/// Build the registry for a run.
///
/// Template sources are resolved against `root`.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if a user module reuses a built-in id.
pub fn build(
    doc: &ConfigurationDocument,
    profile: &DeviceProfile,
    platform: &Platform,
    root: &Path,
) -> Result<ModuleRegistry, RegistryError> {
    let mut registry = ModuleRegistry::new();

    if profile.declares_hostname()
        && let Some(name) = profile.var("hostname")
    {
        registry.register(hostname(name, platform))?;
    }
    if doc.has_domain("network") {
        registry.register(network(doc))?;
    }
    if let Some(server) = doc.str("time.server") {
        let deps = after_if_registered(&registry, "network");
        registry.register(Module::new(
            "time-sync",
            deps,
            vec![Box::new(NetworkTime::new(server))],
        ))?;
    }
    if doc.has_domain("security") {
        registry.register(security(doc))?;
    }
    if let Some(manager) = doc.str("packages.manager").and_then(PackageManager::parse) {
        registry.register(packages(doc, manager))?;
    }
    if doc.has_domain("preferences") {
        registry.register(preferences(doc))?;
    }
    if doc.has_domain("templates") {
        let deps = after_if_registered(&registry, "packages");
        registry.register(Module::new("dotfiles", deps, templates(doc, root)))?;
    }
    if let Some(modules) = doc.domain("modules") {
        for (id, table) in modules {
            if let Some(table) = table.as_table() {
                registry.register(user_module(id, table))?;
            }
        }
    }

    Ok(registry)
}

fn after_if_registered(registry: &ModuleRegistry, id: &str) -> Vec<String> {
    if registry.contains(id) {
        vec![id.to_string()]
    } else {
        Vec::new()
    }
}

fn hostname(name: &str, platform: &Platform) -> Module {
    let steps = HostnameKind::for_platform(platform.is_macos())
        .iter()
        .map(|&kind| {
            Box::new(Hostname {
                kind,
                name: name.to_string(),
            }) as Box<dyn Step>
        })
        .collect();
    Module::new("hostname", Vec::new(), steps)
}

fn network(doc: &ConfigurationDocument) -> Module {
    let service = doc
        .str("network.service")
        .unwrap_or(DEFAULT_NETWORK_SERVICE)
        .to_string();
    let mut steps: Vec<Box<dyn Step>> = vec![Box::new(DnsServers {
        service: service.clone(),
        servers: doc.strings("network.dns"),
    })];
    if doc.get("network.search_domains").is_some() {
        steps.push(Box::new(SearchDomains {
            service,
            domains: doc.strings("network.search_domains"),
        }));
    }
    Module::new("network", Vec::new(), steps)
}

fn security(doc: &ConfigurationDocument) -> Module {
    let mut steps: Vec<Box<dyn Step>> = Vec::new();
    if let Some(enabled) = doc.bool("security.firewall") {
        steps.push(Box::new(Firewall {
            setting: FirewallSetting::GlobalState,
            enabled,
        }));
    }
    if let Some(enabled) = doc.bool("security.stealth") {
        steps.push(Box::new(Firewall {
            setting: FirewallSetting::StealthMode,
            enabled,
        }));
    }
    Module::new("security", Vec::new(), steps)
}

fn packages(doc: &ConfigurationDocument, manager: PackageManager) -> Module {
    let steps = doc
        .strings("packages.install")
        .into_iter()
        .map(|name| Box::new(Package { manager, name }) as Box<dyn Step>)
        .collect();
    Module::new("packages", Vec::new(), steps)
}

fn flag(table: &Table, key: &str) -> bool {
    table.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn string(table: &Table, key: &str) -> String {
    table
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn preferences(doc: &ConfigurationDocument) -> Module {
    let steps = doc
        .tables("preferences.defaults")
        .into_iter()
        .filter_map(|entry| {
            let value = entry.get("value").and_then(PreferenceValue::from_toml)?;
            Some(Box::new(Preference {
                domain: string(entry, "domain"),
                key: string(entry, "key"),
                value,
                privileged: flag(entry, "privileged"),
            }) as Box<dyn Step>)
        })
        .collect();
    Module::new("preferences", Vec::new(), steps)
}

fn templates(doc: &ConfigurationDocument, root: &Path) -> Vec<Box<dyn Step>> {
    doc.tables("templates.files")
        .into_iter()
        .map(|entry| {
            Box::new(TemplateFile {
                source: root.join(string(entry, "source")),
                destination: string(entry, "destination"),
                privileged: flag(entry, "privileged"),
            }) as Box<dyn Step>
        })
        .collect()
}

fn user_module(id: &str, table: &Table) -> Module {
    let deps = table
        .get("depends_on")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let steps = table
        .get("steps")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_table)
        .map(|step| {
            Box::new(ShellCommand {
                description: string(step, "description"),
                check: string(step, "check"),
                apply: string(step, "apply"),
                privileged: flag(step, "privileged"),
            }) as Box<dyn Step>
        })
        .collect();
    Module::new(id, deps, steps)
}
