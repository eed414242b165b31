use std::collections::BTreeMap;
use std::fmt;

use toml::Value;

use super::ConfigurationDocument;
use crate::error::{ConfigError, ConfigIssue};

/// Kind of machine a device profile describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Server without a display.
    HeadlessServer,
    /// Laptop.
    Portable,
    /// Small-form-factor desktop.
    CompactDesktop,
}

impl DeviceClass {
    /// Parse the configuration spelling of a class.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "headless-server" => Some(Self::HeadlessServer),
            "portable" => Some(Self::Portable),
            "compact-desktop" => Some(Self::CompactDesktop),
            _ => None,
        }
    }

    /// Configuration spelling, also exposed to templates as `device_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HeadlessServer => "headless-server",
            Self::Portable => "portable",
            Self::CompactDesktop => "compact-desktop",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The target machine of a run and its template variables.
///
/// Every profile carries `name`, `device_type` and `hostname` (defaulting to
/// the device name) in addition to the variables declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Device identifier (the `[devices.<name>]` key).
    pub name: String,
    /// Device class.
    pub class: DeviceClass,
    /// Template variables.
    pub vars: BTreeMap<String, String>,
    declared_hostname: bool,
}

impl DeviceProfile {
    /// Build a profile from parts; built-in variables are filled in.
    #[must_use]
    pub fn new(name: &str, class: DeviceClass, mut vars: BTreeMap<String, String>) -> Self {
        let declared_hostname = vars.contains_key("hostname");
        vars.insert("name".to_string(), name.to_string());
        vars.insert("device_type".to_string(), class.as_str().to_string());
        vars.entry("hostname".to_string())
            .or_insert_with(|| name.to_string());
        Self {
            name: name.to_string(),
            class,
            vars,
            declared_hostname,
        }
    }

    /// Select the device `name` from the `devices` domain.
    ///
    /// Variables written as `{ env = "VAR" }` are resolved from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is not defined, a variable has an
    /// unsupported type, or a referenced environment variable is unset.
    pub fn select(doc: &ConfigurationDocument, name: &str) -> Result<Self, ConfigError> {
        Self::select_with_env(doc, name, |var| std::env::var(var).ok())
    }

    /// [`DeviceProfile::select`] with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// See [`DeviceProfile::select`].
    pub fn select_with_env(
        doc: &ConfigurationDocument,
        name: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let devices = doc.domain("devices");
        let Some(device) = devices.and_then(|d| d.get(name)).and_then(Value::as_table) else {
            let available = devices
                .map(|d| d.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            return Err(ConfigError::UnknownDevice {
                name: name.to_string(),
                available,
            });
        };

        let location = format!("devices.{name}.class");
        let class = device
            .get("class")
            .and_then(Value::as_str)
            .and_then(DeviceClass::parse)
            .ok_or_else(|| {
                ConfigError::Invalid(vec![ConfigIssue::new(&location, "invalid device class")])
            })?;

        let mut vars = BTreeMap::new();
        if let Some(declared) = device.get("vars").and_then(Value::as_table) {
            for (key, value) in declared {
                let resolved = match value {
                    Value::String(s) => s.clone(),
                    Value::Integer(i) => i.to_string(),
                    Value::Float(f) => f.to_string(),
                    Value::Boolean(b) => b.to_string(),
                    Value::Table(t) if t.len() == 1 && t.get("env").is_some_and(Value::is_str) => {
                        let var = t.get("env").and_then(Value::as_str).unwrap_or_default();
                        env(var).ok_or_else(|| ConfigError::MissingSecret {
                            variable: key.clone(),
                            env: var.to_string(),
                        })?
                    }
                    _ => {
                        return Err(ConfigError::Invalid(vec![ConfigIssue::new(
                            format!("devices.{name}.vars.{key}"),
                            "expected a scalar or { env = \"NAME\" }",
                        )]));
                    }
                };
                vars.insert(key.clone(), resolved);
            }
        }

        Ok(Self::new(name, class, vars))
    }

    /// Look up a template variable.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Whether the configuration set `hostname` explicitly.
    #[must_use]
    pub const fn declares_hostname(&self) -> bool {
        self.declared_hostname
    }
}
