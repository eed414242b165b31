pub mod apply;
pub mod plan;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::config::{self, ConfigurationDocument, DeviceProfile};
use crate::error::ConfigError;
use crate::logging::Logger;
use crate::modules::{self, ExecutionPlan, ModuleRegistry};
use crate::platform::Platform;

/// Environment variable naming the configuration root.
pub const ROOT_ENV: &str = "PROVISION_ROOT";

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates root resolution, configuration loading, device selection and
/// module registration so that each command does not repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    pub root: PathBuf,
    pub platform: Platform,
    pub document: ConfigurationDocument,
    pub profile: DeviceProfile,
    pub registry: ModuleRegistry,
}

impl CommandSetup {
    /// Load configuration for `device` and build its module registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be determined, any document is
    /// invalid, the device is unknown or two modules share an id.
    pub fn init(
        global: &GlobalOpts,
        device: &str,
        platform: Platform,
        log: &Logger,
    ) -> Result<Self> {
        let root = resolve_root(global)?;
        log.debug(&format!("root: {}", root.display()));

        log.stage("Loading configuration");
        let paths = config_paths(global, &root, device);
        for path in &paths {
            log.debug(&format!("document: {}", path.display()));
        }
        let document = config::load(&paths)?;
        for warning in document.warnings() {
            log.warn(&format!("{warning}"));
        }

        let profile = DeviceProfile::select(&document, device)?;
        log.info(&format!("device: {} ({})", profile.name, profile.class));

        let registry = modules::catalog::build(&document, &profile, &platform, &root)?;
        log.info(&format!("{} module(s) registered", registry.len()));

        Ok(Self {
            root,
            platform,
            document,
            profile,
            registry,
        })
    }

    /// Plan every module, or only `only` and their dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error for cycles, missing dependencies and unknown ids.
    pub fn plan(&self, only: &[String]) -> Result<ExecutionPlan> {
        let plan = if only.is_empty() {
            modules::plan(&self.registry)?
        } else {
            modules::plan_subset(&self.registry, only)?
        };
        Ok(plan)
    }
}

/// Documents to load: `--config` paths in order, otherwise the base document
/// followed by the device overlay when it exists.
#[must_use]
pub fn config_paths(global: &GlobalOpts, root: &Path, device: &str) -> Vec<PathBuf> {
    if !global.config.is_empty() {
        return global.config.clone();
    }
    let conf = root.join("conf");
    let mut paths = vec![conf.join("provision.toml")];
    let overlay = conf.join("devices").join(format!("{device}.toml"));
    if overlay.exists() {
        paths.push(overlay);
    }
    paths
}

/// Resolve the configuration root from CLI arguments or the environment.
///
/// # Errors
///
/// Returns [`ConfigError::RootNotFound`] if no candidate applies.
pub fn resolve_root(global: &GlobalOpts) -> Result<PathBuf, ConfigError> {
    if let Some(ref root) = global.root {
        return Ok(root.clone());
    }

    if let Ok(root) = std::env::var(ROOT_ENV) {
        return Ok(PathBuf::from(root));
    }

    if let Ok(cwd) = std::env::current_dir()
        && cwd.join("conf").is_dir()
    {
        return Ok(cwd);
    }

    // Explicit documents make the root matter only for template sources.
    if !global.config.is_empty()
        && let Ok(cwd) = std::env::current_dir()
    {
        return Ok(cwd);
    }

    Err(ConfigError::RootNotFound)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn resolve_root_uses_explicit_root() {
        let global = GlobalOpts {
            root: Some(PathBuf::from("/explicit/path")),
            config: Vec::new(),
        };
        assert_eq!(resolve_root(&global).unwrap(), PathBuf::from("/explicit/path"));
    }

    #[test]
    fn explicit_config_paths_win() {
        let global = GlobalOpts {
            root: None,
            config: vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")],
        };
        assert_eq!(
            config_paths(&global, Path::new("/srv"), "mbp"),
            vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")]
        );
    }

    #[test]
    fn device_overlay_is_added_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let devices = dir.path().join("conf/devices");
        std::fs::create_dir_all(&devices).unwrap();
        std::fs::write(devices.join("nas.toml"), "").unwrap();
        let global = GlobalOpts::default();

        assert_eq!(
            config_paths(&global, dir.path(), "nas"),
            vec![
                dir.path().join("conf/provision.toml"),
                dir.path().join("conf/devices/nas.toml"),
            ]
        );
        assert_eq!(
            config_paths(&global, dir.path(), "mbp"),
            vec![dir.path().join("conf/provision.toml")]
        );
    }
}
