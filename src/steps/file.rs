use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use super::{Step, StepState};
use crate::runner::RunContext;
use crate::template;

/// A file rendered from a template for the current device.
#[derive(Debug, Clone)]
pub struct TemplateFile {
    /// Template source, absolute.
    pub source: PathBuf,
    /// Destination, may start with `~`.
    pub destination: String,
    /// Whether the destination is only writable with privileges.
    pub privileged: bool,
}

impl TemplateFile {
    fn render(&self, ctx: &RunContext) -> Result<String> {
        let text = fs::read_to_string(&self.source)
            .with_context(|| format!("reading template {}", self.source.display()))?;
        template::render(&text, &ctx.profile)
            .with_context(|| format!("rendering {}", self.source.display()))
    }

    fn write_privileged(ctx: &RunContext, dest: &Path, content: &str) -> Result<()> {
        let staged = std::env::temp_dir().join(format!(
            "provision-{}-{}",
            std::process::id(),
            dest.file_name()
                .map_or_else(|| "file".into(), |n| n.to_string_lossy())
        ));
        fs::write(&staged, content)
            .with_context(|| format!("staging {}", staged.display()))?;
        let result = Self::install_staged(ctx, &staged, dest);
        fs::remove_file(&staged).ok();
        result
    }

    fn install_staged(ctx: &RunContext, staged: &Path, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            ctx.run_privileged("mkdir", &["-p", &parent.to_string_lossy()])?;
        }
        ctx.run_privileged(
            "install",
            &["-m", "0644", &staged.to_string_lossy(), &dest.to_string_lossy()],
        )?;
        Ok(())
    }
}

impl Step for TemplateFile {
    fn description(&self) -> String {
        format!("template {}", self.destination)
    }

    fn requires_privilege(&self) -> bool {
        self.privileged
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        let desired = self.render(ctx)?;
        let dest = ctx.expand_path(&self.destination);
        match fs::read(&dest) {
            Ok(current) if current == desired.as_bytes() => Ok(StepState::Satisfied),
            Ok(current) => Ok(StepState::Differs {
                current: format!("content differs ({} bytes on disk)", current.len()),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StepState::Missing),
            Err(e) => Err(e).with_context(|| format!("reading {}", dest.display())),
        }
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        let desired = self.render(ctx)?;
        let dest = ctx.expand_path(&self.destination);
        if self.privileged {
            return Self::write_privileged(ctx, &dest, &desired);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&dest, desired).with_context(|| format!("writing {}", dest.display()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::platform::Os;
    use crate::runner::test_helpers::{FakeExecutor, context, ok};

    fn setup(template: &str) -> (tempfile::TempDir, TemplateFile, RunContext) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gitconfig.tmpl");
        fs::write(&source, template).unwrap();
        let step = TemplateFile {
            source,
            destination: "~/.config/git/config".to_string(),
            privileged: false,
        };
        let ctx = context(FakeExecutor::new(|_| None), Os::Linux)
            .with_home(dir.path().to_path_buf());
        (dir, step, ctx)
    }

    #[test]
    fn missing_destination_is_missing() {
        let (_dir, step, ctx) = setup("font={{ .font }}\n");
        assert_eq!(step.check(&ctx).unwrap(), StepState::Missing);
    }

    #[test]
    fn apply_writes_rendered_content_and_converges() {
        let (dir, step, ctx) = setup("font={{ .font }}\n");
        step.apply(&ctx).unwrap();
        let written = fs::read_to_string(dir.path().join(".config/git/config")).unwrap();
        assert_eq!(written, "font=Iosevka\n");
        assert_eq!(step.check(&ctx).unwrap(), StepState::Satisfied);
    }

    #[test]
    fn different_content_differs() {
        let (dir, step, ctx) = setup("font={{ .font }}\n");
        let dest = dir.path().join(".config/git/config");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "font=Menlo\n").unwrap();
        assert!(matches!(
            step.check(&ctx).unwrap(),
            StepState::Differs { .. }
        ));
    }

    #[test]
    fn unresolved_variable_fails_check() {
        let (_dir, step, ctx) = setup("{{ .undefined }}");
        let err = step.check(&ctx).unwrap_err();
        assert!(format!("{err:#}").contains("unresolved variable '.undefined'"));
    }

    #[test]
    fn privileged_write_goes_through_install() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("ntp.tmpl");
        fs::write(&source, "server {{ .hostname }}\n").unwrap();
        let step = TemplateFile {
            source,
            destination: "/etc/provision-test/ntp.conf".to_string(),
            privileged: true,
        };
        let exec = FakeExecutor::new(|_| Some(ok("")));
        let ctx = context(exec.clone(), Os::Linux);
        ctx.privilege.ensure("test").unwrap();
        step.apply(&ctx).unwrap();
        let calls = exec.calls();
        assert_eq!(calls[0], "sudo -n mkdir -p /etc/provision-test");
        assert!(calls[1].starts_with("sudo -n install -m 0644 "));
        assert!(calls[1].ends_with(" /etc/provision-test/ntp.conf"));
    }
}
