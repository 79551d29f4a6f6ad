use super::SandboxPolicy;
use std::path::{Component, Path, PathBuf};

impl SandboxPolicy {
    /// Check a path argument. `Err` carries the human-readable violation.
    pub fn check_path(&self, raw: &str) -> Result<(), String> {
        if raw.trim().is_empty() {
            return Err("empty path".into());
        }

        // Null bytes truncate paths in C-backed syscalls
        if raw.contains('\0') {
            return Err("path contains a null byte".into());
        }

        if Path::new(raw)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(format!("path traversal in `{raw}`"));
        }

        let lower = raw.to_lowercase();
        if lower.contains("..%2f") || lower.contains("%2f..") {
            return Err(format!("encoded path traversal in `{raw}`"));
        }

        let expanded = PathBuf::from(shellexpand::tilde(raw).into_owned());
        if !expanded.is_absolute() {
            return Ok(());
        }

        if expanded.parent().is_none() {
            return Err(format!("`{raw}` is the filesystem root"));
        }

        if expanded.starts_with(&self.sandbox_root) {
            return Ok(());
        }

        for forbidden in &self.forbidden_paths {
            let forbidden_path = PathBuf::from(shellexpand::tilde(forbidden).into_owned());
            if expanded.starts_with(&forbidden_path) {
                return Err(format!("`{raw}` is under forbidden path {forbidden}"));
            }
        }

        if self.workspace_only {
            return Err(format!(
                "absolute path `{raw}` is outside sandbox root {}",
                self.sandbox_root.display()
            ));
        }

        Ok(())
    }

    pub fn is_path_allowed(&self, raw: &str) -> bool {
        self.check_path(raw).is_ok()
    }
}

/// Scratch locations where overwriting is not considered destructive.
pub fn is_temp_path(raw: &str) -> bool {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.starts_with("/tmp") || path.starts_with("/var/tmp");
    }
    let first_is_tmp = path
        .components()
        .next()
        .is_some_and(|c| matches!(c, Component::Normal(name) if name == "tmp" || name == ".tmp"));
    first_is_tmp || path.extension().is_some_and(|ext| ext == "tmp")
}
