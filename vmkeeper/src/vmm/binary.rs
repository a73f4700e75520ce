//! Hypervisor executable resolution.

use std::path::{Path, PathBuf};

use crate::definition::VmDefinition;

/// Directories checked before falling back to `PATH`.
const WELL_KNOWN_DIRS: &[&str] = &[
    "/usr/bin",
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/opt/local/bin",
    "/usr/libexec",
];

pub fn binary_name(definition: &VmDefinition) -> String {
    format!("qemu-system-{}", definition.system.architecture())
}

/// Pick the executable for `definition`.
///
/// An explicit override always wins. Otherwise the architecture-specific name
/// is looked up in well-known directories; if none has it, the bare name is
/// returned and the spawn relies on `PATH`.
pub fn resolve_hypervisor(definition: &VmDefinition, override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }

    let name = binary_name(definition);
    resolve_in(&name, WELL_KNOWN_DIRS.iter().map(Path::new))
}

fn resolve_in<'a>(name: &str, dirs: impl IntoIterator<Item = &'a Path>) -> PathBuf {
    for dir in dirs {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return candidate;
        }
    }
    tracing::debug!(binary = %name, "Hypervisor not in well-known locations, relying on PATH");
    PathBuf::from(name)
}
