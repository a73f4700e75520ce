//! Runtime entry point wiring the store, supervisor, registry and display bridge.

use std::sync::Arc;

use vmkeeper_shared::errors::VmkeeperResult;

use crate::definition::{DefinitionStore, DirectoryDefinitionStore};
use crate::display::DisplayBridge;
use crate::logging::init_logging;
use crate::registry::InstanceRegistry;
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::options::VmkeeperOptions;
use crate::vmm::{QemuArgBuilder, QemuController, VmmController};

/// Owns one instance registry and the display bridge in front of it.
///
/// Cheap to clone; clones share the same registry. There is no global
/// instance: front ends create one and pass it around.
#[derive(Clone, Debug)]
pub struct VmkeeperRuntime {
    options: VmkeeperOptions,
    layout: FilesystemLayout,
    registry: InstanceRegistry,
    display: DisplayBridge,
}

impl VmkeeperRuntime {
    /// Runtime launching QEMU with the stock argument builder.
    ///
    /// # Errors
    ///
    /// `Config` for invalid options, `Storage` if the home directory cannot
    /// be prepared.
    pub fn new(options: VmkeeperOptions, store: Arc<dyn DefinitionStore>) -> VmkeeperResult<Self> {
        let layout = Self::prepare(&options)?;
        Self::with_qemu(options, layout, store)
    }

    /// Runtime reading definitions from `<home>/machines/*.yaml`.
    pub fn open(options: VmkeeperOptions) -> VmkeeperResult<Self> {
        let layout = Self::prepare(&options)?;
        let store = DirectoryDefinitionStore::open(layout.machines_dir())?;
        Self::with_qemu(options, layout, Arc::new(store))
    }

    /// Runtime with a caller-supplied supervisor, for other hypervisors or
    /// tests.
    pub fn with_controller(
        options: VmkeeperOptions,
        store: Arc<dyn DefinitionStore>,
        controller: Arc<dyn VmmController>,
    ) -> VmkeeperResult<Self> {
        let layout = Self::prepare(&options)?;
        Self::assemble(options, layout, store, controller)
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn display(&self) -> &DisplayBridge {
        &self.display
    }

    pub fn layout(&self) -> &FilesystemLayout {
        &self.layout
    }

    pub fn options(&self) -> &VmkeeperOptions {
        &self.options
    }

    /// Stop tracking every instance. See [`InstanceRegistry::shutdown`].
    pub fn shutdown(&self, force: bool) {
        self.registry.shutdown(force);
    }

    /// Validate options, create the home layout and install logging.
    fn prepare(options: &VmkeeperOptions) -> VmkeeperResult<FilesystemLayout> {
        options.sanitize()?;
        let layout = FilesystemLayout::new(options.home_dir.clone());
        layout.prepare()?;
        init_logging(&layout)?;
        Ok(layout)
    }

    fn with_qemu(
        options: VmkeeperOptions,
        layout: FilesystemLayout,
        store: Arc<dyn DefinitionStore>,
    ) -> VmkeeperResult<Self> {
        let controller = QemuController::new(layout.clone(), Arc::new(QemuArgBuilder), &options);
        Self::assemble(options, layout, store, Arc::new(controller))
    }

    fn assemble(
        options: VmkeeperOptions,
        layout: FilesystemLayout,
        store: Arc<dyn DefinitionStore>,
        controller: Arc<dyn VmmController>,
    ) -> VmkeeperResult<Self> {
        let registry = InstanceRegistry::new(store, controller);
        let display = DisplayBridge::new(registry.clone(), &options);
        tracing::info!(home = %layout.home_dir().display(), "Runtime ready");
        Ok(Self {
            options,
            layout,
            registry,
            display,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::VmDefinition;
    use tempfile::TempDir;
    use vmkeeper_shared::VmkeeperError;

    #[test]
    fn test_new_prepares_layout() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(crate::definition::MemoryDefinitionStore::new());
        let runtime = VmkeeperRuntime::new(VmkeeperOptions::with_home(dir.path()), store).unwrap();

        assert!(runtime.layout().machines_dir().is_dir());
        assert!(runtime.layout().sockets_dir().is_dir());
        assert!(runtime.layout().logs_dir().is_dir());
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let store = Arc::new(crate::definition::MemoryDefinitionStore::new());
        let err = VmkeeperRuntime::new(VmkeeperOptions::with_home("relative"), store).unwrap_err();
        assert!(matches!(err, VmkeeperError::Config(_)));
    }

    #[test]
    fn test_open_reads_machine_definitions() {
        let dir = TempDir::new().unwrap();
        let machines = dir.path().join("machines");
        std::fs::create_dir_all(&machines).unwrap();
        let def = VmDefinition::new("alpha").with_display(5901);
        std::fs::write(
            machines.join("alpha.yaml"),
            serde_yaml::to_string(&def).unwrap(),
        )
        .unwrap();

        let runtime = VmkeeperRuntime::open(VmkeeperOptions::with_home(dir.path())).unwrap();
        let definitions = runtime.registry().list_definitions().unwrap();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].definition, def);
        assert!(!definitions[0].status.is_running());
        assert_eq!(runtime.layout().home_dir(), dir.path());
    }

    #[test]
    fn test_open_rejects_invalid_options_before_touching_disk() {
        let dir = TempDir::new().unwrap();
        let mut options = VmkeeperOptions::with_home(dir.path().join("home"));
        options.display_connect_timeout_ms = 0;

        let err = VmkeeperRuntime::open(options).unwrap_err();
        assert!(matches!(err, VmkeeperError::Config(_)));
        assert!(!dir.path().join("home").exists());
    }
}
