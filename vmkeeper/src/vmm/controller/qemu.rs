//! QEMU-backed controller and handler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use vmkeeper_shared::Transport;
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

use super::spawn::spawn_hypervisor;
use super::{VmmController, VmmExit, VmmHandler};
use crate::definition::VmDefinition;
use crate::qmp::{QmpClient, RunState};
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::options::VmkeeperOptions;
use crate::util::send_signal;
use crate::vmm::args::ArgumentBuilder;
use crate::vmm::binary::resolve_hypervisor;

/// Spawns `qemu-system-*` processes with a QMP socket attached.
pub struct QemuController {
    layout: FilesystemLayout,
    args: Arc<dyn ArgumentBuilder>,
    hypervisor_binary: Option<PathBuf>,
    connect_timeout: Duration,
}

impl QemuController {
    pub fn new(
        layout: FilesystemLayout,
        args: Arc<dyn ArgumentBuilder>,
        options: &VmkeeperOptions,
    ) -> Self {
        Self {
            layout,
            args,
            hypervisor_binary: options.hypervisor_binary.clone(),
            connect_timeout: options.control_connect_timeout(),
        }
    }

    /// Full argument list: builder output plus the control endpoint.
    fn launch_args(&self, definition: &VmDefinition, transport: &Transport) -> Vec<String> {
        let mut args = self.args.build_args(definition);
        args.push("-qmp".to_string());
        args.push(format!("{},server=on,wait=off", transport.to_uri()));
        args
    }

    async fn prepare_dirs(&self) -> VmkeeperResult<()> {
        tokio::fs::create_dir_all(self.layout.sockets_dir()).await?;
        tokio::fs::create_dir_all(self.layout.logs_dir()).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl VmmController for QemuController {
    async fn launch(
        &self,
        definition: &VmDefinition,
        cancel: &CancellationToken,
    ) -> VmkeeperResult<Box<dyn VmmHandler>> {
        definition
            .sanitize()
            .map_err(|e| VmkeeperError::LaunchFailed(e.to_string()))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(VmkeeperError::LaunchFailed("launch cancelled before spawn".into()));
            }
            prepared = self.prepare_dirs() => {
                prepared.map_err(|e| VmkeeperError::LaunchFailed(e.to_string()))?;
            }
        }
        if cancel.is_cancelled() {
            return Err(VmkeeperError::LaunchFailed(
                "launch cancelled before spawn".into(),
            ));
        }

        let transport = Transport::unix(self.layout.control_socket_path(&definition.uuid));
        let binary = resolve_hypervisor(definition, self.hypervisor_binary.as_deref());
        let args = self.launch_args(definition, &transport);
        let log_path = self.layout.instance_log_path(&definition.name);

        tracing::debug!(
            vm = %definition.name,
            binary = %binary.display(),
            args = ?args,
            "Spawning hypervisor"
        );
        let child = spawn_hypervisor(&binary, &args, &log_path)?;

        let handler = QemuHandler::supervise(
            definition.name.clone(),
            child,
            transport,
            definition.display_port(),
            self.connect_timeout,
        )?;

        tracing::info!(
            vm = %definition.name,
            pid = handler.pid(),
            socket = %handler.control_transport(),
            log = %log_path.display(),
            "Hypervisor started"
        );
        Ok(Box::new(handler))
    }
}

/// Owns one hypervisor process.
///
/// The `Child` lives in a reaper task that publishes the exit status on a
/// watch channel. Everything else here works from the pid, the control
/// socket and that channel.
pub struct QemuHandler {
    name: String,
    pid: u32,
    display_port: u16,
    transport: Transport,
    qmp: QmpClient,
    exit_rx: watch::Receiver<Option<VmmExit>>,
}

impl QemuHandler {
    fn supervise(
        name: String,
        mut child: Child,
        transport: Transport,
        display_port: u16,
        connect_timeout: Duration,
    ) -> VmkeeperResult<Self> {
        let pid = child.id().ok_or_else(|| {
            VmkeeperError::LaunchFailed(format!("{} exited before its pid was read", name))
        })?;

        let (exit_tx, exit_rx) = watch::channel(None);
        let reaper_name = name.clone();
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => VmmExit::from(status),
                Err(e) => VmmExit::Unknown(e.to_string()),
            };
            tracing::debug!(vm = %reaper_name, pid, exit = %exit, "Hypervisor process reaped");
            let _ = exit_tx.send(Some(exit));
        });

        let qmp = QmpClient::new(transport.socket_path(), connect_timeout);
        Ok(Self {
            name,
            pid,
            display_port,
            transport,
            qmp,
            exit_rx,
        })
    }

    /// Signal the process unless it has already been reaped, so a recycled
    /// pid is never hit.
    fn signal(&self, signal: libc::c_int) -> VmkeeperResult<()> {
        if !self.is_running() {
            tracing::debug!(vm = %self.name, pid = self.pid, signal, "Process already exited, not signalling");
            return Ok(());
        }
        send_signal(self.pid, signal)
    }
}

#[async_trait::async_trait]
impl VmmHandler for QemuHandler {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn display_port(&self) -> u16 {
        self.display_port
    }

    fn control_transport(&self) -> &Transport {
        &self.transport
    }

    fn is_running(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    async fn power_down(&self) -> VmkeeperResult<()> {
        match self.qmp.power_down().await {
            Ok(()) => {
                tracing::info!(vm = %self.name, pid = self.pid, "Requested guest power-down");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    vm = %self.name,
                    pid = self.pid,
                    error = %e,
                    "Graceful power-down failed, sending SIGTERM"
                );
                self.signal(libc::SIGTERM)
            }
        }
    }

    async fn pause(&self) -> VmkeeperResult<()> {
        self.qmp.pause().await
    }

    async fn resume(&self) -> VmkeeperResult<()> {
        self.qmp.resume().await
    }

    async fn create_snapshot(&self, tag: &str) -> VmkeeperResult<()> {
        self.qmp.save_snapshot(tag).await
    }

    async fn restore_snapshot(&self, tag: &str) -> VmkeeperResult<()> {
        self.qmp.load_snapshot(tag).await
    }

    async fn delete_snapshot(&self, tag: &str) -> VmkeeperResult<()> {
        self.qmp.delete_snapshot(tag).await
    }

    async fn query_status(&self) -> VmkeeperResult<RunState> {
        self.qmp.query_status().await
    }

    fn kill(&self) -> VmkeeperResult<()> {
        self.signal(libc::SIGKILL)
    }

    async fn wait(&self) -> VmmExit {
        let mut rx = self.exit_rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(exit) => exit
                .clone()
                .unwrap_or_else(|| VmmExit::Unknown("missing exit status".into())),
            Err(_) => VmmExit::Unknown("reaper task ended without a status".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::is_process_alive;
    use tempfile::TempDir;

    /// Runs `/bin/sh -c <script>`; the appended `-qmp ...` pair lands in `$0 $1`.
    struct ShellArgs(&'static str);

    impl ArgumentBuilder for ShellArgs {
        fn build_args(&self, _definition: &VmDefinition) -> Vec<String> {
            vec!["-c".to_string(), self.0.to_string()]
        }
    }

    fn controller(dir: &TempDir, script: &'static str) -> QemuController {
        let mut options = VmkeeperOptions::with_home(dir.path());
        options.hypervisor_binary = Some(PathBuf::from("/bin/sh"));
        options.control_connect_timeout_ms = 200;
        QemuController::new(
            FilesystemLayout::new(dir.path().to_path_buf()),
            Arc::new(ShellArgs(script)),
            &options,
        )
    }

    #[tokio::test]
    async fn test_launch_and_wait_for_exit() {
        let dir = TempDir::new().unwrap();
        let def = VmDefinition::new("short").with_display(5907);
        let handler = controller(&dir, "exit 7")
            .launch(&def, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handler.display_port(), 5907);
        assert_eq!(
            handler.control_transport().socket_path(),
            dir.path().join("sockets").join(format!("{}.qmp", def.uuid))
        );
        assert_eq!(handler.wait().await, VmmExit::Exited(7));
        assert_eq!(handler.wait().await, VmmExit::Exited(7));
        assert!(!handler.is_running());
    }

    #[tokio::test]
    async fn test_power_down_falls_back_to_sigterm() {
        let dir = TempDir::new().unwrap();
        let def = VmDefinition::new("hung");
        let handler = controller(&dir, "sleep 30")
            .launch(&def, &CancellationToken::new())
            .await
            .unwrap();
        assert!(handler.is_running());

        // Nothing listens on the control socket, so this must use the signal.
        handler.power_down().await.unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(5), handler.wait())
            .await
            .unwrap();
        assert!(matches!(exit, VmmExit::Signaled(libc::SIGTERM) | VmmExit::Exited(_)), "{exit}");
        assert!(!is_process_alive(handler.pid()));
    }

    #[tokio::test]
    async fn test_pause_has_no_fallback() {
        let dir = TempDir::new().unwrap();
        let def = VmDefinition::new("nopause");
        let handler = controller(&dir, "sleep 30")
            .launch(&def, &CancellationToken::new())
            .await
            .unwrap();

        let err = handler.pause().await.unwrap_err();
        assert!(matches!(err, VmkeeperError::Connection(_)));
        assert!(handler.is_running());

        handler.kill().unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), handler.wait())
            .await
            .unwrap();
        assert_eq!(exit, VmmExit::Signaled(libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_cancelled_launch_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let def = VmDefinition::new("cancelled");
        let err = controller(&dir, "sleep 30")
            .launch(&def, &cancel)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VmkeeperError::LaunchFailed(_)));
        assert!(!dir.path().join("logs").join("cancelled.log").exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_failure() {
        let dir = TempDir::new().unwrap();
        let mut options = VmkeeperOptions::with_home(dir.path());
        options.hypervisor_binary = Some(dir.path().join("no-such-qemu"));
        let controller = QemuController::new(
            FilesystemLayout::new(dir.path().to_path_buf()),
            Arc::new(crate::vmm::QemuArgBuilder),
            &options,
        );

        let err = controller
            .launch(&VmDefinition::new("ghost"), &CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VmkeeperError::LaunchFailed(_)));
    }

    #[test]
    fn test_launch_args_append_control_endpoint() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, "true");
        let transport = Transport::unix("/run/vm.qmp");
        let args = controller.launch_args(&VmDefinition::new("x"), &transport);
        assert_eq!(
            &args[args.len() - 2..],
            &["-qmp".to_string(), "unix:/run/vm.qmp,server=on,wait=off".to_string()]
        );
    }
}
