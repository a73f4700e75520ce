//! Translation of a definition into hypervisor command-line arguments.

use crate::definition::{DriveConfig, DriveInterface, ImageKind, VNC_BASE_PORT, VmDefinition};

/// Builds the launch arguments for a definition.
///
/// Implementations must be pure. The control endpoint is not their concern:
/// the controller appends it.
pub trait ArgumentBuilder: Send + Sync {
    fn build_args(&self, definition: &VmDefinition) -> Vec<String>;
}

/// QEMU system emulator arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct QemuArgBuilder;

impl ArgumentBuilder for QemuArgBuilder {
    fn build_args(&self, def: &VmDefinition) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        let mut push = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        push("-name", def.name.clone());
        push("-uuid", def.uuid.to_string());
        push("-m", def.system.memory_mib.to_string());
        push("-smp", format!("cpus={}", def.system.cpus));

        let accel = def
            .system
            .accelerator
            .clone()
            .unwrap_or_else(|| detect_accelerator().to_string());
        push("-accel", accel);

        if let Some(machine) = &def.system.machine {
            push("-machine", machine.clone());
        }
        if let Some(cpu) = &def.system.cpu {
            push("-cpu", cpu.clone());
        }

        for drive in &def.drives {
            let id = format!("drive{}", drive.id);
            let mut file_arg = format!("if=none,id={},file={}", id, drive.image_path);
            if drive.read_only {
                file_arg.push_str(",readonly=on");
            }
            push("-drive", file_arg);
            push("-device", format!("{},drive={}", device_kind(drive), id));
        }

        let mut netdev = "user,id=net0".to_string();
        for fwd in &def.network.port_forwards {
            netdev.push_str(&format!(
                ",hostfwd={}::{}-:{}",
                fwd.protocol, fwd.host_port, fwd.guest_port
            ));
        }
        push("-netdev", netdev);
        let nic = def
            .network
            .hardware
            .as_deref()
            .unwrap_or("virtio-net-pci");
        push("-device", format!("{},netdev=net0", nic));

        match def.display_port() {
            0 => args.push("-nographic".to_string()),
            port => {
                args.push("-vnc".to_string());
                args.push(format!(
                    "127.0.0.1:{}",
                    port.saturating_sub(VNC_BASE_PORT)
                ));
            }
        }

        args.extend(def.extra_args.iter().cloned());
        args
    }
}

/// Hardware accelerator for the host OS.
pub fn detect_accelerator() -> &'static str {
    if cfg!(target_os = "macos") {
        "hvf"
    } else if cfg!(target_os = "linux") {
        "kvm"
    } else if cfg!(target_os = "windows") {
        "whpx"
    } else {
        "tcg"
    }
}

fn device_kind(drive: &DriveConfig) -> &'static str {
    if drive.image_kind == ImageKind::Cdrom {
        return "ide-cd";
    }
    match drive.interface {
        DriveInterface::Virtio => "virtio-blk-pci",
        DriveInterface::Nvme => "nvme",
        DriveInterface::Usb => "usb-storage",
        DriveInterface::Scsi => "scsi-hd",
        DriveInterface::Ide => "ide-hd",
    }
}
