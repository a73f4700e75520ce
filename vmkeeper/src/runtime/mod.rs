mod core;
pub mod layout;
pub mod options;

pub use self::core::VmkeeperRuntime;
pub use layout::FilesystemLayout;
pub use options::VmkeeperOptions;
