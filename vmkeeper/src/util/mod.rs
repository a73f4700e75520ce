mod process;

pub use process::{is_process_alive, send_signal};
