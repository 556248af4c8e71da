//! OS-facing leaves: port probing, process control, the pid ledger, the
//! shell command seam and interruptible sleeps for background loops.

pub mod ledger;
pub mod pace;
pub mod port;
pub mod process;
pub mod runner;

pub use ledger::Ledger;
pub use pace::sleep_unless;
pub use port::find_free_port;
pub use runner::{CommandRunner, MockRunner, ShellRunner};
