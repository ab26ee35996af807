//! A kernel-invoked core dump handler.
//!
//! The binary is installed as the target of `kernel.core_pattern`:
//!
//! ```text
//! sysctl -w kernel.core_pattern="|/path/to/coredump-reporter %h.core.%e.%t %s"
//! ```
//!
//! When a monitored process dies to a signal, the kernel runs the handler
//! as root with the core image piped to stdin and two arguments: a
//! core-identifying token (`%h.core.%e.%t`) and the fatal signal number.
//! The handler then walks a single linear pipeline:
//!
//! 1. drop privileges to the owner of the handler executable,
//! 2. capture the dump into `core.<token>` next to the executable,
//! 3. extract a backtrace with gdb in batch mode,
//! 4. gzip large dumps and upload them to object storage in 50 MiB parts,
//! 5. post a summary (name, download URL, backtrace) to a Slack channel,
//! 6. delete the local dump.
//!
//! Everything past step 2 is best-effort: a missing backtrace becomes a
//! sentinel string, a failed upload becomes an explicit failure line in
//! the chat message, and the report is posted regardless. Only a failed
//! privilege drop or an unwritable dump file stops the run. If anything
//! goes wrong after the dump is captured, the local file is left on disk
//! for manual recovery.

pub mod config;
pub mod debugger;
pub mod errors;
pub mod input;
pub mod notify;
pub mod pipeline;
pub mod privilege;
pub mod stage;
pub mod storage;

pub use config::Config;
pub use errors::HandlerError;
pub use pipeline::{run, CrashArgs};
pub use stage::Stage;
