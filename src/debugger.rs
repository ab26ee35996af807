//! Backtrace extraction via an external debugger.

use std::path::Path;
use std::process::Command;

use tracing::{info, warn};

use crate::config::Config;
use crate::stage::Stage;

/// The substitute backtrace when the debugger can't produce one.
pub const NO_STACK: &str = "No stack";

/// Run the debugger in batch mode against `dump` and capture its stdout.
///
/// Equivalent to `gdb -q -n -ex bt -batch <target> <dump>`: quiet, no init
/// files, a single `bt` command, then exit. A missing backtrace must never
/// stop the pipeline, so every failure mode (debugger not installed,
/// nonzero exit, debugger crash) degrades to the [`NO_STACK`] sentinel.
pub fn extract_backtrace(config: &Config, dump: &Path) -> Stage<String> {
    let output = Command::new(&config.debugger_path)
        .arg("-q")
        .arg("-n")
        .arg("-ex")
        .arg("bt")
        .arg("-batch")
        .arg(&config.debugger_target_path)
        .arg(dump)
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stack = String::from_utf8_lossy(&output.stdout).into_owned();
            info!(
                "extracted a {} byte backtrace from {}",
                stack.len(),
                dump.display()
            );
            Stage::Complete(stack)
        }
        Ok(output) => {
            warn!(
                "debugger exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            Stage::Degraded(NO_STACK.to_string())
        }
        Err(err) => {
            warn!("failed to run {}: {err}", config.debugger_path);
            Stage::Degraded(NO_STACK.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_debugger(debugger: &str) -> Config {
        Config {
            debugger_path: debugger.to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn missing_debugger_degrades_to_sentinel() {
        let config = config_with_debugger("/nonexistent/gdb");
        let stage = extract_backtrace(&config, Path::new("core.test"));
        assert!(stage.is_degraded());
        assert_eq!(stage.into_inner(), NO_STACK);
    }

    #[test]
    fn nonzero_exit_degrades_to_sentinel() {
        // `false` ignores its arguments and exits 1.
        let config = config_with_debugger("false");
        let stage = extract_backtrace(&config, Path::new("core.test"));
        assert!(stage.is_degraded());
        assert_eq!(stage.into_inner(), NO_STACK);
    }

    #[test]
    fn successful_run_captures_stdout() {
        // `echo` stands in for gdb and prints the argv it was given.
        let config = config_with_debugger("echo");
        let stage = extract_backtrace(&config, Path::new("core.test"));
        assert!(!stage.is_degraded());
        let stack = stage.into_inner();
        assert!(stack.contains("bt"));
        assert!(stack.contains("core.test"));
    }
}
