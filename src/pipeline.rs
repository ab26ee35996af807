//! The linear crash-handling pipeline.
//!
//! Control flow mirrors the deployment contract: argument problems and a
//! failed privilege drop stop the run before any dump processing;
//! everything after the dump is captured is best-effort. A missing
//! backtrace or a failed upload still produces a chat message. If anything
//! fails after capture, the dump file is deliberately left on disk for
//! manual recovery — only the fully successful path deletes it.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::debugger;
use crate::errors::HandlerError;
use crate::input;
use crate::notify::{Notifier, SlackNotifier};
use crate::privilege;
use crate::stage::Stage;
use crate::storage::{self, ObjectStore, S3Store};

/// Dumps from intentional aborts are noise, not crashes.
const SIGABRT: &str = "6";

/// The two tokens the kernel passes on the command line.
#[derive(Debug, Clone)]
pub struct CrashArgs {
    /// Core-identifying token (`%h.core.%e.%t` by convention).
    pub dump_name: String,
    /// Number of the signal that killed the process, as received.
    pub signal: String,
}

/// Handle one crash: the production wiring of the whole pipeline.
pub async fn run(
    config: &Config,
    args: &CrashArgs,
    reader: &mut impl Read,
) -> Result<(), HandlerError> {
    if args.signal == SIGABRT {
        info!("called with {} SIGABRT, doing nothing", args.dump_name);
        return Ok(());
    }

    // The kernel starts us in "/"; move next to our own executable so
    // relative writes land somewhere sensible, then stop being root.
    let exe = std::env::current_exe().map_err(HandlerError::ExeLookup)?;
    if let Some(dir) = exe.parent() {
        std::env::set_current_dir(dir).map_err(|source| HandlerError::Chdir {
            path: dir.to_owned(),
            source,
        })?;
    }
    let (uid, gid) = privilege::owner_of(&exe)?;
    privilege::drop_privileges(uid, gid)?;

    let dump_path = PathBuf::from(format!("core.{}", args.dump_name));
    input::write_dump(reader, &dump_path)?;

    let notifier = SlackNotifier::new(config);
    let store = match S3Store::connect(&config.bucket_name).await {
        Ok(store) => Some(store),
        Err(err) => {
            warn!("{} - {err}", err.name());
            None
        }
    };
    report_and_cleanup(
        config,
        &dump_path,
        &args.dump_name,
        store.as_ref().map(|s| s as &dyn ObjectStore),
        &notifier,
    )
    .await;
    Ok(())
}

/// The best-effort tail of the pipeline: backtrace, upload, notify,
/// delete. Nothing here propagates; a failed notification logs an
/// internal error and leaves the dump file in place.
pub async fn report_and_cleanup(
    config: &Config,
    dump_path: &Path,
    dump_name: &str,
    store: Option<&dyn ObjectStore>,
    notifier: &dyn Notifier,
) {
    let backtrace = debugger::extract_backtrace(config, dump_path);

    let url = match store {
        Some(store) => upload_stage(config, store, dump_path).await,
        None => {
            warn!("no storage connection, skipping upload");
            Stage::Degraded(None)
        }
    };
    let url = url.into_inner();

    match notifier
        .report(dump_name, url.as_deref(), &backtrace.into_inner())
        .await
    {
        Ok(()) => {
            if let Err(err) = std::fs::remove_file(dump_path) {
                warn!("unable to remove {}: {err}", dump_path.display());
            }
        }
        Err(err) => {
            error!("{} - internal error: {err}", err.name());
            info!("the core file is still in {}", dump_path.display());
        }
    }
}

async fn upload_stage(
    config: &Config,
    store: &dyn ObjectStore,
    dump_path: &Path,
) -> Stage<Option<String>> {
    let prepared = match storage::prepare_dump(dump_path, config.compress_threshold) {
        Ok(prepared) => prepared,
        Err(err) => {
            warn!(
                "{} - could not prepare {} for upload: {err}",
                err.name(),
                dump_path.display()
            );
            return Stage::Degraded(None);
        }
    };
    let expiry = Duration::from_secs(config.url_expiry_secs);
    match storage::upload_dump(store, &prepared, config.chunk_size, expiry).await {
        Ok(url) => Stage::Complete(Some(url)),
        Err(err) => {
            warn!("{} - upload failed: {err}", err.name());
            Stage::Degraded(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NotifyError;
    use crate::notify::UPLOAD_FAILED_LINE;
    use crate::storage::testing::FakeStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeNotifier {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn report(
            &self,
            dump_name: &str,
            url: Option<&str>,
            backtrace: &str,
        ) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Api("channel_not_found".to_string()));
            }
            self.messages
                .lock()
                .unwrap()
                .push(crate::notify::compose_message(dump_name, url, backtrace));
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config {
            // `echo` stands in for gdb; the backtrace stage completes.
            debugger_path: "echo".to_string(),
            chunk_size: 4,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn successful_run_posts_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("core.myhost.core.myapp.1234");
        std::fs::write(&dump_path, b"\x7fELF-minimal-binary").unwrap();
        let store = FakeStore::default();
        let notifier = FakeNotifier::default();

        report_and_cleanup(
            &test_config(),
            &dump_path,
            "myhost.core.myapp.1234",
            Some(&store),
            &notifier,
        )
        .await;

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("myhost.core.myapp.1234"));
        assert!(messages[0].contains("Download from https://storage.test/"));
        assert!(store.completed.lock().unwrap().is_some());
        // Success is the only path that removes the dump.
        assert!(!dump_path.exists());
    }

    #[tokio::test]
    async fn missing_store_reports_upload_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("core.nostore");
        std::fs::write(&dump_path, b"bytes").unwrap();
        let notifier = FakeNotifier::default();

        report_and_cleanup(&test_config(), &dump_path, "nostore", None, &notifier).await;

        let messages = notifier.messages.lock().unwrap();
        assert!(messages[0].contains(UPLOAD_FAILED_LINE));
        assert!(!messages[0].contains("Download from"));
        // The report still went out, so the dump is cleaned up.
        assert!(!dump_path.exists());
    }

    #[tokio::test]
    async fn failed_upload_degrades_but_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("core.badpart");
        std::fs::write(&dump_path, b"eight by").unwrap();
        let store = FakeStore {
            fail_part: Some(1),
            ..FakeStore::default()
        };
        let notifier = FakeNotifier::default();

        report_and_cleanup(&test_config(), &dump_path, "badpart", Some(&store), &notifier).await;

        assert!(*store.aborted.lock().unwrap());
        let messages = notifier.messages.lock().unwrap();
        assert!(messages[0].contains(UPLOAD_FAILED_LINE));
    }

    #[tokio::test]
    async fn failed_notification_preserves_the_dump() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("core.kept");
        let bytes = b"keep me".to_vec();
        std::fs::write(&dump_path, &bytes).unwrap();
        let store = FakeStore::default();
        let notifier = FakeNotifier {
            fail: true,
            ..FakeNotifier::default()
        };

        report_and_cleanup(&test_config(), &dump_path, "kept", Some(&store), &notifier).await;

        // The asymmetry is intentional: an error after capture leaves the
        // file for manual recovery.
        assert_eq!(std::fs::read(&dump_path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn broken_debugger_still_reports_sentinel_stack() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("core.nostack");
        std::fs::write(&dump_path, b"bytes").unwrap();
        let config = Config {
            debugger_path: "/nonexistent/gdb".to_string(),
            chunk_size: 4,
            ..Config::default()
        };
        let store = FakeStore::default();
        let notifier = FakeNotifier::default();

        report_and_cleanup(&config, &dump_path, "nostack", Some(&store), &notifier).await;

        let messages = notifier.messages.lock().unwrap();
        assert!(messages[0].contains("No stack"));
        assert!(messages[0].contains("Download from"));
    }
}
