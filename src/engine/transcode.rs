//! The single shared transcoding engine.
//!
//! ## Why a session guard?
//!
//! The engine owns one execution core and one working directory whose file
//! names are fixed (`input.<ext>`, `output.<ext>`). Two overlapping
//! conversions would overwrite each other's files, so every
//! write → exec → read sequence happens inside a [`TranscodeSession`], which
//! holds an async mutex for its whole lifetime. Waiting callers suspend rather
//! than block a worker thread.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──ensure_ready──► Loading ──► Ready
//!                                     └─────► Failed (sticky)
//! ```
//!
//! The loader runs at most once per engine. Concurrent `ensure_ready` callers
//! share that single load; after a failure every later call fails fast with
//! [`ConvertError::EngineUnavailable`].

use crate::error::ConvertError;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{debug, info, warn};

const ENGINE: &str = "transcoder";

/// Executes one command line against files in a working directory.
pub trait ExecutionCore: Send + Sync {
    fn exec<'a>(
        &'a self,
        workdir: &'a Path,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<(), ConvertError>>;
}

/// Produces the execution core. Called at most once per engine.
pub trait CoreLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn ExecutionCore>, ConvertError>>;
}

/// Observable engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

struct Workspace {
    dir: Option<tempfile::TempDir>,
}

impl Workspace {
    fn path(&mut self) -> Result<PathBuf, ConvertError> {
        if self.dir.is_none() {
            self.dir = Some(tempfile::Builder::new().prefix("fileconv-").tempdir()?);
        }
        match &self.dir {
            Some(d) => Ok(d.path().to_path_buf()),
            None => Err(ConvertError::Internal("working directory missing".into())),
        }
    }
}

/// Lazily-initialised, single-flight transcoding engine.
///
/// Share one instance (behind an `Arc`) across everything that transcodes.
pub struct TranscodeEngine {
    loader: Box<dyn CoreLoader>,
    core: OnceCell<Result<Arc<dyn ExecutionCore>, String>>,
    loading: AtomicBool,
    workspace: Mutex<Workspace>,
}

impl std::fmt::Debug for TranscodeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeEngine").field("state", &self.state()).finish()
    }
}

impl TranscodeEngine {
    pub fn new(loader: impl CoreLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            core: OnceCell::new(),
            loading: AtomicBool::new(false),
            workspace: Mutex::new(Workspace { dir: None }),
        }
    }

    pub fn state(&self) -> EngineState {
        match self.core.get() {
            Some(Ok(_)) => EngineState::Ready,
            Some(Err(_)) => EngineState::Failed,
            None if self.loading.load(Ordering::Acquire) => EngineState::Loading,
            None => EngineState::Uninitialized,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Load the core if needed and wait until it is ready.
    pub async fn ensure_ready(&self) -> Result<(), ConvertError> {
        self.core().await.map(|_| ())
    }

    async fn core(&self) -> Result<Arc<dyn ExecutionCore>, ConvertError> {
        let slot = self
            .core
            .get_or_init(|| async {
                self.loading.store(true, Ordering::Release);
                info!("Loading transcoding core");
                let loaded = self.loader.load().await;
                self.loading.store(false, Ordering::Release);
                match loaded {
                    Ok(core) => {
                        info!("Transcoding core ready");
                        Ok(core)
                    }
                    Err(e) => {
                        warn!("Transcoding core failed to load: {}", e);
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match slot {
            Ok(core) => Ok(Arc::clone(core)),
            Err(detail) => Err(ConvertError::engine_unavailable(ENGINE, detail.clone())),
        }
    }

    /// Acquire exclusive use of the core and its working directory.
    ///
    /// Waits for readiness first, then for any session already in progress.
    pub async fn session(&self) -> Result<TranscodeSession<'_>, ConvertError> {
        let core = self.core().await?;
        let mut guard = self.workspace.lock().await;
        let workdir = guard.path()?;
        debug!("Transcode session opened in {}", workdir.display());
        Ok(TranscodeSession {
            _guard: guard,
            core,
            workdir,
        })
    }
}

/// Exclusive access to the transcoding core. Dropping it releases the engine.
pub struct TranscodeSession<'a> {
    _guard: MutexGuard<'a, Workspace>,
    core: Arc<dyn ExecutionCore>,
    workdir: PathBuf,
}

impl TranscodeSession<'_> {
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, ConvertError> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && Path::new(name).file_name().is_some();
        if !plain {
            return Err(ConvertError::Internal(format!(
                "'{name}' is not a plain file name"
            )));
        }
        Ok(self.workdir.join(name))
    }

    pub async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), ConvertError> {
        let path = self.resolve(name)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, ConvertError> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| ConvertError::Transcode(format!("no output '{name}': {e}")))
    }

    /// Remove a file; a missing file is not an error.
    pub async fn remove_file(&self, name: &str) -> Result<(), ConvertError> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete everything left in the working directory by an earlier session.
    pub async fn reset(&self) -> Result<(), ConvertError> {
        let mut entries = tokio::fs::read_dir(&self.workdir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    pub async fn exec(&self, args: &[String]) -> Result<(), ConvertError> {
        self.core.exec(&self.workdir, args).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process cores for exercising the engine without ffmpeg.

    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    /// Copies `input.*` to the last argument, counting calls and tracking overlap.
    #[derive(Default)]
    pub struct CopyCore {
        pub calls: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl ExecutionCore for CopyCore {
        fn exec<'a>(
            &'a self,
            workdir: &'a Path,
            args: &'a [String],
        ) -> BoxFuture<'a, Result<(), ConvertError>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;

                let input = args
                    .windows(2)
                    .find(|w| w[0] == "-i")
                    .map(|w| w[1].clone())
                    .ok_or_else(|| ConvertError::Transcode("no input".into()))?;
                let output = args.last().cloned().unwrap_or_default();
                let bytes = tokio::fs::read(workdir.join(&input)).await?;
                tokio::fs::write(workdir.join(output), bytes).await?;

                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    /// Hands out a shared core, or fails, counting load attempts.
    pub struct StubLoader {
        pub core: Option<Arc<CopyCore>>,
        pub loads: Arc<AtomicUsize>,
    }

    impl StubLoader {
        pub fn ok(core: Arc<CopyCore>) -> Self {
            Self {
                core: Some(core),
                loads: Arc::default(),
            }
        }

        pub fn failing() -> Self {
            Self {
                core: None,
                loads: Arc::default(),
            }
        }
    }

    impl CoreLoader for StubLoader {
        fn load(&self) -> BoxFuture<'_, Result<Arc<dyn ExecutionCore>, ConvertError>> {
            async move {
                self.loads.fetch_add(1, Ordering::SeqCst);
                match &self.core {
                    Some(core) => Ok(Arc::clone(core) as Arc<dyn ExecutionCore>),
                    None => Err(ConvertError::engine_unavailable(ENGINE, "stub load failure")),
                }
            }
            .boxed()
        }
    }
}
