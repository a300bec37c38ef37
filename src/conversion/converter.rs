//! Backend-agnostic converter façade.
//!
//! The [`Converter`] owns the one backend chosen at startup. Each conversion
//! runs as a producer task whose progress and terminal [`Outcome`] arrive on
//! a channel, so subprocess I/O never touches the tracker's locks directly.

use std::sync::Arc;

use fc_av::{
    Backend, BackendInfo, BinaryResolver, ConvertRequest, NativeBackend, Outcome,
    ProcessBackend, ProgressSender,
};
use fc_core::config::{BackendKind, Config};
use tokio::sync::{mpsc, OnceCell};
use tokio_util::sync::CancellationToken;

/// Buffered progress events per conversion. Progress beyond this is dropped;
/// only the latest value matters.
const EVENT_BUFFER: usize = 64;

/// Message from a running conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Progress(f32),
    /// Always the last message.
    Finished(Outcome),
}

/// Single entry point to the active backend.
pub struct Converter {
    backend: Arc<dyn Backend>,
    ready: OnceCell<Result<(), String>>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("backend", &self.backend.name())
            .field("kind", &self.backend.kind())
            .finish()
    }
}

impl Converter {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            ready: OnceCell::new(),
        }
    }

    /// Pick the backend named by `tools.backend`. This is the only place the
    /// choice is read.
    pub fn from_config(config: &Config, resolver: Arc<BinaryResolver>) -> Self {
        let backend: Arc<dyn Backend> = match config.tools.backend {
            BackendKind::Process => Arc::new(ProcessBackend::from_config(config, resolver)),
            BackendKind::Native => Arc::new(NativeBackend::default()),
        };
        tracing::info!(backend = backend.name(), kind = %backend.kind(), "converter backend selected");
        Self::new(backend)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Prepare the backend once. Later calls observe the same outcome.
    ///
    /// # Errors
    ///
    /// Returns [`fc_core::Error::Resolution`] when the backend is unusable.
    pub async fn ready(&self) -> fc_core::Result<()> {
        let outcome = self
            .ready
            .get_or_init(|| async {
                self.backend.prepare().await.map_err(|e| match e {
                    fc_core::Error::Resolution(msg) => msg,
                    other => other.to_string(),
                })
            })
            .await;
        outcome.clone().map_err(fc_core::Error::Resolution)
    }

    /// Start one conversion. The receiver yields progress events followed by
    /// exactly one [`BackendEvent::Finished`].
    pub fn convert(
        &self,
        request: ConvertRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<BackendEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let backend = Arc::clone(&self.backend);

        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let job_id = request.job_id;
            let progress = ProgressSender::new(move |pct| {
                if progress_tx.try_send(BackendEvent::Progress(pct)).is_err() {
                    tracing::trace!(%job_id, pct, "progress event dropped");
                }
            });

            let outcome = backend.convert(&request, &progress, &cancel).await;
            if tx.send(BackendEvent::Finished(outcome)).await.is_err() {
                tracing::debug!(%job_id, "conversion finished with no listener");
            }
        });

        rx
    }

    /// Backend identity and version for diagnostics.
    pub async fn info(&self) -> BackendInfo {
        self.backend.info().await
    }
}
