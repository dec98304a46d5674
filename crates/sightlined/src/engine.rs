use sightline_core::{Classifier, FaceAnalyzer, Pipeline, PipelineError, PredictionResult};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("pipeline panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl EngineError {
    /// Stable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Pipeline(e) => e.kind(),
            EngineError::ChannelClosed | EngineError::Panicked(_) | EngineError::Spawn(_) => "engine",
        }
    }
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Predict {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<PredictionResult, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run a full prediction on uploaded image bytes.
    pub async fn predict(&self, image: Vec<u8>) -> Result<PredictionResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Predict {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the pipeline, so the detector session is never shared
/// and CPU-bound inference stays off the async runtime. Models must be
/// loaded before this is called. A panic inside one prediction is reported
/// to that caller and the thread keeps serving.
pub fn spawn_engine<C, F>(mut pipeline: Pipeline<C, F>, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    C: Classifier + Send + 'static,
    F: FaceAnalyzer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("sightline-engine".into())
        .spawn(move || {
            tracing::info!(face_source = ?pipeline.face_source(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Predict { image, reply } => {
                        let started = std::time::Instant::now();
                        let result = run_guarded(&mut pipeline, &image);
                        tracing::debug!(
                            bytes = image.len(),
                            ok = result.is_ok(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "predict: done"
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn run_guarded<C: Classifier, F: FaceAnalyzer>(
    pipeline: &mut Pipeline<C, F>,
    image: &[u8],
) -> Result<PredictionResult, EngineError> {
    match panic::catch_unwind(AssertUnwindSafe(|| pipeline.predict_bytes(image))) {
        Ok(result) => result.map_err(EngineError::from),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(kind = "engine", panic = %message, "pipeline panicked; request dropped");
            Err(EngineError::Panicked(message))
        }
    }
}
