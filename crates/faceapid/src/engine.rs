use faceapi_core::annotate::{self, AnnotateError};
use faceapi_core::{
    BoundingBox, Embedding, FaceAttributes, FaceBackend, Frame, FrameError, ModelStatus,
    PipelineError,
};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("annotation failed: {0}")]
    Annotate(#[from] AnnotateError),
    #[error("cannot start engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Faces found in one image.
pub struct DetectOutcome {
    pub width: u32,
    pub height: u32,
    pub faces: Vec<BoundingBox>,
    /// Base64 PNG with every face outlined, when requested.
    pub annotated: Option<String>,
}

/// Embeddings of the most confident face in each of two images.
pub struct ComparePair {
    pub first: Embedding,
    pub second: Embedding,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Detect {
        path: PathBuf,
        annotate: bool,
        reply: oneshot::Sender<Result<DetectOutcome, EngineError>>,
    },
    Compare {
        first: PathBuf,
        second: PathBuf,
        reply: oneshot::Sender<Result<ComparePair, EngineError>>,
    },
    Analyze {
        path: PathBuf,
        enforce_detection: bool,
        reply: oneshot::Sender<Result<Vec<FaceAttributes>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    status: ModelStatus,
}

impl EngineHandle {
    /// Models loaded by the backend at spawn time.
    pub fn status(&self) -> ModelStatus {
        self.status
    }

    /// Decode the image at `path` and locate every face in it.
    pub async fn detect(
        &self,
        path: PathBuf,
        annotate: bool,
    ) -> Result<DetectOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Detect {
            path,
            annotate,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Embed the best face of both images.
    pub async fn compare(
        &self,
        first: PathBuf,
        second: PathBuf,
    ) -> Result<ComparePair, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Compare {
            first,
            second,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Estimate age, gender and emotion for every face in the image.
    pub async fn analyze(
        &self,
        path: PathBuf,
        enforce_detection: bool,
    ) -> Result<Vec<FaceAttributes>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Analyze {
            path,
            enforce_detection,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The backend's models are not `Sync`, so one thread owns them and
/// serves requests in arrival order. The thread exits once every
/// [`EngineHandle`] is dropped.
pub fn spawn_engine<B>(mut backend: B) -> Result<EngineHandle, EngineError>
where
    B: FaceBackend + Send + 'static,
{
    let status = backend.status();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("faceapi-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect {
                        path,
                        annotate,
                        reply,
                    } => {
                        let _ = reply.send(run_detect(&mut backend, path, annotate));
                    }
                    EngineRequest::Compare {
                        first,
                        second,
                        reply,
                    } => {
                        let _ = reply.send(run_compare(&mut backend, first, second));
                    }
                    EngineRequest::Analyze {
                        path,
                        enforce_detection,
                        reply,
                    } => {
                        let result = Frame::open(&path)
                            .map_err(EngineError::from)
                            .and_then(|frame| Ok(backend.analyze(&frame, enforce_detection)?));
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, status })
}

fn run_detect<B: FaceBackend>(
    backend: &mut B,
    path: PathBuf,
    outline: bool,
) -> Result<DetectOutcome, EngineError> {
    let frame = Frame::open(&path)?;
    let faces = backend.detect(&frame)?;
    tracing::debug!(
        path = %path.display(),
        width = frame.width,
        height = frame.height,
        faces = faces.len(),
        "detect"
    );

    let annotated = if outline {
        Some(annotate::annotated_png_base64(&frame, &faces)?)
    } else {
        None
    };

    Ok(DetectOutcome {
        width: frame.width,
        height: frame.height,
        faces,
        annotated,
    })
}

/// Both images are decoded before either is run through the models, so a
/// corrupt second image fails fast.
fn run_compare<B: FaceBackend>(
    backend: &mut B,
    first: PathBuf,
    second: PathBuf,
) -> Result<ComparePair, EngineError> {
    let frame_a = Frame::open(&first)?;
    let frame_b = Frame::open(&second)?;

    let (face_a, first) = backend.embed_first(&frame_a)?;
    let (face_b, second) = backend.embed_first(&frame_b)?;
    tracing::debug!(
        confidence_a = face_a.confidence,
        confidence_b = face_b.confidence,
        "compare: embeddings extracted"
    );

    Ok(ComparePair { first, second })
}
