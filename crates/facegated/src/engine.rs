use facegate_core::{
    DetectedFace, EmbeddingProvider, EnrollmentReport, Gallery, GalleryStore, ImageUpload,
    ProviderError, StoreError,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("gallery: {0}")]
    Store(#[from] StoreError),
    #[error("embedding provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("no faces enrolled; enroll at least one person first")]
    GalleryEmpty,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Faces found in a probe image together with the gallery they are to be
/// matched against.
pub struct Extraction {
    pub faces: Vec<DetectedFace>,
    pub gallery: Arc<Gallery>,
}

/// Messages sent from the service to the engine thread.
enum EngineRequest {
    Load {
        force: bool,
        reply: oneshot::Sender<Result<Arc<Gallery>, EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<Arc<Gallery>, EngineError>>,
    },
    Extract {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Extraction, EngineError>>,
    },
    Enroll {
        name: String,
        uploads: Vec<ImageUpload>,
        reply: oneshot::Sender<Result<EnrollmentReport, EngineError>>,
    },
    Remove {
        name: String,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Load the gallery; `force` rebuilds from source images even if a cache exists.
    pub async fn load(&self, force: bool) -> Result<Arc<Gallery>, EngineError> {
        self.request(|reply| EngineRequest::Load { force, reply }).await
    }

    /// Current gallery, loading it first if needed.
    pub async fn snapshot(&self) -> Result<Arc<Gallery>, EngineError> {
        self.request(|reply| EngineRequest::Snapshot { reply }).await
    }

    /// Detect and embed the faces in a probe image.
    ///
    /// Fails with [`EngineError::GalleryEmpty`] before touching the provider
    /// when nobody is enrolled.
    pub async fn extract(&self, image: Vec<u8>) -> Result<Extraction, EngineError> {
        self.request(|reply| EngineRequest::Extract { image, reply }).await
    }

    pub async fn enroll(
        &self,
        name: String,
        uploads: Vec<ImageUpload>,
    ) -> Result<EnrollmentReport, EngineError> {
        self.request(|reply| EngineRequest::Enroll {
            name,
            uploads,
            reply,
        })
        .await
    }

    pub async fn remove(&self, name: String) -> Result<usize, EngineError> {
        self.request(|reply| EngineRequest::Remove { name, reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the embedding provider and the gallery store. Requests are
/// handled one at a time, so gallery mutations (write images, invalidate
/// cache, reload) never interleave. Readers get an immutable snapshot and
/// never observe a half-rebuilt gallery.
pub fn spawn_engine<P>(mut provider: P, mut store: GalleryStore) -> Result<EngineHandle, EngineError>
where
    P: EmbeddingProvider + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!(provider = provider.name(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&mut provider, &mut store, req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Load the gallery on first use.
fn ensure_loaded(
    provider: &mut dyn EmbeddingProvider,
    store: &mut GalleryStore,
) -> Result<Arc<Gallery>, EngineError> {
    if store.is_loaded() {
        return Ok(store.snapshot());
    }
    Ok(store.load(provider, false)?)
}

fn handle_request<P: EmbeddingProvider>(provider: &mut P, store: &mut GalleryStore, req: EngineRequest) {
    match req {
        EngineRequest::Load { force, reply } => {
            let result = store.load(provider, force).map_err(EngineError::from);
            let _ = reply.send(result);
        }
        EngineRequest::Snapshot { reply } => {
            let _ = reply.send(ensure_loaded(provider, store));
        }
        EngineRequest::Extract { image, reply } => {
            let _ = reply.send(run_extract(provider, store, &image));
        }
        EngineRequest::Enroll {
            name,
            uploads,
            reply,
        } => {
            let result = ensure_loaded(provider, store)
                .and_then(|_| Ok(store.add_entries(provider, &name, &uploads)?));
            let _ = reply.send(result);
        }
        EngineRequest::Remove { name, reply } => {
            let result = ensure_loaded(provider, store)
                .and_then(|_| Ok(store.remove_entries(provider, &name)?));
            let _ = reply.send(result);
        }
    }
}

fn run_extract<P: EmbeddingProvider>(
    provider: &mut P,
    store: &mut GalleryStore,
    image: &[u8],
) -> Result<Extraction, EngineError> {
    let gallery = ensure_loaded(provider, store)?;
    if gallery.is_empty() {
        return Err(EngineError::GalleryEmpty);
    }

    let faces = provider.detect_and_encode(image)?;
    tracing::debug!(faces = faces.len(), "extract: faces detected");
    Ok(Extraction { faces, gallery })
}
