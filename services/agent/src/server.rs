//! gRPC surface of the node agent.
//!
//! Every call runs on the owning node and mutates only local runtime state.
//! `ExportImage` bridges the store's writer-style export into the pull-style
//! stream gRPC expects: a background producer writes into an in-memory pipe
//! and the handler frames the read end into 32 KiB chunks.

use std::sync::Arc;
use std::time::Duration;

use salvor_proto::agent::v1::{
    DataChunk, ExportImageRequest, ImportFromRequest, ImportFromResponse, ListImagesRequest,
    ListImagesResponse, PrepareExportRequest, PrepareExportResponse, PushImageRequest,
    PushImageResponse, RemoveImageRequest, RemoveImageResponse, ResolveTagRequest,
    ResolveTagResponse, SalvorAgent, SalvorAgentClient,
};
use salvor_session::Store as SessionStore;
use salvor_tls::TlsMaterial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::metrics::AgentMetrics;
use crate::push;
use crate::store::{ImageStore, StoreError};

/// Frame size for export streams.
pub const EXPORT_CHUNK_SIZE: usize = 32 * 1024;

/// Pipe capacity between the export producer and the stream framer.
const PIPE_CAPACITY: usize = 64 * 1024;

/// TTL for sessions adopted via `PrepareExport`. This is a local ceiling;
/// the controller enforces its own TTL independently.
const ADOPTED_SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// The agent gRPC service.
pub struct AgentService {
    store: Arc<dyn ImageStore>,
    sessions: Arc<SessionStore>,
    metrics: Arc<AgentMetrics>,
    /// Client-side mTLS material for dialing peer agents.
    tls: Option<TlsMaterial>,
}

impl AgentService {
    pub fn new(
        store: Arc<dyn ImageStore>,
        sessions: Arc<SessionStore>,
        metrics: Arc<AgentMetrics>,
        tls: Option<TlsMaterial>,
    ) -> Self {
        Self {
            store,
            sessions,
            metrics,
            tls,
        }
    }

    async fn pull_and_import(&self, req: &ImportFromRequest) -> Result<(), String> {
        let channel = salvor_tls::dial(&req.source_endpoint, self.tls.as_ref())
            .await
            .map_err(|e| format!("connecting to source: {e}"))?;
        let mut source = SalvorAgentClient::new(channel);

        let mut stream = source
            .export_image(ExportImageRequest {
                session_token: req.session_token.clone(),
            })
            .await
            .map_err(|e| format!("starting export stream: {e}"))?
            .into_inner();

        let (mut writer, mut reader) = tokio::io::duplex(PIPE_CAPACITY);

        let pump = tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(chunk)) => {
                        if let Err(e) = writer.write_all(&chunk.data).await {
                            return Err(format!("writing to pipe: {e}"));
                        }
                    }
                    Ok(None) => {
                        let _ = writer.shutdown().await;
                        return Ok(());
                    }
                    Err(e) => return Err(format!("receiving chunk: {e}")),
                }
            }
        });

        let imported = self
            .store
            .import(&mut reader)
            .await
            .map_err(|e| format!("importing image: {e}"))?;

        match pump.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(format!("stream error: {e}")),
            Err(e) => return Err(format!("stream task: {e}")),
        }

        // The runtime may repack the archive and report a different top-level
        // digest; fall back to checking the requested digest directly.
        if imported != req.digest {
            match self.store.has(&req.digest).await {
                Ok(true) => {}
                _ => {
                    return Err(format!(
                        "imported digest {imported} does not match requested {}",
                        req.digest
                    ));
                }
            }
        }

        Ok(())
    }
}

#[tonic::async_trait]
impl SalvorAgent for AgentService {
    async fn prepare_export(
        &self,
        request: Request<PrepareExportRequest>,
    ) -> Result<Response<PrepareExportResponse>, Status> {
        let req = request.into_inner();
        if req.session_token.is_empty() || req.digest.is_empty() {
            return Err(Status::invalid_argument(
                "session_token and digest are required",
            ));
        }

        let has = self
            .store
            .has(&req.digest)
            .await
            .map_err(|e| Status::internal(format!("checking image: {e}")))?;
        if !has {
            return Err(Status::not_found(format!(
                "image {} not found locally",
                req.digest
            )));
        }

        let size_bytes = self
            .store
            .size(&req.digest)
            .await
            .map_err(|e| Status::internal(format!("getting image size: {e}")))?;

        // Adopt the controller-minted token so ExportImage can look up the
        // digest. Registration only happens after seeing this call, which
        // binds the authorisation to the initiating controller.
        self.sessions
            .register(&req.session_token, &req.digest, ADOPTED_SESSION_TTL);

        debug!(digest = %req.digest, size_bytes, "Prepared export");
        Ok(Response::new(PrepareExportResponse { size_bytes }))
    }

    type ExportImageStream = ReceiverStream<Result<DataChunk, Status>>;

    async fn export_image(
        &self,
        request: Request<ExportImageRequest>,
    ) -> Result<Response<Self::ExportImageStream>, Status> {
        let req = request.into_inner();
        if req.session_token.is_empty() {
            return Err(Status::invalid_argument("session_token is required"));
        }

        let Some(session) = self.sessions.validate(&req.session_token) else {
            return Err(Status::permission_denied("invalid or expired session token"));
        };

        let (mut writer, mut reader) = tokio::io::duplex(PIPE_CAPACITY);
        let store = Arc::clone(&self.store);
        let digest = session.digest.clone();
        let producer = tokio::spawn(async move {
            let result = store.export(&digest, &mut writer).await;
            let _ = writer.shutdown().await;
            result
        });

        let (tx, rx) = mpsc::channel::<Result<DataChunk, Status>>(16);
        let metrics = Arc::clone(&self.metrics);
        let digest = session.digest.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; EXPORT_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = DataChunk {
                            data: buf[..n].to_vec(),
                        };
                        if tx.send(Ok(chunk)).await.is_err() {
                            // Receiver gone; dropping the reader unblocks the
                            // producer, which then fails its next write.
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(Status::internal(format!("reading export: {e}"))))
                            .await;
                        return;
                    }
                }
            }
            match producer.await {
                Ok(Ok(())) => {
                    metrics.exports_total.inc();
                    info!(digest = %digest, "Export stream complete");
                }
                Ok(Err(e)) => {
                    metrics.export_failures_total.inc();
                    let _ = tx.send(Err(status_for_store_error(&e, "export"))).await;
                }
                Err(e) => {
                    metrics.export_failures_total.inc();
                    let _ = tx
                        .send(Err(Status::internal(format!("export task: {e}"))))
                        .await;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn import_from(
        &self,
        request: Request<ImportFromRequest>,
    ) -> Result<Response<ImportFromResponse>, Status> {
        let req = request.into_inner();
        if req.session_token.is_empty() || req.digest.is_empty() || req.source_endpoint.is_empty() {
            return Ok(Response::new(ImportFromResponse {
                success: false,
                error: "session_token, digest, and source_endpoint are required".to_string(),
            }));
        }

        match self.pull_and_import(&req).await {
            Ok(()) => {
                self.metrics.imports_total.inc();
                info!(digest = %req.digest, source = %req.source_endpoint, "Imported image from peer");
                Ok(Response::new(ImportFromResponse {
                    success: true,
                    error: String::new(),
                }))
            }
            Err(error) => {
                self.metrics.import_failures_total.inc();
                warn!(digest = %req.digest, source = %req.source_endpoint, error = %error, "Import failed");
                Ok(Response::new(ImportFromResponse {
                    success: false,
                    error,
                }))
            }
        }
    }

    async fn list_images(
        &self,
        _request: Request<ListImagesRequest>,
    ) -> Result<Response<ListImagesResponse>, Status> {
        let digests = self
            .store
            .list()
            .await
            .map_err(|e| Status::internal(format!("listing images: {e}")))?;
        Ok(Response::new(ListImagesResponse { digests }))
    }

    async fn resolve_tag(
        &self,
        request: Request<ResolveTagRequest>,
    ) -> Result<Response<ResolveTagResponse>, Status> {
        let req = request.into_inner();
        if req.image_ref.is_empty() {
            return Err(Status::invalid_argument("image_ref is required"));
        }
        let digest = self
            .store
            .resolve_tag(&req.image_ref)
            .await
            .map_err(|e| Status::internal(format!("resolving tag: {e}")))?;
        Ok(Response::new(ResolveTagResponse { digest }))
    }

    async fn remove_image(
        &self,
        request: Request<RemoveImageRequest>,
    ) -> Result<Response<RemoveImageResponse>, Status> {
        let req = request.into_inner();
        if req.image_ref.is_empty() {
            return Err(Status::invalid_argument("image_ref is required"));
        }
        match self.store.remove(&req.image_ref).await {
            Ok(()) => {
                info!(image = %req.image_ref, "Removed image record");
                Ok(Response::new(RemoveImageResponse {}))
            }
            Err(StoreError::NotFound(_)) => Err(Status::not_found(format!(
                "image {} not found",
                req.image_ref
            ))),
            Err(e) => Err(Status::internal(format!("removing image: {e}"))),
        }
    }

    async fn push_image(
        &self,
        request: Request<PushImageRequest>,
    ) -> Result<Response<PushImageResponse>, Status> {
        let req = request.into_inner();
        if req.digest.is_empty() || req.target_ref.is_empty() {
            return Ok(Response::new(PushImageResponse {
                success: false,
                error: "digest and target_ref are required".to_string(),
            }));
        }

        let result = self.export_and_push(&req).await;
        match result {
            Ok(()) => {
                self.metrics.pushes_total.inc();
                info!(digest = %req.digest, target = %req.target_ref, "Pushed image to registry");
                Ok(Response::new(PushImageResponse {
                    success: true,
                    error: String::new(),
                }))
            }
            Err(error) => {
                self.metrics.push_failures_total.inc();
                warn!(digest = %req.digest, target = %req.target_ref, error = %error, "Push failed");
                Ok(Response::new(PushImageResponse {
                    success: false,
                    error,
                }))
            }
        }
    }
}

impl AgentService {
    async fn export_and_push(&self, req: &PushImageRequest) -> Result<(), String> {
        let has = self
            .store
            .has(&req.digest)
            .await
            .map_err(|e| format!("checking image: {e}"))?;
        if !has {
            return Err(format!("image {} not found locally", req.digest));
        }

        let scratch = tempfile::tempdir().map_err(|e| format!("scratch dir: {e}"))?;
        let archive_path = scratch.path().join("export.tar");
        let mut spool = tokio::fs::File::create(&archive_path)
            .await
            .map_err(|e| format!("creating spool: {e}"))?;
        self.store
            .export(&req.digest, &mut spool)
            .await
            .map_err(|e| format!("exporting image {}: {e}", req.digest))?;
        spool.flush().await.map_err(|e| format!("spool: {e}"))?;
        drop(spool);

        let auth = if req.registry_username.is_empty() {
            None
        } else {
            Some((req.registry_username.clone(), req.registry_password.clone()))
        };
        push::push_archive(&archive_path, &req.target_ref, auth, req.insecure)
            .await
            .map_err(|e| format!("push failed: {e}"))
    }
}

fn status_for_store_error(err: &StoreError, context: &str) -> Status {
    match err {
        StoreError::NotFound(what) => Status::not_found(format!("{context}: {what} not found")),
        StoreError::BlobMissing { digest } => {
            Status::failed_precondition(format!("{context}: content {digest} missing"))
        }
        other => Status::internal(format!("{context}: {other}")),
    }
}
