use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use crate::backend::BackendClient;
use crate::config::Config;
use crate::provider::ProviderClient;
use super::errors::{Result, UploadError};
use super::finalizer::Finalizer;
use super::store::UploadRegistry;
use super::traits::{ContentCatalog, SignatureBroker, StorageTransport};
use super::types::{JobDescriptor, TransferConfig, UploadEvent, UploadId, UploadOutcome, UploadRequest};
use super::validation::validate_request;
use super::worker::UploadWorker;

/// 上传管理器 - validates requests and runs one task per job
pub struct UploadManager {
    registry: Arc<UploadRegistry>,
    broker: Arc<dyn SignatureBroker>,
    transport: Arc<dyn StorageTransport>,
    finalizer: Finalizer,
    config: Arc<TransferConfig>,
}

impl UploadManager {
    pub fn new(
        broker: Arc<dyn SignatureBroker>,
        transport: Arc<dyn StorageTransport>,
        catalog: Arc<dyn ContentCatalog>,
        config: TransferConfig,
    ) -> Self {
        Self {
            registry: Arc::new(UploadRegistry::new()),
            broker,
            transport,
            finalizer: Finalizer::new(catalog),
            config: Arc::new(config),
        }
    }

    /// Wires the HTTP backend and provider clients described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = Arc::new(BackendClient::from_config(config)?);
        let provider = Arc::new(ProviderClient::from_config(config)?);

        Ok(Self::new(
            Arc::clone(&backend) as Arc<dyn SignatureBroker>,
            provider,
            backend,
            config.transfer_config(),
        ))
    }

    pub fn registry(&self) -> &Arc<UploadRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.registry.subscribe()
    }

    /// 订阅过滤后的事件
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F>
    where
        F: Fn(&UploadEvent) -> bool,
    {
        FilteredEventReceiver {
            receiver: self.registry.subscribe(),
            filter,
        }
    }

    /// Validates the request, creates a `pending` job and starts it.
    ///
    /// Validation failures are returned here and never create a job.
    pub async fn submit(&self, request: UploadRequest) -> Result<JobHandle> {
        validate_request(&request, &self.config).await?;

        let reporter = self.registry.register(JobDescriptor::from(&request));
        let upload_id = reporter.id();
        let cancel = CancellationToken::new();

        let worker = UploadWorker {
            broker: Arc::clone(&self.broker),
            transport: Arc::clone(&self.transport),
            finalizer: self.finalizer.clone(),
            config: Arc::clone(&self.config),
            cancellation_token: cancel.clone(),
        };

        debug!(upload_id = %upload_id, file = %request.asset.display_name, "upload submitted");
        let join = tokio::spawn(worker.run(request, reporter));

        Ok(JobHandle {
            id: upload_id,
            cancel,
            join,
        })
    }

    /// Submits and waits for the outcome
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome> {
        self.submit(request).await?.wait().await
    }

    pub fn clear_terminal(&self) -> usize {
        self.registry.clear_terminal()
    }
}

/// Handle to a running job
#[derive(Debug)]
pub struct JobHandle {
    id: UploadId,
    cancel: CancellationToken,
    join: JoinHandle<Result<UploadOutcome>>,
}

impl JobHandle {
    pub fn id(&self) -> UploadId {
        self.id
    }

    /// Requests cancellation; the job ends `failed` with a cancelled error
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<UploadOutcome> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => Err(UploadError::internal(format!("upload task failed: {}", err))),
        }
    }
}

/// 过滤的事件接收器
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<UploadEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&UploadEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<UploadEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}
