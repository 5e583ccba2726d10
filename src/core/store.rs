use std::collections::HashMap;
use std::sync::Arc;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use super::errors::{RegistryError, Result, UploadError};
use super::progress::{JobProgress, ProgressSink};
use super::types::{
    JobDescriptor, MediaUploadResult, UploadEvent, UploadId, UploadJob, UploadOutcome, UploadState,
};

const EVENT_CAPACITY: usize = 256;

/// Highest percentage a job can show before it is marked completed
pub const MAX_IN_FLIGHT_PCT: u8 = 99;

/// Explicit state store for upload jobs.
///
/// Every mutation goes through here and is mirrored as an [`UploadEvent`]
/// on the broadcast channel. Events are sent after the lock is released.
pub struct UploadRegistry {
    jobs: RwLock<HashMap<UploadId, UploadJob>>,
    event_tx: broadcast::Sender<UploadEvent>,
}

impl Default for UploadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::with_event_capacity(EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            jobs: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    /// Creates a `pending` job
    pub fn add_job(&self, descriptor: JobDescriptor) -> UploadId {
        let upload_id = UploadId::new();
        let job = UploadJob {
            id: upload_id,
            source_asset: descriptor.source_asset,
            resource_type: descriptor.resource_type,
            title: descriptor.title,
            status: UploadState::Pending,
            progress_pct: 0,
            bytes_sent: 0,
            error: None,
            error_kind: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.jobs.write().insert(upload_id, job);
        self.emit(vec![UploadEvent::Added { upload_id }]);

        upload_id
    }

    /// Creates a job and hands out its only writer
    pub fn register(self: &Arc<Self>, descriptor: JobDescriptor) -> JobReporter {
        let upload_id = self.add_job(descriptor);

        JobReporter {
            upload_id,
            registry: Arc::clone(self),
        }
    }

    pub fn mark_uploading(&self, upload_id: UploadId) -> Result<(), RegistryError> {
        let events = self.with_job(upload_id, |job| {
            let mut events = Vec::new();
            transition(job, UploadState::Uploading, &mut events)?;
            Ok(events)
        })?;

        self.emit(events);
        Ok(())
    }

    /// Records progress for an in-flight job.
    ///
    /// A `pending` job is promoted to `uploading`. The percentage is clamped to
    /// [`MAX_IN_FLIGHT_PCT`] and values below the current ones are ignored.
    pub fn update_progress(&self, upload_id: UploadId, pct: u8, bytes_sent: u64) -> Result<(), RegistryError> {
        let events = self.with_job(upload_id, |job| {
            let mut events = Vec::new();

            if job.status == UploadState::Pending {
                transition(job, UploadState::Uploading, &mut events)?;
            } else if job.status != UploadState::Uploading {
                return Err(RegistryError::InvalidTransition {
                    upload_id,
                    from: job.status,
                    to: UploadState::Uploading,
                });
            }

            let pct = pct.min(MAX_IN_FLIGHT_PCT).max(job.progress_pct);
            let bytes_sent = bytes_sent.max(job.bytes_sent);

            if pct != job.progress_pct || bytes_sent != job.bytes_sent {
                job.progress_pct = pct;
                job.bytes_sent = bytes_sent;
                events.push(UploadEvent::Progress {
                    upload_id,
                    percentage: pct,
                    bytes_sent,
                });
            }

            Ok(events)
        })?;

        self.emit(events);
        Ok(())
    }

    pub fn mark_completed(&self, upload_id: UploadId, result: MediaUploadResult) -> Result<(), RegistryError> {
        let events = self.with_job(upload_id, |job| {
            let mut events = Vec::new();
            transition(job, UploadState::Completed, &mut events)?;

            job.progress_pct = 100;
            job.bytes_sent = job.source_asset.size_bytes;
            job.result = Some(result.clone());

            events.push(UploadEvent::Progress {
                upload_id,
                percentage: 100,
                bytes_sent: job.bytes_sent,
            });
            events.push(UploadEvent::Completed { upload_id, result });

            Ok(events)
        })?;

        self.emit(events);
        Ok(())
    }

    pub fn mark_failed(&self, upload_id: UploadId, error: &UploadError) -> Result<(), RegistryError> {
        let events = self.with_job(upload_id, |job| {
            let mut events = Vec::new();
            transition(job, UploadState::Failed, &mut events)?;

            job.error = Some(error.to_string());
            job.error_kind = Some(error.kind());

            events.push(UploadEvent::Failed {
                upload_id,
                kind: error.kind(),
                error: error.to_string(),
            });

            Ok(events)
        })?;

        self.emit(events);
        Ok(())
    }

    /// Drops every `completed` / `failed` job and returns how many were removed
    pub fn clear_terminal(&self) -> usize {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, job| !job.status.is_terminal());

        let removed = before - jobs.len();
        debug!(removed, "cleared terminal uploads");
        removed
    }

    pub fn get(&self, upload_id: UploadId) -> Option<UploadJob> {
        self.jobs.read().get(&upload_id).cloned()
    }

    pub fn list(&self) -> Vec<UploadJob> {
        let mut jobs: Vec<_> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Jobs that are `pending` or `uploading`
    pub fn active_count(&self) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|job| !job.status.is_terminal())
            .count()
    }

    fn with_job<F>(&self, upload_id: UploadId, f: F) -> Result<Vec<UploadEvent>, RegistryError>
    where
        F: FnOnce(&mut UploadJob) -> Result<Vec<UploadEvent>, RegistryError>,
    {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&upload_id)
            .ok_or(RegistryError::NotFound(upload_id))?;

        f(job)
    }

    fn emit(&self, events: Vec<UploadEvent>) {
        for event in events {
            // 没有订阅者时发送失败是正常的
            let _ = self.event_tx.send(event);
        }
    }
}

fn transition(job: &mut UploadJob, next: UploadState, events: &mut Vec<UploadEvent>) -> Result<(), RegistryError> {
    let current = job.status;
    if !current.can_transition_to(next) {
        return Err(RegistryError::InvalidTransition {
            upload_id: job.id,
            from: current,
            to: next,
        });
    }

    job.status = next;
    match next {
        UploadState::Uploading => job.started_at = Some(Utc::now()),
        UploadState::Completed | UploadState::Failed => job.completed_at = Some(Utc::now()),
        UploadState::Pending => {}
    }

    events.push(UploadEvent::StateChanged {
        upload_id: job.id,
        old_state: current,
        new_state: next,
    });

    Ok(())
}

/// The single writer of one job's registry entry.
///
/// Not `Clone`; the pipeline task owns it until [`JobReporter::finish`].
pub struct JobReporter {
    upload_id: UploadId,
    registry: Arc<UploadRegistry>,
}

impl JobReporter {
    pub fn id(&self) -> UploadId {
        self.upload_id
    }

    pub fn mark_uploading(&self) -> Result<(), RegistryError> {
        self.registry.mark_uploading(self.upload_id)
    }

    pub fn progress(&self, progress: JobProgress) {
        if let Err(err) = self
            .registry
            .update_progress(self.upload_id, progress.percentage, progress.bytes_sent)
        {
            debug!(upload_id = %self.upload_id, error = %err, "progress update ignored");
        }
    }

    /// Progress sink bound to this job, for the transfer callbacks
    pub fn progress_sink(&self) -> ProgressSink {
        let registry = Arc::clone(&self.registry);
        let upload_id = self.upload_id;

        Arc::new(move |progress: JobProgress| {
            if let Err(err) = registry.update_progress(upload_id, progress.percentage, progress.bytes_sent) {
                debug!(upload_id = %upload_id, error = %err, "progress update ignored");
            }
        })
    }

    /// Records the terminal state for the job's outcome
    pub fn finish(self, outcome: &Result<UploadOutcome>) {
        let recorded = match outcome {
            Ok(outcome) => self
                .registry
                .mark_completed(self.upload_id, outcome.media.clone()),
            Err(err) => self.registry.mark_failed(self.upload_id, err),
        };

        if let Err(err) = recorded {
            warn!(upload_id = %self.upload_id, error = %err, "failed to record terminal state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::core::types::{ResourceType, SourceAsset};

    fn descriptor(size: u64) -> JobDescriptor {
        JobDescriptor {
            source_asset: SourceAsset::new("/tmp/clip.mp4", size, "video/mp4", "clip.mp4"),
            resource_type: ResourceType::Video,
            title: Some("Clip".into()),
        }
    }

    fn media() -> MediaUploadResult {
        MediaUploadResult {
            remote_id: "r1".into(),
            secure_url: "https://cdn/r1".into(),
        }
    }

    #[test]
    fn test_add_job_starts_pending() {
        let registry = UploadRegistry::new();
        let id = registry.add_job(descriptor(10));

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, UploadState::Pending);
        assert_eq!(job.progress_pct, 0);
        assert_eq!(job.title.as_deref(), Some("Clip"));
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_progress_promotes_pending_and_never_decreases() {
        let registry = UploadRegistry::new();
        let id = registry.add_job(descriptor(100));

        registry.update_progress(id, 40, 40).unwrap();
        assert_eq!(registry.get(id).unwrap().status, UploadState::Uploading);

        registry.update_progress(id, 20, 20).unwrap();
        let job = registry.get(id).unwrap();
        assert_eq!(job.progress_pct, 40);
        assert_eq!(job.bytes_sent, 40);

        registry.update_progress(id, 100, 100).unwrap();
        assert_eq!(registry.get(id).unwrap().progress_pct, MAX_IN_FLIGHT_PCT);
    }

    #[test]
    fn test_completed_sets_full_progress() {
        let registry = UploadRegistry::new();
        let id = registry.add_job(descriptor(100));

        registry.mark_uploading(id).unwrap();
        registry.mark_completed(id, media()).unwrap();

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, UploadState::Completed);
        assert_eq!(job.progress_pct, 100);
        assert_eq!(job.bytes_sent, 100);
        assert_eq!(job.result, Some(media()));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_invalid_transitions_leave_job_unchanged() {
        let registry = UploadRegistry::new();
        let id = registry.add_job(descriptor(10));

        let err = registry.mark_completed(id, media()).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidTransition {
                from: UploadState::Pending,
                to: UploadState::Completed,
                ..
            }
        ));
        assert_eq!(registry.get(id).unwrap().status, UploadState::Pending);

        registry.mark_failed(id, &UploadError::Authorization("denied".into())).unwrap();
        assert!(registry.update_progress(id, 10, 1).is_err());
        assert!(registry.mark_uploading(id).is_err());

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, UploadState::Failed);
        assert_eq!(job.error_kind, Some(ErrorKind::Authorization));
        assert_eq!(job.progress_pct, 0);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = UploadRegistry::new();
        let id = UploadId::new();

        assert_eq!(registry.mark_uploading(id), Err(RegistryError::NotFound(id)));
    }

    #[test]
    fn test_clear_terminal_keeps_live_jobs() {
        let registry = UploadRegistry::new();
        let pending = registry.add_job(descriptor(10));
        let uploading = registry.add_job(descriptor(10));
        let completed = registry.add_job(descriptor(10));
        let failed = registry.add_job(descriptor(10));

        registry.mark_uploading(uploading).unwrap();
        registry.mark_uploading(completed).unwrap();
        registry.mark_completed(completed, media()).unwrap();
        registry.mark_failed(failed, &UploadError::transfer("reset")).unwrap();

        assert_eq!(registry.clear_terminal(), 2);
        assert!(registry.get(pending).is_some());
        assert!(registry.get(uploading).is_some());
        assert!(registry.get(completed).is_none());
        assert!(registry.get(failed).is_none());
        assert_eq!(registry.list().len(), 2);
    }

    #[tokio::test]
    async fn test_mutations_emit_events() {
        let registry = Arc::new(UploadRegistry::new());
        let mut events = registry.subscribe();

        let reporter = registry.register(descriptor(100));
        let id = reporter.id();
        reporter.mark_uploading().unwrap();
        reporter.progress(JobProgress { percentage: 50, bytes_sent: 50 });
        reporter.finish(&Err(UploadError::transfer("reset").at_offset(40)));

        assert!(matches!(events.recv().await.unwrap(), UploadEvent::Added { upload_id } if upload_id == id));
        assert!(matches!(
            events.recv().await.unwrap(),
            UploadEvent::StateChanged { new_state: UploadState::Uploading, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            UploadEvent::Progress { percentage: 50, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            UploadEvent::StateChanged { new_state: UploadState::Failed, .. }
        ));
        match events.recv().await.unwrap() {
            UploadEvent::Failed { kind, error, .. } => {
                assert_eq!(kind, ErrorKind::Transfer);
                assert!(error.contains("offset 40"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
