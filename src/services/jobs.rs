use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::get_config;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Failed,
    Done,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Failed | JobState::Done)
    }
}

#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

/// In-memory progress record for one long-running conversion. Never persisted.
#[derive(Clone)]
pub struct JobRecord {
    pub state: JobState,
    pub percent: u8,
    pub step: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<JobError>,
    pub cancel: Arc<AtomicBool>,
    revision: u64,
    terminal_at: Option<Instant>,
}

/// Registry of conversion jobs, keyed by UUID. Terminal records are kept for
/// a TTL so late pollers still see the outcome, then garbage-collected.
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
    ttl: Duration,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(get_config().job_ttl_secs),
        }
    }

    #[cfg(test)]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn create(&self) -> Uuid {
        let job_id = Uuid::new_v4();
        let record = JobRecord {
            state: JobState::Queued,
            percent: 0,
            step: "queued".to_string(),
            result: None,
            error: None,
            cancel: Arc::new(AtomicBool::new(false)),
            revision: 0,
            terminal_at: None,
        };
        self.jobs.write().await.insert(job_id, record);
        job_id
    }

    pub async fn get(&self, job_id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    pub async fn cancel_flag(&self, job_id: Uuid) -> Option<Arc<AtomicBool>> {
        self.jobs.read().await.get(&job_id).map(|r| r.cancel.clone())
    }

    /// Progress update. Percent never moves backwards; a terminal record is
    /// left untouched.
    pub async fn update_progress(&self, job_id: Uuid, percent: u8, step: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(record) = jobs.get_mut(&job_id) {
            if record.state.is_terminal() {
                return;
            }
            record.state = JobState::Running;
            record.percent = record.percent.max(percent.min(100));
            record.step = step.to_string();
            record.revision += 1;
        }
    }

    pub async fn complete(&self, job_id: Uuid, result: serde_json::Value) {
        let mut jobs = self.jobs.write().await;
        if let Some(record) = jobs.get_mut(&job_id) {
            if record.state.is_terminal() {
                return;
            }
            record.state = JobState::Done;
            record.percent = 100;
            record.step = "done".to_string();
            record.result = Some(result);
            record.revision += 1;
            record.terminal_at = Some(Instant::now());
        }
    }

    pub async fn fail(&self, job_id: Uuid, code: &str, message: String) {
        let mut jobs = self.jobs.write().await;
        if let Some(record) = jobs.get_mut(&job_id) {
            if record.state.is_terminal() {
                return;
            }
            record.state = JobState::Failed;
            record.step = "failed".to_string();
            record.error = Some(JobError {
                code: code.to_string(),
                message,
            });
            record.revision += 1;
            record.terminal_at = Some(Instant::now());
        }
    }

    /// Requests cancellation. The worker observes the flag between pyramid
    /// levels and transitions the job itself.
    pub async fn request_cancel(&self, job_id: Uuid) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(&job_id) {
            Some(record) if !record.state.is_terminal() => {
                record.cancel.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    pub async fn remove(&self, job_id: Uuid) -> bool {
        self.jobs.write().await.remove(&job_id).is_some()
    }

    /// Long-poll: returns as soon as the record changes (or goes terminal),
    /// never blocking past the deadline.
    pub async fn wait_for_change(&self, job_id: Uuid, deadline: Duration) -> Option<JobRecord> {
        let start = Instant::now();
        let initial = self.get(job_id).await?;
        if initial.state.is_terminal() {
            return Some(initial);
        }

        loop {
            sleep(Duration::from_millis(250)).await;
            let current = self.get(job_id).await?;
            if current.revision != initial.revision
                || current.state.is_terminal()
                || start.elapsed() >= deadline
            {
                return Some(current);
            }
        }
    }

    pub async fn gc(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        let ttl = self.ttl;
        jobs.retain(|_, record| match record.terminal_at {
            Some(at) => at.elapsed() < ttl,
            None => true,
        });
        before - jobs.len()
    }

    /// Periodic GC loop, spawned at startup.
    pub async fn run_gc_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = self.gc().await;
            if removed > 0 {
                println!("Jobs | GC | removed {} expired job records", removed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> JobRegistry {
        JobRegistry::with_ttl(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn percent_is_monotone() {
        let reg = registry();
        let id = reg.create().await;
        reg.update_progress(id, 40, "tiling z=3").await;
        reg.update_progress(id, 20, "tiling z=4").await;
        let record = reg.get(id).await.unwrap();
        assert_eq!(record.percent, 40);
        assert_eq!(record.step, "tiling z=4");
    }

    #[tokio::test]
    async fn terminal_states_are_sticky() {
        let reg = registry();
        let id = reg.create().await;
        reg.complete(id, serde_json::json!({"mbtiles_filename": "a.mbtiles"}))
            .await;
        reg.update_progress(id, 10, "late").await;
        reg.fail(id, "cancelled", "late failure".to_string()).await;

        let record = reg.get(id).await.unwrap();
        assert_eq!(record.state, JobState::Done);
        assert_eq!(record.percent, 100);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn cancel_only_applies_to_live_jobs() {
        let reg = registry();
        let id = reg.create().await;
        assert!(reg.request_cancel(id).await);
        assert!(reg.cancel_flag(id).await.unwrap().load(Ordering::SeqCst));

        reg.fail(id, "cancelled", "worker stopped".to_string()).await;
        assert!(!reg.request_cancel(id).await);
    }

    #[tokio::test]
    async fn gc_reaps_only_expired_terminal_jobs() {
        let reg = JobRegistry::with_ttl(Duration::from_millis(0));
        let done = reg.create().await;
        let live = reg.create().await;
        reg.complete(done, serde_json::json!({})).await;
        reg.update_progress(live, 5, "probing").await;

        assert_eq!(reg.gc().await, 1);
        assert!(reg.get(done).await.is_none());
        assert!(reg.get(live).await.is_some());
    }

    #[tokio::test]
    async fn wait_for_change_honors_deadline() {
        let reg = registry();
        let id = reg.create().await;
        let start = Instant::now();
        let record = reg
            .wait_for_change(id, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(record.state, JobState::Queued);
    }
}
