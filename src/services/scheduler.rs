//! Cron-driven background jobs.
//!
//! Expressions use the six-field form with seconds (`sec min hour dom month dow`).
//! Each job runs on its own task; a failing run is logged and the job stays
//! scheduled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;
    fn schedule(&self) -> &str;
    async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid schedule '{expression}' for job {job}: {reason}")]
    InvalidSchedule {
        job: String,
        expression: String,
        reason: String,
    },
    #[error("job {0} is already registered")]
    Duplicate(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatus {
    pub is_active: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub runs: u64,
}

struct Registered {
    job: Arc<dyn Job>,
    schedule: Schedule,
}

pub struct JobScheduler {
    jobs: RwLock<Vec<Registered>>,
    status: Arc<RwLock<HashMap<String, JobStatus>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: RwLock::new(Vec::new()),
            status: Arc::new(RwLock::new(HashMap::new())),
            handles: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    pub async fn register_job(&self, job: Box<dyn Job>) -> Result<(), SchedulerError> {
        let name = job.name().to_string();
        let schedule = Schedule::from_str(job.schedule()).map_err(|e| SchedulerError::InvalidSchedule {
            job: name.clone(),
            expression: job.schedule().to_string(),
            reason: e.to_string(),
        })?;

        let mut status = self.status.write().await;
        if status.contains_key(&name) {
            return Err(SchedulerError::Duplicate(name));
        }
        status.insert(name.clone(), JobStatus::default());
        self.jobs.write().await.push(Registered {
            job: Arc::from(job),
            schedule,
        });
        tracing::info!(job = %name, "Registered scheduled job");
        Ok(())
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.shutdown.send_replace(false);
        let mut handles = self.handles.lock().await;
        for registered in self.jobs.read().await.iter() {
            let job = registered.job.clone();
            let schedule = registered.schedule.clone();
            let status = self.status.clone();
            let mut shutdown = self.shutdown.subscribe();

            if let Some(entry) = status.write().await.get_mut(job.name()) {
                entry.is_active = true;
                entry.next_run = schedule.upcoming(Utc).next();
            }

            handles.push(tokio::spawn(async move {
                run_job(job, schedule, status, &mut shutdown).await;
            }));
        }
        tracing::info!(jobs = handles.len(), "Job scheduler started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), SchedulerError> {
        self.shutdown.send_replace(true);
        for handle in self.handles.lock().await.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        for entry in self.status.write().await.values_mut() {
            entry.is_active = false;
            entry.next_run = None;
        }
        tracing::info!("Job scheduler stopped");
        Ok(())
    }

    pub async fn get_job_status(&self) -> HashMap<String, JobStatus> {
        self.status.read().await.clone()
    }
}

async fn run_job(
    job: Arc<dyn Job>,
    schedule: Schedule,
    status: Arc<RwLock<HashMap<String, JobStatus>>>,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            tracing::warn!(job = job.name(), "Schedule has no upcoming runs");
            return;
        };
        if let Some(entry) = status.write().await.get_mut(job.name()) {
            entry.next_run = Some(next);
        }

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }

        let result = job.execute().await;
        let mut guard = status.write().await;
        let entry = guard.entry(job.name().to_string()).or_default();
        entry.last_run = Some(Utc::now());
        entry.runs += 1;
        match result {
            Ok(()) => {
                entry.last_error = None;
                tracing::debug!(job = job.name(), "Scheduled job finished");
            }
            Err(e) => {
                entry.last_error = Some(e.to_string());
                tracing::error!(job = job.name(), error = %e, "Scheduled job failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PromotionStatus;
    use crate::ports::PromotionRepository;
    use crate::services::promotions::{CreatePromotion, PromotionExpiryJob};
    use crate::services::testing::harness;
    use crate::services::Clock;
    use uuid::Uuid;

    struct Noop(&'static str);

    #[async_trait]
    impl Job for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn schedule(&self) -> &str {
            self.0
        }

        async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let scheduler = JobScheduler::new();
        scheduler.register_job(Box::new(Noop("0 * * * * *"))).await.unwrap();
        assert!(matches!(
            scheduler.register_job(Box::new(Noop("0 * * * * *"))).await,
            Err(SchedulerError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_five_field_expression_rejected() {
        let scheduler = JobScheduler::new();
        assert!(matches!(
            scheduler.register_job(Box::new(Noop("* * * *"))).await,
            Err(SchedulerError::InvalidSchedule { .. })
        ));
    }

    #[tokio::test]
    async fn test_expiry_job_expires_each_promotion_once_across_ticks() {
        let h = harness();
        let creator = Uuid::new_v4();
        let property = h.listed_property(Uuid::new_v4(), 5_000_000).await;
        let start = h.clock.now();
        let mut created = Vec::new();
        for minutes in [30, 90] {
            let promo = h
                .services
                .promotions
                .create(
                    creator,
                    CreatePromotion {
                        property_id: property.id,
                        expires_at: Some(start + chrono::Duration::minutes(minutes)),
                    },
                )
                .await
                .unwrap();
            created.push(promo.id);
        }
        let (early, late) = (created[0], created[1]);

        let scheduler = JobScheduler::new();
        scheduler
            .register_job(Box::new(PromotionExpiryJob::new(
                h.services.promotions.clone(),
                "* * * * * *".to_string(),
            )))
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::minutes(60));
        let first_due = h.clock.now();
        scheduler.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;

        let stored = h.store.find_promotion(early).await.unwrap().unwrap();
        assert_eq!(stored.status, PromotionStatus::Expired);
        assert_eq!(stored.updated_at, first_due);
        let stored = h.store.find_promotion(late).await.unwrap().unwrap();
        assert_eq!(stored.status, PromotionStatus::Active);

        h.clock.advance(chrono::Duration::minutes(60));
        let second_due = h.clock.now();
        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        scheduler.stop().await.unwrap();

        // Later ticks must not touch the promotion expired earlier.
        let stored = h.store.find_promotion(early).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, first_due);
        let stored = h.store.find_promotion(late).await.unwrap().unwrap();
        assert_eq!(stored.status, PromotionStatus::Expired);
        assert_eq!(stored.updated_at, second_due);
        assert_eq!(h.services.promotions.expire_due().await.unwrap(), 0);

        let status = scheduler.get_job_status().await;
        let job = &status["promotion_expiry"];
        assert!(job.runs >= 3, "expected several ticks, got {}", job.runs);
        assert!(job.last_error.is_none());
        assert!(!job.is_active);
    }
}
