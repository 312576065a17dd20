//! Loaded project data cache
//!
//! Volatile, per user. Entries expire after `cache.project_ttl` seconds.

use moka::future::Cache;
use prometheus::IntGauge;
use std::sync::Arc;
use std::time::Duration;

use super::model::{Parameters, ProjectData};
use crate::config::CacheConfig;
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CACHE_SIZE};

const CACHE_NAME: &str = "projects";

/// GitHub user ID and form path
type ProjectKey = (u64, String);

pub struct ProjectStore {
    projects: Cache<ProjectKey, Arc<ProjectData>>,
    size: IntGauge,
}

impl ProjectStore {
    pub fn new(config: &CacheConfig) -> Self {
        let projects = Cache::builder()
            .max_capacity(config.max_projects)
            .time_to_live(Duration::from_secs(config.project_ttl))
            .build();

        Self {
            projects,
            size: CACHE_SIZE.with_label_values(&[CACHE_NAME]),
        }
    }

    fn key(user_id: u64, parameters: &Parameters) -> ProjectKey {
        (user_id, parameters.form_path().to_ascii_lowercase())
    }

    pub async fn get(&self, user_id: u64, parameters: &Parameters) -> Option<Arc<ProjectData>> {
        let result = self.projects.get(&Self::key(user_id, parameters)).await;

        if result.is_some() {
            CACHE_HITS_TOTAL.with_label_values(&[CACHE_NAME]).inc();
        } else {
            CACHE_MISSES_TOTAL.with_label_values(&[CACHE_NAME]).inc();
        }

        result
    }

    pub async fn set(&self, user_id: u64, parameters: &Parameters, project: ProjectData) -> Arc<ProjectData> {
        let project = Arc::new(project);
        self.projects
            .insert(Self::key(user_id, parameters), project.clone())
            .await;
        self.record_size().await;

        project
    }

    pub async fn remove(&self, user_id: u64, parameters: &Parameters) {
        self.projects
            .invalidate(&Self::key(user_id, parameters))
            .await;
        self.record_size().await;
    }

    /// Drop every project cached for a user
    pub async fn clear_user(&self, user_id: u64) {
        let keys: Vec<Arc<ProjectKey>> = self
            .projects
            .iter()
            .filter(|(key, _)| key.0 == user_id)
            .map(|(key, _)| key)
            .collect();

        for key in &keys {
            self.projects.invalidate(key.as_ref()).await;
        }

        if !keys.is_empty() {
            self.record_size().await;
            tracing::debug!(user_id, removed = keys.len(), "Cleared cached projects");
        }
    }

    /// Entry count lags writes until pending maintenance has run
    async fn record_size(&self) {
        self.projects.run_pending_tasks().await;
        self.size.set(self.projects.entry_count() as i64);
    }
}
