//! Everything the boot sequence assembles and the HTTP introspection
//! surface reads from: one struct of `Arc`-wrapped collaborators, `Clone`
//! so `axum::State` can hand a copy to every handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sentrypost_growth::GrowthDb;
use sentrypost_memory::MemoryManager;
use sentrypost_providers::{ModelRouter, NotificationSink, PlatformExecutor, SocialPlatform};
use sentrypost_research::ResearchStore;
use sentrypost_storage::{ApprovalQueue, AuditLog, BudgetTracker, CheckinLog, ContentScheduler, KillSwitch};

use crate::config::EngineConfig;

#[derive(Clone)]
pub struct AppState {
    pub state_dir: PathBuf,
    pub config: EngineConfig,
    pub approvals: Arc<ApprovalQueue>,
    pub audit: Arc<AuditLog>,
    pub checkin: Arc<CheckinLog>,
    pub kill_switch: Arc<KillSwitch>,
    pub scheduler: Arc<ContentScheduler>,
    pub budget: Arc<BudgetTracker>,
    pub memory: Arc<MemoryManager>,
    pub research_store: ResearchStore,
    pub growth_db: GrowthDb,
    pub router: Arc<dyn ModelRouter>,
    pub platform: Arc<dyn SocialPlatform>,
    pub executor: Arc<dyn PlatformExecutor>,
    pub notification_sink: Option<Arc<dyn NotificationSink>>,
}

impl AppState {
    pub fn data_dir(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.state_dir.join("heartbeat.json")
    }

    pub fn inbox_dir(&self) -> PathBuf {
        self.state_dir.join("content_feedback")
    }
}

pub fn db_path(state_dir: &Path, name: &str) -> PathBuf {
    state_dir.join("db").join(name)
}
