//! The periodic job table: every entry is a fire-and-forget
//! `tokio::spawn` loop gated by the kill switch, a cron-registration list
//! re-expressed without any external scheduler dependency. This is the
//! recurring-cadence half; `sentrypost_storage::scheduler` handles the
//! one-shot, precisely-timed half.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use rand::SeedableRng;
use sentrypost_growth::{DailyPlanner, MentionMonitor, PerformanceTracker, ReplyTargetFinder, ReportGenerator};
use sentrypost_ops::{ContentGapChecker, InboxPoller, Notifier};
use sentrypost_providers::{ModelRouter, ModelTier};
use sentrypost_research::ResearchAgent;
use sentrypost_storage::{ApprovalQueue, BudgetTracker, KillSwitch};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::state::AppState;

const BOOT_PLAN_DELAY: Duration = Duration::from_secs(30);

/// The Agent Cron's table of one-off, date-triggered jobs, keyed by a
/// stable id. Re-registering an id cancels whatever was previously
/// registered under it before installing the replacement, which is what
/// makes re-running the daily planner idempotent: a second invocation for
/// the same date replaces each `tweet_gen_<date>_<i>` job instead of
/// stacking a duplicate alongside it.
#[derive(Default)]
pub struct GenerationJobTable {
    handles: AsyncMutex<HashMap<String, JoinHandle<()>>>,
}

impl GenerationJobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any job previously registered under `job_id`, then installs
    /// `handle` in its place.
    async fn register(&self, job_id: String, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().await;
        if let Some(old) = handles.insert(job_id, handle) {
            old.abort();
        }
    }

    /// Cancels any job registered under `job_id` without replacing it.
    async fn cancel(&self, job_id: &str) {
        let mut handles = self.handles.lock().await;
        if let Some(old) = handles.remove(job_id) {
            old.abort();
        }
    }
}

/// Sleeps until the next occurrence of `hour:minute` UTC, then loops once
/// a day. The first wakeup may be today or tomorrow depending on the
/// current time, matching a standard cron daily trigger.
async fn sleep_until_daily(hour: u32, minute: u32) {
    let target = NaiveTime::from_hms_opt(hour, minute, 0).expect("valid cron time");
    let now = Utc::now();
    let mut next = now.date_naive().and_time(target).and_utc();
    if next <= now {
        next += ChronoDuration::days(1);
    }
    let wait = (next - now).to_std().unwrap_or(Duration::from_secs(0));
    tokio::time::sleep(wait).await;
}

fn spawn_daily<F, Fut>(name: &'static str, hour: u32, minute: u32, kill_switch: Arc<KillSwitch>, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    tokio::spawn(async move {
        loop {
            sleep_until_daily(hour, minute).await;
            if kill_switch.is_active() {
                info!(job = name, "skipped: kill switch active");
                continue;
            }
            if let Err(e) = job().await {
                error!(job = name, error = %e, "periodic job failed");
            }
        }
    })
}

fn spawn_interval<F, Fut>(name: &'static str, every: Duration, kill_switch: Arc<KillSwitch>, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if kill_switch.is_active() {
                info!(job = name, "skipped: kill switch active");
                continue;
            }
            if let Err(e) = job().await {
                error!(job = name, error = %e, "periodic job failed");
            }
        }
    })
}

/// Registers every row of the periodic job table and returns the handles
/// so shutdown can abort them.
#[allow(clippy::too_many_arguments)]
pub fn spawn_all(
    state: AppState,
    full_research: Arc<ResearchAgent>,
    hot_research: Arc<ResearchAgent>,
    warm_research: Arc<ResearchAgent>,
    reply_finder: Arc<ReplyTargetFinder>,
    mention_monitor: Arc<MentionMonitor>,
    performance_tracker: Arc<PerformanceTracker>,
    report_generator: Arc<ReportGenerator>,
    daily_planner: Arc<DailyPlanner>,
    content_gap: Arc<ContentGapChecker>,
    inbox_poller: Arc<InboxPoller>,
    notifier: Notifier,
) -> Vec<JoinHandle<()>> {
    let kill_switch = state.kill_switch.clone();
    let mut handles = Vec::new();

    handles.push(spawn_daily("full_research_cycle", 2, 0, kill_switch.clone(), move || {
        let agent = full_research.clone();
        async move {
            let digest = agent.run_daily_research().await?;
            info!(?digest, "full research cycle complete");
            Ok(())
        }
    }));

    handles.push(spawn_interval(
        "hot_tier_research",
        Duration::from_secs(3 * 3600),
        kill_switch.clone(),
        move || {
            let agent = hot_research.clone();
            async move {
                agent.run_daily_research().await?;
                Ok(())
            }
        },
    ));

    handles.push(spawn_interval(
        "warm_tier_research",
        Duration::from_secs(10 * 3600),
        kill_switch.clone(),
        move || {
            let agent = warm_research.clone();
            async move {
                agent.run_daily_research().await?;
                Ok(())
            }
        },
    ));

    handles.push(spawn_interval("dashboard_action_poller", Duration::from_secs(30), kill_switch.clone(), move || {
        let poller = inbox_poller.clone();
        async move {
            poller.poll_once().await?;
            Ok(())
        }
    }));

    handles.push(spawn_interval(
        "mention_monitor",
        Duration::from_secs(15 * 60),
        kill_switch.clone(),
        move || {
            let monitor = mention_monitor.clone();
            async move {
                monitor.run().await?;
                Ok(())
            }
        },
    ));

    handles.push(spawn_interval(
        "reply_target_finder",
        Duration::from_secs(6 * 3600),
        kill_switch.clone(),
        move || {
            let finder = reply_finder.clone();
            async move {
                finder.run().await?;
                Ok(())
            }
        },
    ));

    handles.push(spawn_interval(
        "performance_tracker",
        Duration::from_secs(4 * 3600),
        kill_switch.clone(),
        move || {
            let tracker = performance_tracker.clone();
            async move {
                tracker.run().await?;
                Ok(())
            }
        },
    ));

    handles.push(spawn_daily("daily_analytics_report", 7, 0, kill_switch.clone(), move || {
        let generator = report_generator.clone();
        async move {
            let report = generator.run(Utc::now().date_naive()).await?;
            info!(report, "daily analytics report generated");
            Ok(())
        }
    }));

    // Daily plan + per-slot generation scheduling: cron 06:00 UTC daily
    // AND once 30 seconds after boot. Both land through the same
    // `GenerationJobTable`, so whichever invocation runs second for a
    // given date replaces the first's generation jobs instead of
    // duplicating them.
    let generation_jobs = Arc::new(GenerationJobTable::new());
    let planner_for_boot = daily_planner.clone();
    let generation_jobs_for_boot = generation_jobs.clone();
    let queue_for_boot = state.approvals.clone();
    let router_for_boot = state.router.clone();
    let budget_for_boot = state.budget.clone();
    let kill_switch_for_boot = kill_switch.clone();
    handles.push(tokio::spawn(async move {
        tokio::time::sleep(BOOT_PLAN_DELAY).await;
        if kill_switch_for_boot.is_active() {
            info!(job = "daily_plan_boot", "skipped: kill switch active");
            return;
        }
        if let Err(e) = run_daily_plan(
            &planner_for_boot,
            &generation_jobs_for_boot,
            queue_for_boot,
            router_for_boot,
            budget_for_boot,
            kill_switch_for_boot,
        )
        .await
        {
            error!(job = "daily_plan_boot", error = %e, "boot-time daily plan failed");
        }
    }));

    let queue_for_plan = state.approvals.clone();
    let router_for_plan = state.router.clone();
    let budget_for_plan = state.budget.clone();
    let kill_switch_for_plan = kill_switch.clone();
    handles.push(spawn_daily("daily_plan_scheduling", 6, 0, kill_switch.clone(), move || {
        let planner = daily_planner.clone();
        let generation_jobs = generation_jobs.clone();
        let queue = queue_for_plan.clone();
        let router = router_for_plan.clone();
        let budget = budget_for_plan.clone();
        let kill_switch = kill_switch_for_plan.clone();
        async move { run_daily_plan(&planner, &generation_jobs, queue, router, budget, kill_switch).await }
    }));

    handles.push(spawn_interval("content_gap_check", Duration::from_secs(3600), kill_switch.clone(), move || {
        let checker = content_gap.clone();
        async move {
            checker.run().await?;
            Ok(())
        }
    }));

    let _ = notifier; // retained on the struct for future direct-notify jobs; every job above notifies via its own collaborator.

    handles
}

/// Generates today's posting plan (idempotent) and registers one
/// generation job per slot on the Agent Cron's `GenerationJobTable`
/// under the stable id `tweet_gen_<date>_<i>`, 30 minutes before each
/// planned slot. Re-invoking this for a date already planned registers
/// under the same ids, so each job is replaced rather than duplicated —
/// this is what keeps a restart, or the boot job and the 06:00 cron job
/// landing on the same date, from ever firing the same slot twice.
async fn run_daily_plan(
    planner: &DailyPlanner,
    generation_jobs: &GenerationJobTable,
    queue: Arc<ApprovalQueue>,
    router: Arc<dyn ModelRouter>,
    budget: Arc<BudgetTracker>,
    kill_switch: Arc<KillSwitch>,
) -> anyhow::Result<()> {
    let mut rng = rand::rngs::StdRng::from_entropy();
    let today = Utc::now().date_naive();
    let plan = planner.plan_daily_schedule(today, &mut rng).await?;

    for (i, slot) in plan.slot_times.iter().enumerate() {
        let job_id = format!("tweet_gen_{today}_{i}");
        let generation_time = *slot - ChronoDuration::minutes(30);
        if generation_time <= Utc::now() {
            generation_jobs.cancel(&job_id).await;
            continue;
        }

        let slot_time = *slot;
        let queue = queue.clone();
        let router = router.clone();
        let budget = budget.clone();
        let kill_switch = kill_switch.clone();
        let job_name = job_id.clone();
        let handle = tokio::spawn(async move {
            let wait = (generation_time - Utc::now()).to_std().unwrap_or(Duration::from_secs(0));
            tokio::time::sleep(wait).await;
            if kill_switch.is_active() {
                info!(job = %job_name, "skipped: kill switch active");
                return;
            }
            let generator = SlotContentGenerator { queue, router, budget };
            if let Err(e) = generator.generate(slot_time).await {
                error!(job = %job_name, error = %e, "slot content generation failed");
            }
        });
        generation_jobs.register(job_id, handle).await;
    }
    Ok(())
}

/// Estimated per-call cost of a slot generation prompt, charged against
/// the "sentrypost" project budget before the model is invoked.
const SLOT_GENERATION_COST_USD: f64 = 0.01;

/// Drafts a tweet for an upcoming planned slot and submits it to the
/// Approval Queue. Invoked directly by its own `GenerationJobTable`
/// entry 30 minutes before the slot, rather than through the content
/// scheduler — slot generation is cron-triggered by date, not a
/// one-shot job with its own executor-dispatch machinery.
struct SlotContentGenerator {
    queue: Arc<ApprovalQueue>,
    router: Arc<dyn ModelRouter>,
    budget: Arc<BudgetTracker>,
}

impl SlotContentGenerator {
    async fn generate(&self, slot_time: DateTime<Utc>) -> anyhow::Result<serde_json::Value> {
        if !self.budget.record_spend("sentrypost", SLOT_GENERATION_COST_USD).await? {
            anyhow::bail!("daily/monthly budget exhausted, skipping slot generation");
        }

        let prompt = "Write one short, engaging tweet for the next scheduled posting slot. \
                      Return ONLY the tweet text, max 280 characters.";
        let text = self.router.invoke(ModelTier::Standard, prompt, 150).await?;
        let text = text.trim().to_string();
        let slot_time_str = slot_time.to_rfc3339();
        let id = self
            .queue
            .submit("sentrypost", "daily-plan", "tweet", &serde_json::json!({ "text": text }), &slot_time_str, 0.0)
            .await?;
        Ok(serde_json::json!({ "approval_id": id, "slot_time": slot_time_str }))
    }
}
