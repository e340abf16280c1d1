use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, OptionalExtension};
use sentrypost_types::{JobStatus, ScheduledJob};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

use crate::db::StorageDb;
use crate::types::StorageResult;

/// A registered handler for one `content_type`. Mirrors
/// `sentrypost_providers::PlatformExecutor` in shape but is kept as its
/// own trait: the scheduler's executors operate on scheduled content
/// payloads, not approval action payloads, even though both ultimately
/// reach the same platform adapters.
#[async_trait]
pub trait ContentExecutor: Send + Sync {
    async fn execute(&self, content_data: &Value) -> anyhow::Result<Value>;
}

/// Durable one-shot time-triggered execution of registered content
/// types. Owns an in-memory min-heap of `(scheduled_time, job_id)` (the
/// "timer wheel") guarded by a mutex, woken by a background task that
/// sleeps until the next due time and re-evaluates on every
/// schedule/cancel/reschedule call via a `Notify`.
///
/// This scheduler owns its own timer loop instead of delegating to a
/// job-store library.
pub struct ContentScheduler {
    db: StorageDb,
    executors: Arc<Mutex<HashMap<String, Arc<dyn ContentExecutor>>>>,
    heap: Arc<Mutex<BinaryHeap<Reverse<(DateTime<Utc>, String)>>>>,
    notify: Arc<Notify>,
}

impl ContentScheduler {
    pub async fn open(db_path: &Path) -> StorageResult<Self> {
        let db = StorageDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scheduled_content (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT UNIQUE NOT NULL,
                content_type TEXT NOT NULL,
                content_data TEXT NOT NULL,
                scheduled_time TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                executed_at TEXT,
                result TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_status ON scheduled_content(status);",
        )?;
        drop(conn);
        Ok(Self {
            db,
            executors: Arc::new(Mutex::new(HashMap::new())),
            heap: Arc::new(Mutex::new(BinaryHeap::new())),
            notify: Arc::new(Notify::new()),
        })
    }

    pub async fn register_executor(&self, content_type: &str, executor: Arc<dyn ContentExecutor>) {
        self.executors.lock().await.insert(content_type.to_string(), executor);
        info!(content_type, "registered content executor");
    }

    /// Reloads every pending row into the heap, firing anything already
    /// past due immediately (catch-up), then spawns the background
    /// timer loop.
    pub async fn start(&self) {
        let pending = self.get_pending().await.unwrap_or_default();
        {
            let mut heap = self.heap.lock().await;
            for job in &pending {
                heap.push(Reverse((job.scheduled_time, job.job_id.clone())));
            }
        }
        self.notify.notify_one();

        let db = self.db.clone();
        let executors = self.executors.clone();
        let heap = self.heap.clone();
        let notify = self.notify.clone();
        tokio::spawn(run_timer_loop(db, executors, heap, notify));
        info!(pending = pending.len(), "content scheduler started");
    }

    /// Persists a new job row and arms a timer via the background loop.
    pub async fn schedule(
        &self,
        content_type: &str,
        content_data: &Value,
        scheduled_time: DateTime<Utc>,
        job_id: Option<String>,
    ) -> StorageResult<String> {
        let job_id = job_id.unwrap_or_else(|| {
            format!("{}_{}_{:x}", content_type, Utc::now().format("%Y%m%d_%H%M%S"), rand_suffix())
        });

        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO scheduled_content (job_id, content_type, content_data, scheduled_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job_id,
                content_type,
                serde_json::to_string(content_data)?,
                scheduled_time.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        drop(conn);

        self.heap.lock().await.push(Reverse((scheduled_time, job_id.clone())));
        self.notify.notify_one();
        Ok(job_id)
    }

    /// Allowed only while `status=pending`.
    pub async fn cancel(&self, job_id: &str) -> StorageResult<bool> {
        let conn = self.db.conn().await;
        let updated = conn.execute(
            "UPDATE scheduled_content SET status='cancelled' WHERE job_id=?1 AND status='pending'",
            params![job_id],
        )?;
        drop(conn);
        self.notify.notify_one();
        Ok(updated > 0)
    }

    /// Allowed only while `status=pending`.
    pub async fn reschedule(&self, job_id: &str, new_time: DateTime<Utc>) -> StorageResult<bool> {
        let conn = self.db.conn().await;
        let updated = conn.execute(
            "UPDATE scheduled_content SET scheduled_time=?1 WHERE job_id=?2 AND status='pending'",
            params![new_time.to_rfc3339(), job_id],
        )?;
        drop(conn);
        if updated > 0 {
            self.heap.lock().await.push(Reverse((new_time, job_id.to_string())));
            self.notify.notify_one();
        }
        Ok(updated > 0)
    }

    pub async fn get_pending(&self) -> StorageResult<Vec<ScheduledJob>> {
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM scheduled_content WHERE status='pending' ORDER BY scheduled_time ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn get_upcoming(&self, hours: i64) -> StorageResult<Vec<ScheduledJob>> {
        let cutoff = (Utc::now() + ChronoDuration::hours(hours)).to_rfc3339();
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM scheduled_content WHERE status='pending' AND scheduled_time <= ?1
             ORDER BY scheduled_time ASC",
        )?;
        let rows = stmt
            .query_map(params![cutoff], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn get_by_job_id(&self, job_id: &str) -> StorageResult<Option<ScheduledJob>> {
        let conn = self.db.conn().await;
        let row = conn
            .query_row(
                "SELECT * FROM scheduled_content WHERE job_id=?1",
                params![job_id],
                row_to_job,
            )
            .optional()?;
        Ok(row)
    }
}

fn rand_suffix() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
}

async fn run_timer_loop(
    db: StorageDb,
    executors: Arc<Mutex<HashMap<String, Arc<dyn ContentExecutor>>>>,
    heap: Arc<Mutex<BinaryHeap<Reverse<(DateTime<Utc>, String)>>>>,
    notify: Arc<Notify>,
) {
    loop {
        let next_due = { heap.lock().await.peek().map(|Reverse((t, _))| *t) };

        match next_due {
            None => notify.notified().await,
            Some(due) => {
                let now = Utc::now();
                if due > now {
                    let wait = (due - now).to_std().unwrap_or(std::time::Duration::ZERO);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = notify.notified() => continue,
                    }
                }

                let due_jobs: Vec<String> = {
                    let mut heap = heap.lock().await;
                    let mut jobs = Vec::new();
                    let now = Utc::now();
                    while let Some(Reverse((t, _))) = heap.peek() {
                        if *t > now {
                            break;
                        }
                        if let Some(Reverse((_, job_id))) = heap.pop() {
                            jobs.push(job_id);
                        }
                    }
                    jobs
                };

                for job_id in due_jobs {
                    let db = db.clone();
                    let executors = executors.clone();
                    let heap = heap.clone();
                    let notify = notify.clone();
                    tokio::spawn(fire_job(db, executors, heap, notify, job_id));
                }
            }
        }
    }
}

/// Execution protocol: re-read the row (idempotency — a cancelled job
/// that was already popped is a silent no-op), look up the executor,
/// run it, write back status/result. Never retried automatically.
///
/// `reschedule` pushes a fresh heap entry for the new time without
/// removing the stale one it supersedes, so a popped `job_id` can still
/// carry an earlier, now-invalid due time. Re-validating the row's
/// current `scheduled_time` against the wall clock here catches that:
/// a row rescheduled later than its heap entry is requeued under its
/// real due time instead of firing early.
async fn fire_job(
    db: StorageDb,
    executors: Arc<Mutex<HashMap<String, Arc<dyn ContentExecutor>>>>,
    heap: Arc<Mutex<BinaryHeap<Reverse<(DateTime<Utc>, String)>>>>,
    notify: Arc<Notify>,
    job_id: String,
) {
    let row = {
        let conn = db.conn().await;
        conn.query_row(
            "SELECT * FROM scheduled_content WHERE job_id=?1",
            params![job_id],
            row_to_job,
        )
        .optional()
    };

    let job = match row {
        Ok(Some(job)) if job.status == JobStatus::Pending => job,
        Ok(_) => return,
        Err(err) => {
            error!(job_id, %err, "failed to read scheduled job row");
            return;
        }
    };

    if job.scheduled_time > Utc::now() {
        heap.lock().await.push(Reverse((job.scheduled_time, job.job_id.clone())));
        notify.notify_one();
        return;
    }

    let executor = executors.lock().await.get(&job.content_type).cloned();
    let Some(executor) = executor else {
        warn!(job_id = %job.job_id, content_type = %job.content_type, "no executor registered");
        update_status(&db, &job.job_id, JobStatus::Failed, Some("no executor")).await;
        return;
    };

    match executor.execute(&job.content_data).await {
        Ok(result) => {
            let result_text = serde_json::to_string(&result).ok();
            update_status(&db, &job.job_id, JobStatus::Executed, result_text.as_deref()).await;
            info!(job_id = %job.job_id, "scheduled job executed");
        }
        Err(err) => {
            error!(job_id = %job.job_id, %err, "scheduled job failed");
            update_status(&db, &job.job_id, JobStatus::Failed, Some(&err.to_string())).await;
        }
    }
}

async fn update_status(db: &StorageDb, job_id: &str, status: JobStatus, result: Option<&str>) {
    let conn = db.conn().await;
    let _ = conn.execute(
        "UPDATE scheduled_content SET status=?1, executed_at=?2, result=?3 WHERE job_id=?4",
        params![status.as_str(), Utc::now().to_rfc3339(), result, job_id],
    );
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ScheduledJob> {
    let content_data: String = row.get("content_data")?;
    let scheduled_time: String = row.get("scheduled_time")?;
    let created_at: String = row.get("created_at")?;
    let status: String = row.get("status")?;
    let executed_at: Option<String> = row.get("executed_at")?;
    Ok(ScheduledJob {
        job_id: row.get("job_id")?,
        content_type: row.get("content_type")?,
        content_data: serde_json::from_str(&content_data).unwrap_or(Value::Null),
        scheduled_time: DateTime::parse_from_rfc3339(&scheduled_time)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        executed_at: executed_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().map(|dt| dt.with_timezone(&Utc))
        }),
        result: row.get("result")?,
    })
}
