use std::sync::Arc;

use chrono::Utc;
use sentrypost_providers::{ModelRouter, ModelTier};
use sentrypost_storage::{ApprovalQueue, KillSwitch};

use crate::notify::Notifier;
use crate::types::OpsResult;

const TWEET_GAP_HOURS: i64 = 12;
const FILLER_COUNT: usize = 5;

/// Run once at boot: if there's no tweet pending approval and it's been
/// more than 12 hours since the last one was posted (or none ever has),
/// draft a batch of filler tweets for review. If tweets are already
/// pending, nudge the operator instead of generating more.
pub struct ContentGapChecker {
    queue: Arc<ApprovalQueue>,
    router: Arc<dyn ModelRouter>,
    kill_switch: Arc<KillSwitch>,
    notifier: Notifier,
}

impl ContentGapChecker {
    pub fn new(
        queue: Arc<ApprovalQueue>,
        router: Arc<dyn ModelRouter>,
        kill_switch: Arc<KillSwitch>,
        notifier: Notifier,
    ) -> Self {
        Self {
            queue,
            router,
            kill_switch,
            notifier,
        }
    }

    pub async fn run(&self) -> OpsResult<()> {
        if self.kill_switch.is_active() {
            return Ok(());
        }

        let last_tweet = self.queue.get_last_executed("tweet").await?;
        let hours_since = last_tweet.as_ref().and_then(|a| a.executed_at).map(|executed_at| {
            (Utc::now() - executed_at).num_seconds() as f64 / 3600.0
        });

        let pending = self.queue.get_pending(None).await?;
        let pending_tweets = pending.iter().filter(|p| p.action_type == "tweet").count();

        if pending_tweets > 0 {
            self.notifier
                .notify(
                    &format!("{pending_tweets} tweets waiting for your review!"),
                    "content_gap",
                    "reminder",
                )
                .await?;
            return Ok(());
        }

        if let Some(hours) = hours_since {
            if hours < TWEET_GAP_HOURS as f64 {
                return Ok(());
            }
        }

        let gap_msg = match hours_since {
            Some(hours) => format!("No tweets posted in {hours:.0}h"),
            None => "No tweets posted yet".to_string(),
        };

        let mut generated = 0usize;
        for _ in 0..FILLER_COUNT {
            let prompt = "Write one short, engaging tweet. Return ONLY the tweet text, max 280 characters.";
            match self.router.invoke(ModelTier::Standard, prompt, 150).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    self.queue
                        .submit(
                            "sentrypost",
                            "content-gap",
                            "tweet",
                            &serde_json::json!({ "text": text }),
                            &gap_msg,
                            0.0,
                        )
                        .await?;
                    generated += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "gap-fill tweet generation failed");
                }
            }
        }

        if generated > 0 {
            self.notifier
                .notify(
                    &format!("{gap_msg}.\n\nGenerated {generated} tweets for review."),
                    "content_gap",
                    "content_generated",
                )
                .await?;
        } else {
            self.notifier
                .notify(&format!("{gap_msg}, and gap-fill generation failed."), "content_gap", "failed")
                .await?;
        }

        Ok(())
    }
}
