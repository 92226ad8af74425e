//! Periodic overdue reminder sweep

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;

use crate::{error::AppResult, models::BorrowRecord, repository::BorrowLedger};

use super::email::MessageSender;

pub const REMINDER_SUBJECT: &str = "Book return reminder";

/// Outcome of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Overdue loans not yet reminded
    pub overdue: usize,
    pub notified: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct OverdueNotifier {
    ledger: Arc<dyn BorrowLedger>,
    sender: Arc<dyn MessageSender>,
    grace: Duration,
}

impl OverdueNotifier {
    pub fn new(ledger: Arc<dyn BorrowLedger>, sender: Arc<dyn MessageSender>, grace: Duration) -> Self {
        Self { ledger, sender, grace }
    }

    pub fn render_reminder(record: &BorrowRecord) -> String {
        format!(
            "Hello {},\n\nThis is a reminder that the book you borrowed, \"{}\" by {}, was due on {} and is now overdue. Please return it.\n\nThank You!",
            record.borrower.name,
            record.book.title,
            record.book.author,
            record.due_at.format("%Y-%m-%d"),
        )
    }

    /// Send one reminder per overdue, not yet reminded loan
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let pending: Vec<BorrowRecord> = self
            .ledger
            .list_open_loans()
            .await?
            .into_iter()
            .filter(|r| !r.notified && r.due_at + self.grace < now)
            .collect();

        let mut report = SweepReport {
            overdue: pending.len(),
            ..SweepReport::default()
        };

        for record in pending {
            let body = Self::render_reminder(&record);
            if let Err(e) = self
                .sender
                .send(&record.borrower.email, REMINDER_SUBJECT, &body)
                .await
            {
                tracing::warn!(
                    "Overdue reminder for record {} to {} failed: {}",
                    record.id,
                    record.borrower.email,
                    e
                );
                report.failed += 1;
                continue;
            }

            match self.ledger.mark_notified(record.id).await {
                Ok(_) => {
                    tracing::info!("Overdue reminder sent to {} (record {})", record.borrower.email, record.id);
                    report.notified += 1;
                }
                Err(e) => {
                    tracing::error!("Reminder sent but record {} not flagged: {}", record.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run `sweep` every `every` until the task is aborted
    pub fn spawn(self, every: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Overdue notifier started (every {:?})", every);
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.sweep(Utc::now()).await {
                    Ok(report) if report.overdue > 0 => tracing::info!(
                        "Overdue sweep: {} overdue, {} notified, {} failed",
                        report.overdue,
                        report.notified,
                        report.failed
                    ),
                    Ok(_) => tracing::debug!("Overdue sweep: nothing to do"),
                    Err(e) => tracing::error!("Overdue sweep failed: {}", e),
                }
            }
        })
    }
}
