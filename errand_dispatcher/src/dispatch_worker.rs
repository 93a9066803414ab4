use std::time::Duration;

use errand_engine::{AutoAssignOutcome, AutoAssignReport, FulfillmentError, MatchingApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Tallies of one dispatch round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub assigned: usize,
    pub unmatched: usize,
    /// Orders whose best candidate lost the claim, usually to a shopper claiming by hand.
    pub lost: usize,
    /// Orders whose attempt errored. They are retried next round.
    pub failed: usize,
}

impl DispatchSummary {
    pub fn total_count(&self) -> usize {
        self.assigned + self.unmatched + self.lost + self.failed
    }
}

impl From<&[AutoAssignReport]> for DispatchSummary {
    fn from(reports: &[AutoAssignReport]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, r| {
            match r.outcome {
                AutoAssignOutcome::Assigned { .. } => acc.assigned += 1,
                AutoAssignOutcome::NoCandidates => acc.unmatched += 1,
                AutoAssignOutcome::Lost { .. } => acc.lost += 1,
                AutoAssignOutcome::Failed { .. } => acc.failed += 1,
            }
            acc
        })
    }
}

/// Runs one auto-assign pass over at most `batch_size` waiting orders.
pub async fn run_dispatch_round(
    matcher: &MatchingApi<SqliteDatabase>,
    batch_size: usize,
) -> Result<DispatchSummary, FulfillmentError> {
    let reports = matcher.auto_assign_pending(batch_size).await?;
    let summary = DispatchSummary::from(reports.as_slice());
    debug!("🕰️ Dispatch results: {}", report_list(&reports));
    Ok(summary)
}

/// Starts the dispatch worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_dispatch_worker(
    matcher: MatchingApi<SqliteDatabase>,
    interval: Duration,
    batch_size: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Dispatch worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running dispatch round");
            match run_dispatch_round(&matcher, batch_size).await {
                Ok(summary) if summary.total_count() == 0 => trace!("🕰️ No orders waiting"),
                Ok(summary) => info!(
                    "🕰️ {} orders considered. {} assigned, {} without candidates, {} lost to other claims, {} failed",
                    summary.total_count(),
                    summary.assigned,
                    summary.unmatched,
                    summary.lost,
                    summary.failed
                ),
                Err(e) => {
                    error!("🕰️ Error running dispatch round: {e}");
                },
            }
        }
    })
}

fn report_list(reports: &[AutoAssignReport]) -> String {
    reports.iter().map(|r| format!("[{}] {:?}", r.order_id, r.outcome)).collect::<Vec<String>>().join(", ")
}
