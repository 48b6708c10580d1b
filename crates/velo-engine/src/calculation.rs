//! Per-section calculation tasks.
//!
//! Each section runs as its own tokio task. Results travel back to the
//! builder over an unbounded channel; the builder alone mutates segments.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use velo_core::{convert_samples, direct_samples, CostProfile, LatLon, NoGoArea, RawSample, RouteResult, SectionId};
use velo_router::{RetryNotice, RouteRequest, RoutingError, RoutingService};

use crate::change_lock::CalculationEntry;
use crate::delay::DelayGate;

#[derive(Debug)]
pub(crate) enum CalcMessage {
    Starting { section: SectionId },
    Retrying { section: SectionId, notice: RetryNotice },
    Finished { section: SectionId, result: RouteResult },
    Settled,
}

/// Everything a task needs, captured at spawn time.
#[derive(Debug, Clone)]
pub(crate) struct CalculationJob {
    pub section: SectionId,
    pub from: LatLon,
    pub to: LatLon,
    pub distance_m: f64,
    pub direct: bool,
    pub no_go: Vec<NoGoArea>,
    pub profile: CostProfile,
    pub token: CancellationToken,
}

pub(crate) struct CalcContext<S> {
    pub service: Arc<S>,
    pub delay: DelayGate,
    pub long_section_m: f64,
    pub direct_speed_mps: f64,
    pub tx: UnboundedSender<CalcMessage>,
}

impl<S> Clone for CalcContext<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            delay: self.delay.clone(),
            long_section_m: self.long_section_m,
            direct_speed_mps: self.direct_speed_mps,
            tx: self.tx.clone(),
        }
    }
}

/// Spawn the task and a supervisor that reports panics.
pub(crate) fn spawn_calculation<S: RoutingService>(
    ctx: &CalcContext<S>,
    job: CalculationJob,
    entry: CalculationEntry,
) {
    let section = job.section;
    let handle = tokio::spawn(run_calculation(ctx.clone(), job, entry));
    tokio::spawn(async move {
        if let Err(err) = handle.await {
            if err.is_panic() {
                error!(%section, "Section calculation panicked: {}", err);
            }
        }
    });
}

async fn run_calculation<S: RoutingService>(
    ctx: CalcContext<S>,
    job: CalculationJob,
    entry: CalculationEntry,
) {
    let section = job.section;
    let _guard = tokio::select! {
        biased;
        _ = job.token.cancelled() => {
            debug!(%section, "Cancelled before joining the calculation group");
            return;
        }
        guard = entry.acquire() => guard,
    };

    if ctx.delay.mode().applies_to(job.distance_m, ctx.long_section_m) {
        debug!(%section, distance_m = job.distance_m, "Calculation delayed");
        tokio::select! {
            biased;
            _ = job.token.cancelled() => {
                debug!(%section, "Cancelled while delayed");
                return;
            }
            _ = ctx.delay.wait_open(job.distance_m, ctx.long_section_m) => {}
        }
    }

    if job.token.is_cancelled() {
        debug!(%section, "Cancelled before routing");
        return;
    }
    let _ = ctx.tx.send(CalcMessage::Starting { section });

    let retry_tx = ctx.tx.clone();
    let on_retry = move |notice: RetryNotice| {
        let _ = retry_tx.send(CalcMessage::Retrying { section, notice });
    };
    let samples = if job.direct {
        direct_path(&ctx, &job, &on_retry).await
    } else {
        routed_path(&ctx, &job, &on_retry).await
    };

    let result = match samples {
        Ok(samples) => convert_samples(&samples),
        Err(err) => {
            warn!(%section, error = %err, "Section calculation failed, marking invalid");
            RouteResult::Invalid
        }
    };

    if job.token.is_cancelled() {
        debug!(%section, "Discarding result of cancelled section");
        return;
    }
    // Published while the group is still held, so the settled notice
    // always follows the last result.
    let _ = ctx.tx.send(CalcMessage::Finished { section, result });
}

async fn routed_path<S: RoutingService>(
    ctx: &CalcContext<S>,
    job: &CalculationJob,
    on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
) -> Result<Vec<RawSample>, RoutingError> {
    let profile = ctx.service.compile_profile(&job.profile).await?;
    let request = RouteRequest {
        from: job.from,
        to: job.to,
        no_go: job.no_go.clone(),
        profile,
    };
    ctx.service.route(&request, on_retry).await
}

async fn direct_path<S: RoutingService>(
    ctx: &CalcContext<S>,
    job: &CalculationJob,
    on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
) -> Result<Vec<RawSample>, RoutingError> {
    let start = ctx.service.locate(job.from, on_retry).await?;
    let end = ctx.service.locate(job.to, on_retry).await?;
    Ok(direct_samples(&start, &end, ctx.direct_speed_mps))
}
