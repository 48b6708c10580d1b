//! Plan a cycling route against a BRouter-compatible backend.
//!
//! Adds the given waypoints, waits until every section is calculated and
//! prints route statistics, an elevation profile or the route snapshot.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use velo_cli::{parse_waypoint, print_profile, print_stats};
use velo_core::CostProfile;
use velo_engine::{EngineConfig, RouteBuilder, RouteEvent};
use velo_router::HttpRouter;

/// Plan a route through waypoints and report the result
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Routing backend URL (defaults to VELO_ROUTER_URL)
    #[arg(long)]
    router_url: Option<String>,

    /// Waypoint as lat,lon or lat,lon,direct (repeat, in route order)
    #[arg(long = "waypoint", required = true)]
    waypoints: Vec<String>,

    /// Uphill cost
    #[arg(long, default_value_t = 80)]
    uphill_cost: u32,

    /// Uphill cutoff in tenths of a percent
    #[arg(long, default_value_t = 15)]
    uphill_cutoff: u32,

    /// Downhill cost
    #[arg(long, default_value_t = 60)]
    downhill_cost: u32,

    /// Downhill cutoff in tenths of a percent
    #[arg(long, default_value_t = 15)]
    downhill_cutoff: u32,

    /// Turn cost
    #[arg(long, default_value_t = 90)]
    turn_cost: u32,

    /// Print an elevation profile sampled every N meters
    #[arg(long)]
    profile_step: Option<f64>,

    /// Print the route snapshot as JSON instead of statistics
    #[arg(long)]
    json: bool,
}

impl Args {
    fn cost_profile(&self) -> CostProfile {
        CostProfile {
            uphill_cost: self.uphill_cost,
            uphill_cutoff: self.uphill_cutoff,
            downhill_cost: self.downhill_cost,
            downhill_cutoff: self.downhill_cutoff,
            turn_cost: self.turn_cost,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("velo_engine=debug".parse()?))
        .init();

    let args = Args::parse();
    let waypoints = args
        .waypoints
        .iter()
        .map(|arg| parse_waypoint(arg))
        .collect::<Result<Vec<_>>>()?;
    if waypoints.len() < 2 {
        bail!("at least two waypoints are needed");
    }

    let mut config = EngineConfig::from_env();
    if let Some(url) = &args.router_url {
        config.router.base_url = url.clone();
    }
    tracing::info!("Planning route via {}", config.router.base_url);

    let router = HttpRouter::new(config.router.clone()).context("failed to build router client")?;
    let mut builder = RouteBuilder::new(Arc::new(router), config);
    builder.subscribe(|event| {
        if let RouteEvent::CalculationRetrying {
            section,
            attempt,
            max_retries,
            reason,
        } = event
        {
            tracing::warn!("Section {} retry {}/{}: {}", section, attempt, max_retries, reason);
        }
    });

    let cancel = CancellationToken::new();
    builder.recalculate_all(args.cost_profile(), cancel.clone());
    for waypoint in waypoints {
        builder.add_last(waypoint);
    }

    tokio::select! {
        _ = builder.wait_settled() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            tracing::warn!("Interrupted, cancelling calculations");
            cancel.cancel();
            bail!("interrupted");
        }
    }

    let mut out = io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &builder.snapshot())
            .context("failed to serialize route")?;
        writeln!(out)?;
        return Ok(());
    }

    print_stats(&mut out, &builder.stats())?;
    if let Some(step) = args.profile_step {
        writeln!(out)?;
        print_profile(&mut out, builder.points(), step)?;
    }
    Ok(())
}
