//! Headless run of a sorting level: a source releases items of random colors one per frame and the
//! router decides where they go. Demand queries are answered from whatever the source still holds.
//!
//! cargo run --example simulate -- --items 40 --seed 7

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use bin_sorter_lib::routing::ItemState;
use bin_sorter_lib::{Color, DemandForecast, ItemId, Result, Router, RouterConfig, RouterEvent};
use clap::Parser;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(about = "Simulate a bin sorting level without rendering")]
struct Args {
    /// TOML file with router settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of items in the level
    #[arg(long, default_value_t = 30)]
    items: u32,

    /// Number of distinct colors used
    #[arg(long, default_value_t = 3)]
    colors: usize,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Simulated frame length in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Give up after this many frames
    #[arg(long, default_value_t = 20_000)]
    max_frames: u32,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => RouterConfig::from_file(path)?,
        None => RouterConfig::default(),
    };

    let palette = &Color::ALL[..args.colors.clamp(1, Color::ALL.len())];
    let mut source = level(args.items, palette, args.seed);
    let mut retry: VecDeque<(ItemId, Color)> = VecDeque::new();

    let mut router = Router::new(config)?;
    router.set_total_items(u64::from(args.items));
    for &color in palette {
        router.spawn_bin(color, 3);
    }

    let frame = Duration::from_millis(args.frame_ms);
    for frame_no in 0..args.max_frames {
        if let Some((item, color)) = retry.pop_front().or_else(|| source.pop_front()) {
            router.item_released(item, color);
        }
        router.tick(frame);

        let mut done = false;
        for event in router.drain_events() {
            match event {
                RouterEvent::ReservationResult { item, granted: false } => {
                    if let Some(record) = router.registry().get(item) {
                        retry.push_back((item, record.color));
                    }
                }
                RouterEvent::DemandRequested { request } => {
                    let forecast = forecast(&router, &source, &retry);
                    debug!(request, waiting = forecast.total(), "Answering demand query");
                    router.demand_forecast_received(request, forecast);
                }
                RouterEvent::BinRetired { bin, color, committed } => {
                    info!(bin, %color, items = committed.len(), "Retired");
                }
                RouterEvent::BinReplaced { retired, replacement, new_color, capacity, .. } => {
                    info!(retired, replacement, %new_color, capacity, "Replaced");
                }
                RouterEvent::ProgressChanged { percent, .. } => info!(percent, "Progress"),
                RouterEvent::BufferCountdownElapsed => warn!(frame_no, "Buffer stuck full"),
                RouterEvent::CompletionReached => done = true,
                _ => {}
            }
        }

        if done {
            info!(frames = frame_no + 1, "Level complete");
            return Ok(());
        }
    }

    warn!(
        committed = router.progress().committed(),
        total = router.progress().total(),
        in_flight = router.transfers().open_count(),
        "Gave up before completion"
    );
    Ok(())
}

/// Builds the item queue with a small xorshift so runs are repeatable per seed.
fn level(items: u32, palette: &[Color], seed: u64) -> VecDeque<(ItemId, Color)> {
    let mut state = seed.max(1);
    (0..items)
        .map(|item| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (item, palette[(state % palette.len() as u64) as usize])
        })
        .collect()
}

/// Everything still waiting for a bin: unreleased items, rejected ones, and buffered ones.
fn forecast(
    router: &Router,
    source: &VecDeque<(ItemId, Color)>,
    retry: &VecDeque<(ItemId, Color)>,
) -> DemandForecast {
    let buffered = router
        .registry()
        .iter()
        .filter(|(_, r)| r.state == ItemState::Buffered)
        .map(|(_, r)| r.color);

    source
        .iter()
        .chain(retry.iter())
        .map(|&(_, color)| color)
        .chain(buffered)
        .map(|color| (color, 1))
        .collect()
}
