use anyhow::Result;
use clap::Parser;
use kitchen::Kitchen;

mod data;
mod kitchen;
mod signal;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(about = "Simulate kitchen orders")]
struct Args {
    #[arg(short, long, help = "Input file with orders (json)")]
    orders: PathBuf,

    #[arg(short, long, help = "Custom config file (json)")]
    config: PathBuf,

    #[arg(
        short,
        long = "debug_level",
        default_value = "0",
        value_parser = clap::value_parser!(u8).range(0..=2),
        help = "Debug level (default: 0), 1-verbose, 2-debug"
    )]
    debug_level: u8,

    #[arg(
        long,
        default_value_t = data::DEFAULT_MAX_ORDERS,
        help = "Process at most this many orders from the input file"
    )]
    max_orders: usize,
}

fn init_logging(debug_level: u8) -> WorkerGuard {
    let level = match debug_level {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };

    // events are emitted while the kitchen lock is held, so the sink must
    // never make the emitter block on I/O
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .with_target(false)
        .with_ansi(false)
        .init();

    guard
}

fn main() -> Result<()> {
    let args = Args::try_parse()?;

    let orders = data::load_orders(&args.orders, args.max_orders)?;
    let config = data::load_config(&args.config)?;

    let _guard = init_logging(args.debug_level);

    let kitchen = Arc::new(Kitchen::new(orders, config));
    kitchen.run();

    Ok(())
}
