//! Deployment entry point for the veldt world engine.
//!
//! Boots the store, resolves the default world, wires the node service into
//! the chunk engine, warms the spawn region and runs the background sweeps
//! until Ctrl-C.

use std::error::Error as StdError;
use std::process::ExitCode;
use std::sync::Arc;
use std::fs;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use veldt::cancel::CancelToken;
use veldt::engine::ChunkEngine;
use veldt::node::NodeService;
use veldt::store::Store;
use veldt::tick::{Sweeper, Ticker};
use veldt::util::now_secs;

mod config;

use config::Config;


fn main() -> ExitCode {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("fatal: {err}");
            ExitCode::FAILURE
        }
    }

}

fn run() -> Result<(), Box<dyn StdError>> {

    let config = Config::load(config::config_path())?;

    fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(Store::open(config.data_dir.join("world.redb"))?);

    let world = store.ensure_default_world(&config.world.name, config.world.seed, now_secs())?;
    info!(id = world.id, seed = world.seed, "serving world `{}`", world.name);

    let templates = Arc::new(config.templates()?);
    let service = Arc::new(NodeService::new(
        Arc::clone(&store),
        Arc::clone(&templates),
        config.gen_config(),
    ));
    let engine = ChunkEngine::new(Arc::clone(&store), service, config.engine_config());

    if config.warmup_radius >= 0 {
        let chunks = engine.get_radius(&world, 0, 0, config.warmup_radius, &CancelToken::new())?;
        let nodes: usize = chunks.iter().map(|chunk| chunk.nodes.len()).sum();
        info!(chunks = chunks.len(), nodes, "warmed the spawn region");
    }

    let ticker = Ticker::spawn(Sweeper::new(Arc::clone(&store)), config.tick_config())?;

    let (stop_sender, stop_receiver) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_sender.send(());
    })?;

    info!("running, press Ctrl-C to stop");
    let _ = stop_receiver.recv();

    info!("shutting down");
    ticker.stop();

    Ok(())

}
