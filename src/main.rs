//! FishFeeder main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  CdevPin / SimOutputPin     CdevEdgeSource / SimEdgeSource     │
//! │  I2cBusOpener / SimBus      LibcameraStill / SyntheticCamera   │
//! │  JsonConfigFile             FsArchive      LogEventSink        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  FeedController                                        │    │
//! │  │  motion ─▶ capture ─▶ classify ─▶ feed · pH sampling    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  RequestServer (GET status · POST commands)                    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `fishfeeder [config.json]`.  Without the `linux` feature the
//! devices are simulated; type `m` + Enter to inject a motion pulse.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use fishfeeder::adapters::config_file::JsonConfigFile;
use fishfeeder::adapters::log_sink::LogEventSink;
use fishfeeder::app::ports::{ConfigStore, Worker};
use fishfeeder::diagnostics::install_panic_handler;
use fishfeeder::rpc::server::RequestServer;
use fishfeeder::system;

const DEFAULT_CONFIG_PATH: &str = "fishfeeder.json";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fishfeeder=info".parse()?),
        )
        .init();
    install_panic_handler();

    info!("FishFeeder v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let config = JsonConfigFile::new(&config_path)
        .load()
        .with_context(|| format!("loading {config_path}"))?;
    info!("Config loaded from {}", config_path);

    let sink = Arc::new(LogEventSink);

    #[cfg(feature = "linux")]
    let (controller, sim) = {
        let hardware = system::linux_hardware(&config);
        let controller = system::assemble(&config, hardware, sink)?;
        (controller, None::<system::SimControls>)
    };
    #[cfg(not(feature = "linux"))]
    let (controller, sim) = {
        log::warn!("Built without the `linux` feature; running on simulated devices");
        let scene = system::fish_scene(config.camera.width, config.camera.height);
        let (hardware, controls) = system::simulated_hardware(scene);
        let controller = system::assemble(&config, hardware, sink)?;
        (controller, Some(controls))
    };

    controller.start();

    let server = RequestServer::bind(&config.server, controller.clone())
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    server.start().context("starting request server")?;
    info!("Listening on {}", server.local_addr());

    println!("Press Enter to exit");
    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        match (line.trim(), &sim) {
            ("m", Some(controls)) => {
                info!("Injecting motion pulse");
                controls.motion.pulse();
            }
            _ => break,
        }
    }

    info!("Shutting down");
    server.stop();
    controller.shutdown();
    Ok(())
}
