use ipmb_mux::bus::create_bus;
use ipmb_mux::{MuxApp, MuxConfig};
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "ipmbmux.toml";

/// Pick the config path from `--config <path>`, `-c <path>`, or the first
/// positional argument
fn parse_config_path() -> String {
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    return args[i + 1].clone();
                }
            }
            arg if !arg.starts_with('-') => return arg.to_string(),
            _ => {}
        }
        i += 1;
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn main() {
    let config_path = parse_config_path();
    let config = match MuxConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Could not load {} ({}); using built-in defaults",
                config_path, e
            );
            MuxConfig::default()
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    info!(
        "ipmb-mux starting (port {}, local address {:#04x}, driver {})",
        config.network.port, config.bus.local_address, config.bus.driver
    );

    let bus = match create_bus(&config) {
        Ok(bus) => bus,
        Err(e) => {
            error!("Failed to initialize bus driver: {}", e);
            std::process::exit(1);
        }
    };

    let mut app = match MuxApp::new(config, bus) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = app.start() {
        error!("Failed to spawn daemon threads: {}", e);
        std::process::exit(1);
    }

    let core = app.core();
    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            let core = core.clone();
            if let Err(e) = thread::Builder::new()
                .name("signals".to_string())
                .spawn(move || {
                    if let Some(sig) = signals.forever().next() {
                        info!("Received signal {}; stopping", sig);
                        core.running.store(false, Ordering::SeqCst);
                    }
                })
            {
                warn!("Failed to spawn signal handler: {}", e);
            }
        }
        Err(e) => warn!("Failed to register signal handler: {}", e),
    }

    while core.running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }
    app.shutdown();
}
