//! micro3d console
//!
//! ```bash
//! micro3d --port /dev/ttyUSB0
//! micro3d --simulate
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use micro3d::shell::{camera_from_config, choose_port, Input, Session};
use micro3d::{init_logging, BUILD_DATE, VERSION};
use micro3d_communication::{
    list_ports, ExchangeCoordinator, SerialChannel, Stage, VirtualPort, VirtualStage,
};
use micro3d_settings::Config;
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "micro3d", version)]
#[command(about = "Drive a microscope stage over a Marlin serial link", long_about = None)]
struct Cli {
    /// Serial port, or "Auto" to pick one
    #[arg(long)]
    port: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Configuration file (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Talk to a simulated controller instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let mut config = Config::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    if let Some(baud) = cli.baud {
        config.connection.baud_rate = baud;
    }
    config.validate().context("invalid configuration")?;
    tracing::info!("micro3d {} (built {})", VERSION, BUILD_DATE);

    let camera = camera_from_config(&config.camera).context("invalid camera command")?;

    let coordinator = if cli.simulate {
        let port = VirtualPort::new("virtual", VirtualStage::new());
        ExchangeCoordinator::new(SerialChannel::from_port(Box::new(port), 64)?)?
    } else {
        let port = if config.connection.is_auto() {
            let ports = list_ports()?;
            let stdin = std::io::stdin();
            choose_port(&ports, &mut stdin.lock(), &mut std::io::stdout())?.port_name
        } else {
            config.connection.port.clone()
        };
        let coordinator = ExchangeCoordinator::open(&config.connection.to_params(&port))?;
        tracing::info!(
            "Waiting {:?} for the controller to boot",
            config.connection.settle_delay()
        );
        tokio::time::sleep(config.connection.settle_delay()).await;
        coordinator
    };

    let (tx, rx) = mpsc::channel(16);
    spawn_console_reader(tx.clone()).context("failed to start console reader")?;

    // nothing fallible between connecting and the session loop, whose
    // teardown is the only place the motors are released
    let stage = Stage::connect(
        coordinator,
        config.machine.to_step_sizes(),
        config.timeouts.to_stage_timeouts(),
    )
    .await
    .context("controller did not report its position")?;
    let mut session = Session::new(stage, &config, camera);

    let stop = session.stop_signal();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop.is_requested() {
                tracing::error!("Interrupted twice, exiting without shutdown");
                std::process::exit(130);
            }
            stop.request();
            if tx.send(Input::Interrupt).await.is_err() {
                break;
            }
        }
    });

    println!("Triggers: q/a w/s e/d home getpos fan0 fan1 focus grid stack exit, or raw G/M code");
    session.run(rx, &mut std::io::stdout()).await?;
    Ok(())
}

/// Forward console lines from a plain thread
///
/// Blocking stdin reads stay off the runtime so shutdown never waits on them.
fn spawn_console_reader(tx: mpsc::Sender<Input>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(Input::Line(line)).is_err() {
                    return;
                }
            }
            let _ = tx.blocking_send(Input::Eof);
        })
        .map(|_| ())
}
