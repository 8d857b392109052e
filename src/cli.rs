//! Command-line front end
//!
//! Each subcommand opens the link for as long as it needs it. `stream`
//! additionally reads control words from stdin while the job runs.

use crate::console::ConsoleSink;
use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use grblstream_communication::firmware::grbl::commands::{HOME, UNLOCK};
use grblstream_communication::{
    auto_select_port, GcodeProgram, GcodeStreamer, LinkConfig, RealtimeCommand, SerialLink,
};
use grblstream_core::{EventSink, RunState};
use grblstream_settings::Config;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long to keep the port open for replies after a one-shot send
const RESPONSE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "grblstream", author, version, about = "Stream G-code to a GRBL controller")]
pub struct Cli {
    /// Config file (TOML or JSON); defaults to the platform config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Print every line sent and received
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Port selection shared by the commands that talk to a controller
#[derive(Args, Debug, Clone, Default)]
pub struct PortArgs {
    /// Serial port, or "Auto"; overrides the config file
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate; overrides the config file
    #[arg(short, long)]
    pub baud: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports
    Ports,
    /// Send lines; `!`, `~`, `?` and `reset` go out as real-time bytes
    Send {
        #[command(flatten)]
        target: PortArgs,
        #[arg(required = true)]
        lines: Vec<String>,
    },
    /// Stream a G-code file; type pause, resume, stop, `!`, `~` or `?` while it runs
    Stream {
        #[command(flatten)]
        target: PortArgs,
        file: PathBuf,
    },
    /// Jog one step, e.g. `X+` or `z-`
    Jog {
        #[command(flatten)]
        target: PortArgs,
        #[arg(allow_hyphen_values = true)]
        shorthand: String,
    },
    /// Run the homing cycle
    Home {
        #[command(flatten)]
        target: PortArgs,
    },
    /// Clear an alarm lock
    Unlock {
        #[command(flatten)]
        target: PortArgs,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Stdin control words understood while streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
    Stop,
    Realtime(RealtimeCommand),
}

impl Control {
    fn parse(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "stop" => Some(Self::Stop),
            other => RealtimeCommand::from_text(other).map(Self::Realtime),
        }
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };

    if let Command::InitConfig { force } = cli.command {
        return init_config(&config_path, force);
    }

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let sink: Arc<dyn EventSink> = Arc::new(ConsoleSink::new(cli.verbose));
    let link = Arc::new(SerialLink::with_config(
        LinkConfig::from(&config.connection),
        sink.clone(),
    ));

    match cli.command {
        Command::Ports => print_ports(&link),
        Command::Send { target, lines } => {
            let (port, baud) = resolve_target(&config, &target, &link)?;
            link.session(&port, baud, |link| send_all(link, &lines))
        }
        Command::Stream { target, file } => {
            let program = GcodeProgram::load(&file)?;
            let (port, baud) = resolve_target(&config, &target, &link)?;
            link.connect(&port, baud)?;
            let result = stream(&link, sink, program, config.streaming.stop_join_timeout());
            link.disconnect();
            result
        }
        Command::Jog { target, shorthand } => {
            let line = config
                .jog
                .line_for(&shorthand)
                .ok_or_else(|| anyhow!("Unrecognised jog '{}', expected e.g. X+ or Z-", shorthand))?;
            let (port, baud) = resolve_target(&config, &target, &link)?;
            link.session(&port, baud, |link| send_all(link, &[line]))
        }
        Command::Home { target } => {
            let (port, baud) = resolve_target(&config, &target, &link)?;
            link.session(&port, baud, |link| send_all(link, &[HOME.to_string()]))
        }
        Command::Unlock { target } => {
            let (port, baud) = resolve_target(&config, &target, &link)?;
            link.session(&port, baud, |link| send_all(link, &[UNLOCK.to_string()]))
        }
        Command::InitConfig { .. } => Ok(()),
    }
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save_to_file(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn print_ports(link: &SerialLink) -> anyhow::Result<()> {
    let ports = link.list_available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{:<24} {}", port.port_name, port.description);
    }
    Ok(())
}

/// Pick the port and baud rate from flags, then config, then auto-detection
fn resolve_target(
    config: &Config,
    target: &PortArgs,
    link: &SerialLink,
) -> anyhow::Result<(String, u32)> {
    let mut connection = config.connection.clone();
    if let Some(port) = &target.port {
        connection.port = port.clone();
    }
    let baud = target.baud.unwrap_or(connection.baud_rate);

    if !connection.is_auto_port() {
        return Ok((connection.port, baud));
    }

    let ports = link.list_available_ports()?;
    let port = auto_select_port(&ports)
        .map(|p| p.port_name.clone())
        .ok_or_else(|| anyhow!("No serial ports found"))?;
    tracing::info!("Auto-selected port {}", port);
    Ok((port, baud))
}

fn send_all(link: &SerialLink, lines: &[String]) -> anyhow::Result<()> {
    for line in lines {
        match RealtimeCommand::from_text(line) {
            Some(command) => link.send_realtime(command)?,
            None => link.send_line(line)?,
        }
    }
    thread::sleep(RESPONSE_WINDOW);
    Ok(())
}

fn stream(
    link: &Arc<SerialLink>,
    sink: Arc<dyn EventSink>,
    program: GcodeProgram,
    stop_timeout: Duration,
) -> anyhow::Result<()> {
    let streamer = Arc::new(GcodeStreamer::new(link.clone(), sink));
    streamer.start(program)?;

    // Blocks on stdin, so it is left detached when the job ends.
    let control_streamer = Arc::clone(&streamer);
    let control_link = Arc::clone(link);
    thread::Builder::new()
        .name("stdin-control".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match Control::parse(&line) {
                    Some(Control::Pause) => control_streamer.pause(),
                    Some(Control::Resume) => control_streamer.resume(),
                    Some(Control::Stop) => {
                        if !control_streamer.stop_within(stop_timeout) {
                            tracing::warn!("Job did not stop within {:?}", stop_timeout);
                        }
                        break;
                    }
                    Some(Control::Realtime(command)) => {
                        if let Err(e) = control_link.send_realtime(command) {
                            tracing::warn!("{}", e);
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => tracing::warn!("Unknown command '{}'", line.trim()),
                }
            }
        })?;

    let snapshot = streamer.wait();
    match snapshot.run_state {
        RunState::Finished => Ok(()),
        RunState::Stopped => {
            println!("Stopped after {}", snapshot.progress());
            Ok(())
        }
        RunState::Errored => bail!("Job failed after {}", snapshot.progress()),
        other => bail!("Job ended in unexpected state {:?}", other),
    }
}
