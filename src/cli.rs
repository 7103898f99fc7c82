use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tabled::{Table, Tabled};

use airward::config::DefenseConfig;
use airward::models::{SessionReport, ThreatDetection};
use airward::monitor::{DisplaySink, InputSource, MonitorView};
use airward::radio::LinuxRadio;
use airward::DefenseSystem;

#[derive(Parser)]
#[command(name = "airward")]
#[command(author, version, about = "Passive 802.11 threat detection engine")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the live threat monitor (requires a monitor-mode interface)
    Monitor {
        /// Wireless interface to capture on (overrides config)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Scan visible access points and report suspicious ones
    Scan {
        /// Wireless interface to scan with (overrides config)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run_command(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => DefenseConfig::load(path)?,
        None => DefenseConfig::load_or_default()?,
    };

    match cli.command {
        Commands::Monitor { interface } => {
            if let Some(interface) = interface {
                config.radio.interface = interface;
            }
            cmd_monitor(config)
        }
        Commands::Scan { interface } => {
            if let Some(interface) = interface {
                config.radio.interface = interface;
            }
            cmd_scan(config)
        }
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

fn cmd_monitor(config: DefenseConfig) -> Result<()> {
    let mut radio = LinuxRadio::new(&config.radio);
    let mut display = TerminalDisplay::default();
    let mut input = StdinInput::new();

    println!(
        "{} capturing on {} (press Enter to stop)",
        "airward".green().bold(),
        config.radio.interface.bold()
    );

    let mut system = DefenseSystem::new(config);
    let report = system
        .run_monitor(&mut radio, &mut display, &mut input)
        .context("threat monitor failed to start")?;

    print_report(&report);
    Ok(())
}

fn cmd_scan(config: DefenseConfig) -> Result<()> {
    let mut radio = LinuxRadio::new(&config.radio);
    let mut display = TerminalDisplay::default();

    let mut system = DefenseSystem::new(config);
    let detections = system.run_passive_scan(&mut radio, &mut display);
    let stats = system.stats();

    println!();
    println!("Networks scanned: {}", stats.networks_scanned);
    if detections.is_empty() {
        println!("{}", "No suspicious networks found".green());
    } else {
        println!(
            "{}",
            format!("{} suspicious networks flagged", detections.len()).yellow()
        );
    }

    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = DefenseConfig::default();
    let content = toml::to_string_pretty(&config)?;

    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("Configuration written to {}", path.display());
        }
        None => print!("{content}"),
    }

    Ok(())
}

fn print_report(report: &SessionReport) {
    println!();
    println!("{}", "Session report".bold());
    println!("  Devices tracked:  {}", report.devices_tracked);
    println!("  Threats detected: {}", format_count(report.threats_detected));
    if report.beacon_spam > 0 {
        println!("  Beacon spam:      {}", report.beacon_spam);
    }
    if report.evil_twins > 0 {
        println!("  Evil twins:       {}", report.evil_twins);
    }
    if report.deauth_floods > 0 {
        println!("  Deauth floods:    {}", report.deauth_floods);
    }
    if report.probe_floods > 0 {
        println!("  Probe floods:     {}", report.probe_floods);
    }
    if report.karma_attacks > 0 {
        println!("  Karma attacks:    {}", report.karma_attacks);
    }
    if report.other_threats > 0 {
        println!("  Other threats:    {}", report.other_threats);
    }
    println!(
        "  Monitor time:     {}s",
        report.stats.active_monitor_time_ms / 1000
    );
}

fn format_count(count: u32) -> String {
    if count > 0 {
        count.to_string().red().bold().to_string()
    } else {
        count.to_string().green().to_string()
    }
}

/// Plain terminal rendering of the engine's structured events
#[derive(Default)]
pub struct TerminalDisplay;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "RISK")]
    risk: String,
    #[tabled(rename = "SUSPECTED")]
    suspected: String,
    #[tabled(rename = "FLAGGED")]
    flagged: String,
    #[tabled(rename = "LAST SEEN")]
    last_seen: String,
}

impl DisplaySink for TerminalDisplay {
    fn status(&mut self, line: &str) {
        println!("{}", line.cyan());
    }

    fn alert(&mut self, detection: &ThreatDetection) {
        println!(
            "{} {} (confidence {:.0}%, action: {})",
            "THREAT".red().bold(),
            detection.description,
            detection.confidence * 100.0,
            detection.recommended_action
        );
    }

    fn refresh(&mut self, view: &MonitorView<'_>) {
        let now = view.stats.last_update_ms;
        let rows: Vec<DeviceRow> = view
            .devices
            .iter()
            .take(10)
            .map(|d| DeviceRow {
                mac: d.mac.to_string(),
                risk: format!("{:.1}", d.risk_score),
                suspected: d.suspected.to_string(),
                flagged: (if d.marked_malicious { "yes" } else { "" }).to_string(),
                last_seen: format!("{:.1}s ago", now.saturating_sub(d.last_seen) as f32 / 1000.0),
            })
            .collect();

        println!();
        if rows.is_empty() {
            println!("{}", "Listening, no devices observed yet".dimmed());
        } else {
            println!("{}", Table::new(rows));
        }
        println!(
            "tracked: {} | threats: {} | active alerts: {} | uptime: {}s",
            view.devices.len(),
            view.total_threats,
            view.active_threats,
            view.stats.active_monitor_time_ms / 1000
        );
    }
}

/// Key-press source backed by a stdin reader thread; any complete line
/// counts as the stop key
pub struct StdinInput {
    pressed: Arc<AtomicBool>,
}

impl StdinInput {
    pub fn new() -> Self {
        let pressed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&pressed);

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });

        Self { pressed }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for StdinInput {
    fn escape_pressed(&mut self) -> bool {
        self.pressed.load(Ordering::SeqCst)
    }
}
