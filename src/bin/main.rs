// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! CLI tool for Disk Health Monitor (dhm)

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use colored::Colorize;
#[cfg(feature = "cli")]
use serde::Serialize;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use std::sync::Arc;
#[cfg(feature = "cli")]
use std::time::Duration;

#[cfg(feature = "cli")]
use diskhealthlib::{
    ControllerCollector, ControllerSet, Deadline, Disk, DiskCollector, DiskSet, DiskStatus, HistoryStore,
    MonitorConfig, MonitorError, ShellRunner,
};

#[cfg(feature = "cli")]
const EXIT_OK: i32 = 0;
#[cfg(feature = "cli")]
const EXIT_INIT: i32 = 2;
#[cfg(feature = "cli")]
const EXIT_COLLECTION: i32 = 3;
#[cfg(feature = "cli")]
const EXIT_OUTPUT: i32 = 4;
#[cfg(feature = "cli")]
const EXIT_WARNING: i32 = 5;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "dhm")]
#[command(about = "Disk Health Monitor: SMART and storage controller health for storage servers", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// History file used to compute read/write increments
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    /// Informational logging
    #[arg(long)]
    verbose: bool,

    /// Only collect storage controllers
    #[arg(long, conflicts_with = "no_controllers")]
    controller_only: bool,

    /// Skip storage controllers
    #[arg(long)]
    no_controllers: bool,

    /// Only report disks with a warning or error
    #[arg(long)]
    only_warnings: bool,

    /// Exit with status 5 when any disk reports a warning or error
    #[arg(long)]
    exit_on_warning: bool,

    /// Disks collected in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-command timeout in seconds
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Give up on the whole collection after this many seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    sample_config: bool,
}

#[cfg(feature = "cli")]
impl Cli {
    fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    /// Defaults, then the config file, then flags.
    fn load_config(&self) -> diskhealthlib::Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_toml_file(path)?,
            None => MonitorConfig::default(),
        };
        if let Some(path) = &self.data_file {
            config.data_file = path.clone();
        }
        if let Some(path) = &self.output {
            config.output_file = Some(path.clone());
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(secs) = self.timeout {
            config.command_timeout_secs = secs;
        }
        if self.controller_only {
            config.controller_only = true;
            config.collect_controllers = true;
        }
        if self.no_controllers {
            config.collect_controllers = false;
        }
        config.exit_on_warning |= self.exit_on_warning;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct DiskSummary<'a> {
    collected_at: String,
    previous_run: Option<&'a str>,
    total: usize,
    ssd: usize,
    hdd: usize,
    warnings: usize,
    errors: usize,
    disks: Vec<&'a Disk>,
}

#[cfg(feature = "cli")]
impl<'a> DiskSummary<'a> {
    fn new(set: &'a DiskSet, only_warnings: bool) -> Self {
        let disks = set
            .disks
            .iter()
            .filter(|d| !only_warnings || matches!(d.status(), DiskStatus::Warning | DiskStatus::Error))
            .collect();
        Self {
            collected_at: set.collection_time(),
            previous_run: set.previous_timestamp.as_deref(),
            total: set.len(),
            ssd: set.ssd_count(),
            hdd: set.hdd_count(),
            warnings: set.warning_count(),
            errors: set.error_count(),
            disks,
        }
    }
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct Report<'a> {
    hostname: String,
    generated_at: String,
    data_file: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    disks: Option<DiskSummary<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    controllers: Option<&'a ControllerSet>,
    /// Partial failures; the data above is still valid
    warnings: Vec<String>,
}

/// One line per leaf failure, each prefixed with where it happened.
#[cfg(feature = "cli")]
fn warning_lines(err: &MonitorError, prefix: &str, out: &mut Vec<String>) {
    let join = |text: &str| {
        if prefix.is_empty() {
            text.to_string()
        } else {
            format!("{}: {}", prefix, text)
        }
    };
    match err {
        MonitorError::Multiple(errors) => errors.iter().for_each(|e| warning_lines(e, prefix, out)),
        MonitorError::Collection { context, source } if matches!(**source, MonitorError::Multiple(_)) => {
            warning_lines(source, &join(context.as_str()), out)
        }
        other => out.push(join(other.to_string().as_str())),
    }
}

#[cfg(feature = "cli")]
fn write_report(report: &Report<'_>, output: Option<&Path>) -> diskhealthlib::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")?,
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn run(cli: &Cli) -> i32 {
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            return EXIT_INIT;
        }
    };
    log::debug!("Configuration: {:?}", config);

    let runner = Arc::new(ShellRunner::new(config.command_timeout()));
    let deadline = cli
        .deadline
        .map(|secs| Deadline::after(Duration::from_secs(secs)))
        .unwrap_or_default();

    let mut warnings = Vec::new();
    let mut disk_failure = false;
    let mut disk_set = None;

    if !config.controller_only {
        let history = HistoryStore::new(&config.data_file).with_backup_keep(config.backup_keep);
        let collector = DiskCollector::new(runner.clone(), history).with_concurrency(config.concurrency);
        match collector.collect(&deadline) {
            Ok(collected) => {
                let (set, error) = collected.into_parts();
                if let Some(e) = error {
                    warning_lines(&e, "", &mut warnings);
                }
                disk_set = Some(set);
            }
            Err(e @ MonitorError::ToolNotFound(_)) => {
                eprintln!("{} {}", "[ERROR]".red().bold(), e);
                return EXIT_INIT;
            }
            Err(e) => {
                eprintln!("{} Disk collection failed: {}", "[ERROR]".red().bold(), e);
                warnings.push(e.to_string());
                disk_failure = true;
            }
        }
    }

    let controllers = config.collect_controllers.then(|| {
        let (set, error) = ControllerCollector::new(runner.clone()).collect(&deadline).into_parts();
        if let Some(e) = error {
            warning_lines(&e, "", &mut warnings);
        }
        set
    });

    let report = Report {
        hostname: hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".into()),
        generated_at: chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        data_file: &config.data_file,
        disks: disk_set.as_ref().map(|set| DiskSummary::new(set, cli.only_warnings)),
        controllers: controllers.as_ref(),
        warnings,
    };

    for warning in &report.warnings {
        eprintln!("{} {}", "[WARN]".yellow(), warning);
    }

    if let Err(e) = write_report(&report, config.output_file.as_deref()) {
        eprintln!("{} Cannot write report: {}", "[ERROR]".red().bold(), e);
        return EXIT_OUTPUT;
    }
    if let Some(path) = &config.output_file {
        eprintln!("{} Report written to {}", "[+]".green(), path.display());
    }

    if disk_failure {
        return EXIT_COLLECTION;
    }
    let unhealthy = disk_set
        .as_ref()
        .map(|set| set.warning_count() + set.error_count())
        .unwrap_or(0);
    if config.exit_on_warning && unhealthy > 0 {
        eprintln!("{} {} disks need attention", "[WARN]".yellow().bold(), unhealthy);
        return EXIT_WARNING;
    }
    EXIT_OK
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    if cli.sample_config {
        print!("{}", MonitorConfig::sample_toml());
        std::process::exit(EXIT_OK);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level())).init();

    std::process::exit(run(&cli));
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
