mod exec;
mod menu;
mod oplog;
mod ui;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use device_backup::partition_registry::{Registry, Target};
use device_backup::Device;
use log::info;

use exec::SystemExecutor;
use oplog::LogLocation;
use ui::{ConfirmMode, Console};

const DEFAULT_LOG: &str = "log.txt";

/// Backup, restore and flashing recovery for MID tablets.
#[derive(Parser, Debug)]
#[command(about, author, disable_version_flag = true)]
struct Args {
    /// Print version information.
    #[arg(short, long)]
    version: bool,

    /// Operation log file (default: log.txt on the ram-disk).
    ///
    /// A log below the internal or external SD card mountpoint also makes that
    /// card the starting folder of every file chooser.
    log: Option<PathBuf>,

    /// Hardware the recovery runs on.
    #[arg(short, long, value_enum, default_value_t)]
    target: Hardware,

    /// Prefix every device node, sysfs file, mountpoint and script with this folder.
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Log commands without running them.
    #[arg(short, long)]
    sandbox: bool,

    /// How confirmation prompts are answered.
    ///
    /// The interactive option asks on the terminal and blocks until answered.
    #[arg(short, long, value_enum, default_value_t)]
    confirm: ConfirmMode,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Hardware {
    #[default]
    Mid703,
    Pc,
}

impl From<Hardware> for Target {
    fn from(hardware: Hardware) -> Self {
        match hardware {
            Hardware::Mid703 => Target::Mid703,
            Hardware::Pc => Target::Pc,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.version {
        print_version();
        return Ok(());
    }

    let mut registry = Registry::new(args.target.into());
    if let Some(root) = &args.root {
        registry = registry.relocate(root);
    }

    let location = LogLocation::of(args.log.as_deref(), registry.mounts());
    let log_path = args.log.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_LOG));
    oplog::install(&log_path, location)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;
    info!(
        "Starting {} {} on {:?}",
        clap::crate_name!(),
        clap::crate_version!(),
        args.target
    );

    let sandbox = args.sandbox || cfg!(feature = "sandbox");
    let home = oplog::default_path(args.log.as_deref(), registry.mounts());
    let mut device = Device::new(&registry, SystemExecutor::new(sandbox), home);
    let mut console = Console::new(args.confirm);
    let session = menu::Session {
        log: log_path,
        log_on_internal: location == LogLocation::InternalSd,
    };
    menu::run(&mut device, &mut console, &session);

    oplog::close();
    Ok(())
}

fn print_version() {
    let crate_name = clap::crate_name!();
    let crate_version = clap::crate_version!();
    let enabled_features: &[&str] = &[
        #[cfg(feature = "sandbox")]
        "sandbox",
    ];

    print!("{} {}", crate_name, crate_version);
    if !enabled_features.is_empty() {
        print!(" ({})", enabled_features.join(", "));
    }
    println!();
}
