use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use aeon_machine::{ConsoleModel, Machine};
use aeon_storage::FileDisk;

#[derive(Parser)]
#[command(name = "aeon", about = "Aeon console emulator")]
struct Args {
    /// Hard drive image (raw, 512-byte sectors).
    #[arg(long)]
    disk: Option<PathBuf>,

    /// DVD image (raw ISO, 2048-byte sectors). Omitted: drive tray is empty.
    #[arg(long)]
    iso: Option<PathBuf>,

    /// Console model to emulate.
    #[arg(long, value_enum, default_value_t = Model::Retail)]
    model: Model,

    /// CPU core to use. Defaults to the first available core.
    #[arg(long)]
    cpu: Option<String>,

    /// Open the hard drive image read-only.
    #[arg(long)]
    read_only: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Model {
    Retail,
    Debug,
}

impl From<Model> for ConsoleModel {
    fn from(model: Model) -> Self {
        match model {
            Model::Retail => ConsoleModel::Retail,
            Model::Debug => ConsoleModel::Debug,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut machine = Machine::new(args.model.into(), args.cpu.as_deref())
        .context("failed to assemble the machine")?;
    info!(cpu = machine.cpu_name(), model = ?machine.model(), "machine assembled");

    if let Some(path) = &args.disk {
        let disk = FileDisk::open(path, args.read_only)
            .with_context(|| format!("failed to open disk image {}", path.display()))?;
        machine.attach_hard_drive(Box::new(disk));
        info!(path = %path.display(), "hard drive attached");
    }

    if let Some(path) = &args.iso {
        let media = FileDisk::open(path, true)
            .with_context(|| format!("failed to open DVD image {}", path.display()))?;
        machine
            .attach_dvd_image(Box::new(media))
            .with_context(|| format!("failed to mount DVD image {}", path.display()))?;
        info!(path = %path.display(), "DVD image mounted");
    }

    machine
        .run()
        .map_err(|halt| anyhow::anyhow!("guest stopped: {halt:?}"))?;
    info!("guest halted cleanly");
    Ok(())
}
