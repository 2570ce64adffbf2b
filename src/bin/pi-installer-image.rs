use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use pi_installer_image::board;
use pi_installer_image::config::{
    BuildConfig, DEFAULT_EFI_PARTITION_MB, DEFAULT_FIRMWARE_PARTITION_MB,
};
use pi_installer_image::error::exit_code_for;
use pi_installer_image::pipeline::{build_image, BuildRequest};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Build a Debian installer SD card image for a Raspberry Pi",
    after_help = models_help()
)]
struct Cli {
    /// Board model (see the list below)
    model: String,

    /// Where to write the raw disk image
    output: PathBuf,

    /// Size of the firmware partition in MB
    #[arg(long, default_value_t = DEFAULT_FIRMWARE_PARTITION_MB,
          value_parser = clap::value_parser!(u64).range(1..))]
    firmware_partition_size: u64,

    /// Size of the EFI partition in MB
    #[arg(long, default_value_t = DEFAULT_EFI_PARTITION_MB,
          value_parser = clap::value_parser!(u64).range(1..))]
    efi_partition_size: u64,

    /// TOML file overriding cache, source and mirror settings
    #[arg(long, env = "PI_INSTALLER_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn models_help() -> String {
    format!("Supported models: {}", board::names().join(", "))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let model = board::lookup(&cli.model)?;
    let config = BuildConfig::load_or_default(cli.config.as_deref())?;

    let request = BuildRequest {
        model,
        output: cli.output,
        firmware_mb: cli.firmware_partition_size,
        efi_mb: cli.efi_partition_size,
    };
    let report = build_image(&request, &config)?;

    info!("Manifest: {}", report.manifest.display());
    info!(
        "Intermediate files kept in {}",
        report.work_dir.display()
    );
    Ok(())
}
