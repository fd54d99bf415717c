use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use libflashdump::{
    BridgeTarget, ChipProfile, DumpConfig, Error, FlashReader, FtdiBridge, Identity, JedecId,
    ReadCommand, Session, SpiMode,
};

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}, eta:{eta}] {msg} {bar:40.cyan/blue} {percent}% {bytes} / {total_bytes} ({binary_bytes_per_sec})";

#[derive(Parser)]
#[command(name = "flash_dump", version = "0.1", about = "Dump an SPI NOR flash through an FTDI bridge")]
struct Args {
    /// Adapter channel: SERIAL[/N] or ftdi://VID:PID:SERIAL/N
    #[arg(short, long)]
    target: BridgeTarget,
    /// Built-in chip profile
    #[arg(long, default_value = "EN25QH128A")]
    chip: String,
    /// Override the expected JEDEC ID, e.g. 1C7018
    #[arg(long)]
    jedec: Option<JedecId>,
    /// Override the chip size in bytes (accepts 0x.., K and M suffixes)
    #[arg(long, value_parser = parse_size)]
    size: Option<u32>,
    /// SCK frequency in Hz
    #[arg(long, default_value_t = 5_000_000)]
    clock: u32,
    /// SPI mode
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    mode: u8,
    /// Bytes per read transaction
    #[arg(long, default_value_t = libflashdump::config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    #[arg(long, value_enum, default_value_t = ReadMode::Fast)]
    read_command: ReadMode,
    /// Abort when the JEDEC ID does not match
    #[arg(long)]
    strict: bool,
    /// Extra attempts per failed chunk
    #[arg(long, default_value_t = 0)]
    retries: u32,
    #[arg(long, default_value_t = 50)]
    retry_backoff_ms: u64,
    /// Output image
    #[arg(short, long, default_value = "flash_dump.bin")]
    output: PathBuf,
    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ReadMode {
    /// 0x0B with one dummy byte
    Fast,
    /// 0x03, for slow or marginal wiring
    Slow,
}

impl From<ReadMode> for ReadCommand {
    fn from(mode: ReadMode) -> Self {
        match mode {
            ReadMode::Fast => ReadCommand::FastRead,
            ReadMode::Slow => ReadCommand::Read,
        }
    }
}

fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, scale) = match s.chars().last() {
        Some('K' | 'k') => (&s[..s.len() - 1], 1024),
        Some('M' | 'm') => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };
    let value = match digits.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse::<u32>(),
    }
    .map_err(|e| format!("invalid size '{s}': {e}"))?;
    value
        .checked_mul(scale)
        .ok_or_else(|| format!("size '{s}' overflows"))
}

impl Args {
    fn log_level(&self) -> log::Level {
        match (self.quiet, self.verbose) {
            (true, _) => log::Level::Error,
            (false, 0) => log::Level::Warn,
            (false, 1) => log::Level::Info,
            (false, 2) => log::Level::Debug,
            _ => log::Level::Trace,
        }
    }

    fn chip_profile(&self) -> Result<ChipProfile> {
        let mut chip = ChipProfile::by_name(&self.chip).ok_or_else(|| {
            let known: Vec<&str> = ChipProfile::known_names().collect();
            anyhow!("Unknown chip '{}', known: {}", self.chip, known.join(", "))
        })?;
        if let Some(jedec) = self.jedec {
            chip.jedec = jedec;
        }
        if let Some(size) = self.size {
            chip.size = size;
        }
        Ok(ChipProfile::custom(chip.name, chip.jedec, chip.size)?)
    }

    fn dump_config(&self) -> Result<DumpConfig> {
        let mut config = DumpConfig::with_chip(self.chip_profile()?);
        config.chunk_size = self.chunk_size;
        config.read_command = self.read_command.into();
        config.strict_identity = self.strict;
        config.retries = self.retries;
        config.retry_backoff = Duration::from_millis(self.retry_backoff_ms);
        config.validate()?;
        Ok(config)
    }
}

/// Create the image file, unless an interrupt arrived before reading started
fn create_output(path: &Path, cancel: &AtomicBool) -> Result<File> {
    if cancel.load(Ordering::Relaxed) {
        return Err(anyhow!("Interrupted before reading, {} left untouched", path.display()));
    }
    File::create(path).with_context(|| format!("Creating {}", path.display()))
}

fn run(args: &Args) -> Result<()> {
    let config = args.dump_config()?;
    let size = config.chip.size;
    println!("[*] Chip: {}", config.chip);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed))?;
    }

    println!("[*] Opening {}", args.target);
    let mut session = Session::open(&FtdiBridge, &args.target)?;
    let settings = session.configure(args.clock, SpiMode::from_index(args.mode)?)?;
    println!("[+] SPI link: {settings}");

    let mut reader = FlashReader::new(session, config)?.with_cancel_flag(Arc::clone(&cancel));
    match reader.identify()? {
        Identity::Verified(id) => println!("[+] JEDEC ID {id} verified"),
        Identity::Mismatched { expected, actual } => {
            println!("[!] JEDEC ID {actual} does not match expected {expected}, reading anyway")
        }
    }

    reader.check_status();

    let file = create_output(&args.output, &cancel)?;
    let mut out = BufWriter::new(file);

    let progress = ProgressBar::new(size as u64)
        .with_style(ProgressStyle::default_spinner().template(PROGRESS_TEMPLATE)?);
    progress.set_message("Reading");

    match reader.read_all(&mut out, |p| progress.set_position(p.bytes_done)) {
        Ok(summary) => {
            progress.finish_with_message("Done");
            println!("[+] Read {summary}");
            println!("[*] Image written to {}", args.output.display());
            Ok(())
        }
        Err(e) => {
            progress.abandon_with_message("Aborted");
            if let Some(offset) = e.failed_offset() {
                eprintln!(
                    "[!] Stopped at offset {offset:#08X}, partial image of {} bytes kept in {}",
                    reader.cursor(),
                    args.output.display()
                );
            }
            Err(e.into())
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = simple_logger::init_with_level(args.log_level()) {
        eprintln!("[!] Logger setup failed: {e}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[!] {e:#}");
            if let Some(hint) = e.downcast_ref::<Error>().and_then(Error::remediation) {
                eprintln!("[*] {hint}");
            }
            ExitCode::FAILURE
        }
    }
}
