use anyhow::Result;
use clap::Parser;
use libflashdump::ChipProfile;
use libflashdump::enumerate::list_bridges;

#[derive(Parser)]
#[command(name = "list_bridges", version = "0.1", about = "List attached FTDI bridge adapters")]
struct Args {
    /// Also print the built-in chip profiles
    #[arg(long)]
    chips: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::init_with_level(log::Level::Warn)?;

    let bridges = list_bridges()?;
    if bridges.is_empty() {
        println!("No FTDI adapters found");
    }
    for info in &bridges {
        println!("{info}");
    }

    if args.chips {
        println!();
        for name in ChipProfile::known_names() {
            if let Some(chip) = ChipProfile::by_name(name) {
                println!("{chip}");
            }
        }
    }
    Ok(())
}
