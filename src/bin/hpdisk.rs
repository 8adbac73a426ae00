use clap::Parser;
use hpbridge::drive::{find_model, Drive, DRIVE_MODELS};
use hpbridge::remotizer::{Event, RemotizerIo};
use std::path::PathBuf;

/// Emulation of HP Amigo and SS/80 drives for the MAME IEEE-488 remotizer
#[derive(Parser)]
#[command(version)]
struct Args {
    /// TCP port of the MAME remotizer
    #[arg(short, long, default_value_t = 1234, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
    /// HPIB address of the drive
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=30))]
    addr: u8,
    /// Drive model
    model: String,
    /// Image file(s), one per unit
    images: Vec<PathBuf>,
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new().filter(None, log_level).init();

    let model = match find_model(&args.model) {
        Some(m) => m,
        None => {
            eprintln!("Model {} unknown\n\nAvailable models:", args.model);
            for m in DRIVE_MODELS {
                eprintln!("{}", m.name);
            }
            std::process::exit(1);
        }
    };

    let io = match RemotizerIo::listen(args.port, true, true) {
        Ok(io) => io,
        Err(e) => {
            eprintln!("can't listen on port {}: {}", args.port, e);
            std::process::exit(1);
        }
    };
    let handle = io.handle();
    handle.set_address(args.addr);
    handle.set_pp_response(if args.addr < 8 { 0x80 >> args.addr } else { 0 });
    let mut drive = Drive::new(model, handle.clone());
    handle.set_unlisten_sa(drive.unlisten_sas());

    for (unit, image) in args.images.iter().enumerate() {
        if unit >= drive.unit_count() {
            eprintln!("model {} has only {} unit(s)", model.name, drive.unit_count());
            std::process::exit(1);
        }
        if let Err(e) = drive.load_image(unit, image) {
            eprintln!("can't open {}: {}", image.display(), e);
            std::process::exit(1);
        }
        println!("unit {}: {}", unit, image.display());
    }

    while let Some(ev) = io.get_event() {
        match ev {
            Event::Connected => println!("Connected!"),
            Event::Disconnected => println!("Disconnected!"),
            ev => drive.process_event(ev),
        }
    }
}
