use clap::Parser;
use hpbridge::bisync::relay;
use std::net::{TcpListener, TcpStream};

/// BiSync (2780) bridge between MAME and a Hercules peer
#[derive(Parser)]
#[command(version)]
struct Args {
    /// TCP port to listen on for the MAME (modem) side
    #[arg(short, long, default_value_t = 2780, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
    /// TCP port of the Hercules side on localhost
    #[arg(long, default_value_t = 2703, value_parser = clap::value_parser!(u16).range(1..))]
    hercules_port: u16,
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new().filter(None, log_level).init();

    let listener = match TcpListener::bind(("0.0.0.0", args.port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("can't listen on port {}: {}", args.port, e);
            std::process::exit(1);
        }
    };
    println!("Connecting on MAME side..");
    loop {
        let (modem, peer) = match listener.accept() {
            Ok(x) => x,
            Err(e) => {
                eprintln!("accept failed: {}", e);
                std::process::exit(1);
            }
        };
        println!("Connected ({})!", peer);
        println!("Connecting on Hercules side..");
        let hercules = match TcpStream::connect(("localhost", args.hercules_port)) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("Hercules connection failed: {}", e);
                continue;
            }
        };
        println!("Connected!");
        match relay(modem, hercules) {
            Ok(()) => println!("Disconnected!"),
            Err(e) => log::warn!("relay error: {}", e),
        }
    }
}
