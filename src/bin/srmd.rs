use clap::Parser;
use hpbridge::srm::SrmServer;
use std::net::TcpListener;
use std::path::PathBuf;

/// A server for SRM file I/O
#[derive(Parser)]
#[command(version)]
struct Args {
    /// TCP port where to listen
    #[arg(long, default_value_t = 1235, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
    /// SDLC address of the server
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=63))]
    addr: u8,
    /// Top directory
    #[arg(default_value = "SRM")]
    top: PathBuf,
    /// Increase verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();
    let log_level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter(None, log_level).init();

    if !args.top.is_dir() {
        eprintln!("{} is not a directory", args.top.display());
        std::process::exit(1);
    }
    println!("port={},address={},top={}", args.port, args.addr, args.top.display());
    let listener = match TcpListener::bind(("127.0.0.1", args.port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("can't listen on port {}: {}", args.port, e);
            std::process::exit(1);
        }
    };
    let mut server = SrmServer::new(args.addr, args.top);
    if let Err(e) = server.serve(listener) {
        eprintln!("server failed: {}", e);
        std::process::exit(1);
    }
}
