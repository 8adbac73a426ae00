use clap::Parser;
use hpbridge::mux::{run, PortMode, PortSpec};
use std::collections::HashSet;

/// A multiplexer for the MAME IEEE-488 remotizer
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Increase verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Port specification of the form [cs]:xxxx
    #[arg(required = true, value_parser = parse_port_spec)]
    ports: Vec<PortSpec>,
}

fn parse_port_spec(arg: &str) -> Result<PortSpec, String> {
    let (mode_s, port_s) = arg
        .split_once(':')
        .ok_or_else(|| "expected [cs]:xxxx".to_string())?;
    let mode = match mode_s {
        "c" | "C" => PortMode::Client,
        "s" | "S" => PortMode::Server,
        _ => return Err("mode must be c or s".to_string()),
    };
    let port: u16 = port_s.parse().map_err(|_| "bad port number".to_string())?;
    if port == 0 {
        return Err("port must be 1..65535".to_string());
    }
    Ok(PortSpec { mode, port })
}

fn main() {
    let args = Args::parse();
    let log_level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter(None, log_level).init();

    let mut seen = HashSet::new();
    for spec in &args.ports {
        if !seen.insert(spec.port) {
            eprintln!("Port {} used more than once", spec.port);
            std::process::exit(1);
        }
    }

    if let Err(e) = run(&args.ports) {
        eprintln!("mux failed: {}", e);
        std::process::exit(1);
    }
}
