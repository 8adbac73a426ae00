use clap::Parser;
use hpbridge::plotter::{Plotter, PlotterPort, Point};
use hpbridge::remotizer::{Event, LinkHandle, LinkPort, RemotizerIo};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Headless HP9872 plotter emulator for the MAME IEEE-488 remotizer
#[derive(Parser)]
#[command(version)]
struct Args {
    /// TCP port of the MAME remotizer
    #[arg(short, long, default_value_t = 1234, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
    /// HPIB address of the plotter
    #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(0..=30))]
    addr: u8,
    /// Append drawn segments to this file
    #[arg(short, long)]
    segment_log: Option<PathBuf>,
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Link-side collaborator of the plotter core.  The segment log is shared
/// with whoever else may be watching it, hence the mutex.
struct PlotterLink {
    link: LinkHandle,
    log: Option<Arc<Mutex<File>>>,
}

impl PlotterPort for PlotterLink {
    fn draw_segment(&mut self, p1: Point, p2: Point, pen: u8) {
        log::info!("segment ({},{})-({},{}) pen {}", p1.x, p1.y, p2.x, p2.y, pen);
        if let Some(log) = &self.log {
            let mut f = log.lock().unwrap();
            let _ = writeln!(f, "{} {} {} {} {}", p1.x, p1.y, p2.x, p2.y, pen);
        }
    }

    fn set_ol_led(&mut self, zone: u8) {
        log::debug!("OL led {}", zone);
    }

    fn set_error_led(&mut self, on: bool) {
        log::debug!("ERROR led {}", on);
    }

    fn set_status_byte(&mut self, b: u8) {
        self.link.set_status_byte(b);
    }

    fn set_pp_state(&mut self, on: bool) {
        self.link.send_pp_state(on);
    }

    fn set_rsv_state(&mut self, on: bool) {
        self.link.set_rsv_state(on);
    }

    fn talk_data(&mut self, data: &[u8]) {
        self.link.talk_data(data, true);
        self.link.send_checkpoint();
    }
}

fn main() {
    let args = Args::parse();
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new().filter(None, log_level).init();

    let io = match RemotizerIo::listen(args.port, false, true) {
        Ok(io) => io,
        Err(e) => {
            eprintln!("can't listen on port {}: {}", args.port, e);
            std::process::exit(1);
        }
    };
    let handle = io.handle();
    handle.set_address(args.addr);
    handle.set_pp_response(if args.addr < 8 { 0x80 >> args.addr } else { 0 });

    let log = match &args.segment_log {
        None => None,
        Some(path) => match File::options().create(true).append(true).open(path) {
            Ok(f) => Some(Arc::new(Mutex::new(f))),
            Err(e) => {
                eprintln!("can't open {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
    };

    let mut plotter = Plotter::new(PlotterLink {
        link: handle.clone(),
        log,
    });

    while let Some(ev) = io.get_event() {
        match ev {
            Event::Connected => log::info!("connected"),
            Event::Disconnected => log::info!("disconnected"),
            ev => plotter.process_event(ev),
        }
    }
}
