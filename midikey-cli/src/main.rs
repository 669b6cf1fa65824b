mod args;
mod player;

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use midikey_core::config::{self, Config};
use midikey_core::decode::decode_file;
use midikey_core::playback::{LogInjector, PlaybackRequest};
use midikey_core::profile::load_profile;
use midikey_types::note_name;

use args::{CliArgs, USAGE};

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = config::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("midikey.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    match File::create(&log_path).or_else(|_| File::create(std::env::temp_dir().join("midikey.log"))) {
        Ok(log_file) => loggers.push(WriteLogger::new(log_level, Config::default(), log_file)),
        Err(e) => eprintln!("midikey: no log file: {}", e),
    }

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("midikey: logger already initialised");
    }

    log::debug!("midikey starting (log level: {:?})", log_level);
}

fn fail(message: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, message.to_string())
}

fn main() -> io::Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.iter().any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return Ok(());
    }
    let args = match CliArgs::parse(&argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("midikey: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let timeline = decode_file(&args.timeline).map_err(fail)?;
    let mut profile = load_profile(&args.profile, &config.default_options()).map_err(fail)?;
    if let Some(tempo) = args.tempo {
        profile.options.tempo_multiplier = tempo;
    }
    if let Some(transpose) = args.transpose {
        profile.options.transpose = transpose;
    }

    let file_name = args
        .timeline
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let request = PlaybackRequest::from_profile(&timeline, &profile, file_name)
        .map_err(fail)?
        .with_countdown(args.countdown.unwrap_or_else(|| config.countdown()));

    if args.print_events {
        let json = serde_json::to_string_pretty(&request.events).map_err(fail)?;
        println!("{}", json);
        return Ok(());
    }

    warn_unmapped(&request, &args.profile);
    println!(
        "playing {} with profile '{}' ({} events, {:.1}s), dry run",
        args.timeline.display(),
        profile.name,
        request.events.len(),
        request.total_duration_ms() / 1000.0
    );

    let state = player::run(Arc::new(LogInjector), config.engine_settings(), request).map_err(fail)?;
    log::info!("finished: {}", state);
    Ok(())
}

fn warn_unmapped(request: &PlaybackRequest, profile: &Path) {
    let unmapped = request.resolver.unmapped_notes(&request.events);
    if !unmapped.is_empty() {
        let names: Vec<String> = unmapped.iter().map(|&n| note_name(n)).collect();
        log::warn!(
            "{} has no mapping for {} played notes: {}",
            profile.display(),
            names.len(),
            names.join(", ")
        );
    }
}
