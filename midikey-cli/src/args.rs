use std::path::PathBuf;
use std::time::Duration;

pub const USAGE: &str = "\
usage: midikey <timeline.json> <profile.json> [options]

options:
  -v, --verbose         debug logging
  --config <path>       config file instead of ~/.config/midikey/config.toml
  --tempo <x>           tempo multiplier (0.25-4.0), overrides the profile
  --transpose <n>       semitones (-24..24), overrides the profile
  --countdown <secs>    lead-in before the first note
  --print-events        print the transformed events as JSON and exit

controls while playing (type + Enter):
  p  pause / resume     s  stop     !  panic (release every key)";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliArgs {
    pub timeline: PathBuf,
    pub profile: PathBuf,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub tempo: Option<f64>,
    pub transpose: Option<i8>,
    pub countdown: Option<Duration>,
    pub print_events: bool,
}

impl CliArgs {
    /// Parse arguments (without the program name).
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = CliArgs::default();
        let mut positional = Vec::new();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("{} needs a value", name))
            };
            match arg.as_str() {
                "-v" | "--verbose" => parsed.verbose = true,
                "--print-events" => parsed.print_events = true,
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--tempo" => {
                    let v = value("--tempo")?;
                    parsed.tempo = Some(v.parse().map_err(|_| format!("invalid tempo '{}'", v))?);
                }
                "--transpose" => {
                    let v = value("--transpose")?;
                    parsed.transpose = Some(v.parse().map_err(|_| format!("invalid transpose '{}'", v))?);
                }
                "--countdown" => {
                    let v = value("--countdown")?;
                    let secs: u64 = v.parse().map_err(|_| format!("invalid countdown '{}'", v))?;
                    parsed.countdown = Some(Duration::from_secs(secs));
                }
                flag if flag.starts_with('-') => return Err(format!("unknown option {}", flag)),
                path => positional.push(PathBuf::from(path)),
            }
        }

        match <[PathBuf; 2]>::try_from(positional) {
            Ok([timeline, profile]) => {
                parsed.timeline = timeline;
                parsed.profile = profile;
                Ok(parsed)
            }
            Err(_) => Err("expected a timeline file and a profile file".to_string()),
        }
    }
}
