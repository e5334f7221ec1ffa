use std::env;
use std::fmt::Display;

use colored::Colorize;
use log::{Level, LevelFilter};

/// Logs from dependencies are only interesting when something is wrong
const EXTERNAL_LEVEL: Level = Level::Warn;

pub fn init_logger() {
    let local_level = local_level_filter();

    fern::Dispatch::new()
        .format(|out, message, record| {
            let target = Target::of(record.target());
            let time = chrono::Local::now().format("%H:%M:%S");

            out.finish(format_args!(
                "{} {:<5} {:^8} {}",
                time.to_string().bright_black(),
                badge(record.level()),
                target,
                message
            ))
        })
        .filter(move |meta| {
            let target = Target::of(meta.target());

            if target.is_local() {
                meta.level() <= local_level
            } else {
                meta.level() <= EXTERNAL_LEVEL
            }
        })
        .chain(std::io::stdout())
        .apply()
        .expect("logging is initialized")
}

/// Local crates log at info by default. MATINEE_LOG=debug opts into
/// the chatty internals of the sync and lifecycle loops.
fn local_level_filter() -> LevelFilter {
    match env::var("MATINEE_LOG").as_deref() {
        Ok("trace") => LevelFilter::Trace,
        Ok("debug") => LevelFilter::Debug,
        _ => LevelFilter::Info,
    }
}

enum Target {
    External(String),
    Main,
    Server,
    Collab,
    Core,
}

impl Target {
    fn of(raw: &str) -> Self {
        let module = raw.split_once("::").map_or(raw, |(head, _)| head);

        match module {
            "matinee" => Self::Main,
            "matinee_core" => Self::Core,
            "matinee_server" => Self::Server,
            "matinee_collab" => Self::Collab,
            other => Self::External(other.to_string()),
        }
    }

    fn is_local(&self) -> bool {
        !matches!(self, Self::External(_))
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::External(name) => return Display::fmt(name, f),
            Self::Main => "main".bright_cyan(),
            Self::Server => "server".bright_green(),
            Self::Collab => "collab".bright_purple(),
            Self::Core => "core".blue(),
        };

        Display::fmt(&label, f)
    }
}

fn badge(level: Level) -> colored::ColoredString {
    match level {
        Level::Error => "ERROR".red().bold(),
        Level::Warn => "WARN".yellow().bold(),
        Level::Info => "INFO".blue(),
        Level::Debug => "DEBUG".bright_black(),
        Level::Trace => "TRACE".normal(),
    }
}
