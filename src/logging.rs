use std::{env, fmt::Display};

use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, SetLoggerError};

/// Set to "debug" to see votes, skip votes, and quota refusals
const VERBOSITY_VAR: &str = "GROOVE_LOG";

pub fn init_logger() -> Result<(), SetLoggerError> {
    let local_level = match env::var(VERBOSITY_VAR).as_deref() {
        Ok("debug") => LevelFilter::Debug,
        Ok("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_badge(record.level()),
                chrono::Local::now().format("%H:%M:%S").to_string().bright_black(),
                Area::of(record.target()),
                message
            ))
        })
        .filter(move |meta| {
            let ceiling = if Area::of(meta.target()).is_local() {
                local_level
            } else {
                // Dependencies only get to warn
                LevelFilter::Warn
            };

            meta.level() <= ceiling
        })
        .chain(std::io::stdout())
        .apply()
}

/// The part of groove a log line comes from
#[derive(Debug, PartialEq, Eq)]
enum Area {
    External(String),
    Groove,
    Core,
    Rooms,
    Queue,
    Auth,
    Store,
    Catalog,
    Collab,
}

impl Area {
    fn of(target: &str) -> Self {
        let mut path = target.split("::");

        match (path.next().unwrap_or_default(), path.next()) {
            ("groove", _) => Self::Groove,
            ("groove_core", _) => Self::Core,
            ("groove_collab", Some("rooms")) => Self::Rooms,
            ("groove_collab", Some("queues" | "quota")) => Self::Queue,
            ("groove_collab", Some("auth")) => Self::Auth,
            ("groove_collab", Some("db")) => Self::Store,
            ("groove_collab", Some("catalog")) => Self::Catalog,
            ("groove_collab", _) => Self::Collab,
            (other, _) => Self::External(other.to_string()),
        }
    }

    fn is_local(&self) -> bool {
        !matches!(self, Self::External(_))
    }

    fn label(&self) -> ColoredString {
        match self {
            Area::External(name) => name.as_str().clear(),
            Area::Groove => "GROOVE".bright_green(),
            Area::Core => "CORE".blue(),
            Area::Rooms => "ROOMS".bright_purple(),
            Area::Queue => "QUEUE".bright_cyan(),
            Area::Auth => "AUTH".yellow(),
            Area::Store => "STORE".bright_blue(),
            Area::Catalog => "CATALOG".magenta(),
            Area::Collab => "COLLAB".purple(),
        }
    }
}

impl Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.label(), f)
    }
}

fn level_badge(level: Level) -> ColoredString {
    match level {
        Level::Error => " ERR ".black().on_red().bold(),
        Level::Warn => " WRN ".black().on_yellow().bold(),
        Level::Info => " INF ".black().on_blue().bold(),
        Level::Debug => " DBG ".white().on_black(),
        Level::Trace => " TRC ".clear(),
    }
}

#[cfg(test)]
mod test {
    use super::Area;

    #[test]
    fn targets_map_to_areas() {
        assert_eq!(Area::of("groove_collab::rooms::snapshot"), Area::Rooms);
        assert_eq!(Area::of("groove_collab::queues::skip"), Area::Queue);
        assert_eq!(Area::of("groove_collab::db::pg"), Area::Store);
        assert_eq!(Area::of("groove_collab"), Area::Collab);
        assert_eq!(Area::of("groove_core"), Area::Core);
        assert_eq!(Area::of("groove"), Area::Groove);
    }

    #[test]
    fn dependencies_are_external() {
        let area = Area::of("sqlx::query");

        assert_eq!(area, Area::External("sqlx".to_string()));
        assert!(!area.is_local());
    }
}
