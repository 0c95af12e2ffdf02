use std::fmt;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_log(self) -> log::Level {
        match self {
            Level::Trace => log::Level::Trace,
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Host-provided destination for diagnostic lines.
///
/// When no sink is installed, messages go to the `log` facade so that any
/// logger the frontend initialises (e.g. `env_logger`) picks them up.
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, level: Level, target: &'static str, args: fmt::Arguments);
}

static LOG_SINK: OnceLock<Box<dyn LogSink>> = OnceLock::new();

pub fn try_set_log_sink(sink: Box<dyn LogSink>) -> Result<(), Box<dyn LogSink>> {
    LOG_SINK.set(sink)
}

pub fn has_log_sink() -> bool {
    LOG_SINK.get().is_some()
}

pub(crate) fn emit(level: Level, target: &'static str, args: fmt::Arguments) {
    if let Some(sink) = LOG_SINK.get() {
        sink.log(level, target, args);
    } else {
        log::log!(target: target, level.as_log(), "{args}");
    }
}

macro_rules! diag {
    ($level:ident, $target:expr, $($arg:tt)+) => {
        $crate::diagnostics::emit(
            $crate::diagnostics::Level::$level,
            $target,
            format_args!($($arg)+),
        )
    };
}
pub(crate) use diag;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub level: Level,
    pub target: &'static str,
    pub message: String,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level.tag(), self.target, self.message)
    }
}

/// Line-oriented record of everything reported during one operation
/// (a cartridge load, a save, ...). Every recorded line is also emitted.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Entry>,
    /// Set when the Nintendo logo does not match; the dump is likely bad.
    pub bad_dump: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, level: Level, target: &'static str, args: fmt::Arguments) {
        emit(level, target, args);
        self.entries.push(Entry {
            level,
            target,
            message: args.to_string(),
        });
    }

    pub(crate) fn info(&mut self, target: &'static str, args: fmt::Arguments) {
        self.record(Level::Info, target, args);
    }

    pub(crate) fn warn(&mut self, target: &'static str, args: fmt::Arguments) {
        self.record(Level::Warn, target, args);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.level >= Level::Warn)
    }

    /// Whether anything was reported that an operator should look at.
    pub fn needs_attention(&self) -> bool {
        self.bad_dump || self.warnings().next().is_some()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.bad_dump |= other.bad_dump;
        self.entries.extend(other.entries);
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}
