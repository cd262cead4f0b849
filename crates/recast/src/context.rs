//! Build context providing categorized log messages and performance timers
//!
//! The context is purely observational: disabling the log or the timers never
//! changes the outcome of an operation that reports through it. Accepted
//! messages are also forwarded to the `log` facade.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;
use web_time::Instant;

/// Maximum number of messages kept in the log buffer
pub const MAX_MESSAGES: usize = 1000;

/// Category of a log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Progress of a build step
    Progress,
    /// Recoverable problem
    Warning,
    /// Failure
    Error,
}

impl LogCategory {
    /// Prefix stored in front of each buffered message
    pub fn prefix(self) -> &'static str {
        match self {
            LogCategory::Progress => "PROG ",
            LogCategory::Warning => "WARN ",
            LogCategory::Error => "ERR ",
        }
    }

    fn level(self) -> log::Level {
        match self {
            LogCategory::Progress => log::Level::Info,
            LogCategory::Warning => log::Level::Warn,
            LogCategory::Error => log::Level::Error,
        }
    }
}

/// Performance timer labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerLabel {
    Total,
    Temp,
    RasterizeTriangles,
    BuildCompactHeightfield,
    BuildContours,
    BuildContoursTrace,
    BuildContoursSimplify,
    FilterBorder,
    FilterWalkable,
    MedianArea,
    FilterLowObstacles,
    BuildPolyMesh,
    MergePolyMesh,
    ErodeArea,
    MarkBoxArea,
    MarkCylinderArea,
    MarkConvexPolyArea,
    BuildDistanceField,
    BuildDistanceFieldDist,
    BuildDistanceFieldBlur,
    BuildRegions,
    BuildRegionsWatershed,
    BuildRegionsExpand,
    BuildRegionsFlood,
    BuildRegionsFilter,
    BuildLayers,
    BuildPolyMeshDetail,
    MergePolyMeshDetail,
    LoadGeometry,
}

impl TimerLabel {
    /// Number of timer labels
    pub const COUNT: usize = TimerLabel::LoadGeometry as usize + 1;
}

/// Optional logging and performance tracking for build operations
#[derive(Debug, Clone)]
pub struct BuildContext {
    start_time: [Option<Instant>; TimerLabel::COUNT],
    acc_time: [Duration; TimerLabel::COUNT],
    messages: Vec<String>,
    log_enabled: bool,
    timer_enabled: bool,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(true)
    }
}

impl BuildContext {
    /// Creates a context with logging and timers both set to `state`
    pub fn new(state: bool) -> Self {
        Self {
            start_time: [None; TimerLabel::COUNT],
            acc_time: [Duration::ZERO; TimerLabel::COUNT],
            messages: Vec::new(),
            log_enabled: state,
            timer_enabled: state,
        }
    }

    pub fn enable_log(&mut self, state: bool) {
        self.log_enabled = state;
    }

    pub fn enable_timer(&mut self, state: bool) {
        self.timer_enabled = state;
    }

    pub fn is_log_enabled(&self) -> bool {
        self.log_enabled
    }

    pub fn is_timer_enabled(&self) -> bool {
        self.timer_enabled
    }

    /// Clears all log entries, if logging is enabled
    pub fn reset_log(&mut self) {
        if self.log_enabled {
            self.messages.clear();
        }
    }

    /// Resets all timers to unused, if timers are enabled
    pub fn reset_timers(&mut self) {
        if self.timer_enabled {
            self.acc_time = [Duration::ZERO; TimerLabel::COUNT];
            self.start_time = [None; TimerLabel::COUNT];
        }
    }

    /// Writes a message in the given category
    ///
    /// The message is dropped when logging is disabled or the buffer holds
    /// [`MAX_MESSAGES`] entries.
    pub fn log(&mut self, category: LogCategory, message: impl fmt::Display) {
        if !self.log_enabled || self.messages.len() >= MAX_MESSAGES {
            return;
        }
        let text = message.to_string();
        log::log!(category.level(), "{}", text);
        self.messages.push(format!("{}{}", category.prefix(), text));
    }

    pub fn progress(&mut self, message: impl fmt::Display) {
        self.log(LogCategory::Progress, message);
    }

    pub fn warning(&mut self, message: impl fmt::Display) {
        self.log(LogCategory::Warning, message);
    }

    pub fn error(&mut self, message: impl fmt::Display) {
        self.log(LogCategory::Error, message);
    }

    pub fn log_count(&self) -> usize {
        self.messages.len()
    }

    /// Log entry at `index`, including its category prefix
    pub fn log_text(&self, index: usize) -> Option<&str> {
        self.messages.get(index).map(String::as_str)
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Writes a header line followed by every log entry
    pub fn write_log<W: Write>(&self, header: &str, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", header)?;
        for message in &self.messages {
            writeln!(out, "{}", message)?;
        }
        Ok(())
    }

    /// Prints the log to stdout, preceded by `header`
    pub fn dump_log(&self, header: &str) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_log(header, &mut out)?;
        out.flush()
    }

    pub fn start_timer(&mut self, label: TimerLabel) {
        if self.timer_enabled {
            self.start_time[label as usize] = Some(Instant::now());
        }
    }

    /// Stops a timer and adds the elapsed time to its total
    pub fn stop_timer(&mut self, label: TimerLabel) {
        if !self.timer_enabled {
            return;
        }
        if let Some(start) = self.start_time[label as usize].take() {
            self.acc_time[label as usize] += start.elapsed();
        }
    }

    /// Total accumulated time of a timer, zero when timers are disabled
    pub fn accumulated_time(&self, label: TimerLabel) -> Duration {
        if self.timer_enabled {
            self.acc_time[label as usize]
        } else {
            Duration::ZERO
        }
    }
}
