//! Training progress reporting.

use log::info;

/// Receives progress notifications during training.
///
/// Implementations must not influence training; every call is
/// fire-and-forget.
pub trait ProgressSink {
    /// Starts a fresh report.
    fn reset(&mut self);

    /// Sets the title shown for the current task.
    fn set_title(&mut self, title: &str);

    /// Sets the number of steps the task will report.
    fn set_max_steps(&mut self, steps: u64);

    /// Advances by one step with a short description.
    fn step(&mut self, message: &str);
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn reset(&mut self) {}
    fn set_title(&mut self, _title: &str) {}
    fn set_max_steps(&mut self, _steps: u64) {}
    fn step(&mut self, _message: &str) {}
}

/// Forwards notifications to the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct LogProgress {
    title: String,
    max_steps: u64,
    current: u64,
}

impl LogProgress {
    /// Creates a new logging sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps reported since the last reset.
    pub fn current(&self) -> u64 {
        self.current
    }
}

impl ProgressSink for LogProgress {
    fn reset(&mut self) {
        self.title.clear();
        self.max_steps = 0;
        self.current = 0;
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn set_max_steps(&mut self, steps: u64) {
        self.max_steps = steps;
    }

    fn step(&mut self, message: &str) {
        self.current += 1;
        info!("{} [{}/{}] {}", self.title, self.current, self.max_steps, message);
    }
}

/// Records every notification, for inspection in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingProgress {
    pub title: String,
    pub max_steps: u64,
    pub steps: Vec<String>,
    pub resets: usize,
}

#[cfg(test)]
impl ProgressSink for RecordingProgress {
    fn reset(&mut self) {
        self.resets += 1;
        self.steps.clear();
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn set_max_steps(&mut self, steps: u64) {
        self.max_steps = steps;
    }

    fn step(&mut self, message: &str) {
        self.steps.push(message.to_string());
    }
}
