//! Logger configuration.

/// Configuration for opening a [`crate::Logger`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the log directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to hold an advisory `LOCK` file for the logger's lifetime.
    pub lock_directory: bool,

    /// Size in bytes above which the active log is rotated and compacted
    /// (0 = never rotate).
    pub max_log_size: u64,

    /// Whether to fsync after every append (safer but slower). Closing a
    /// log always syncs.
    pub sync_on_append: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            lock_directory: true,
            max_log_size: 0,
            sync_on_append: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to lock the directory.
    #[must_use]
    pub const fn lock_directory(mut self, value: bool) -> Self {
        self.lock_directory = value;
        self
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub const fn max_log_size(mut self, size: u64) -> Self {
        self.max_log_size = size;
        self
    }

    /// Sets whether to fsync every append.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }
}
