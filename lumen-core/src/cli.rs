use clap::{Parser, ValueEnum};
use log::LevelFilter;

/// Log level options for command-line argument.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

/// Graphics backend selectable from the command line.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum BackendArg {
    #[default]
    Vulkan,
    Headless,
}

/// Presentation mode selectable from the command line.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum PresentModeArg {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

/// Common command-line arguments for Lumen applications.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct EngineArgs {
    /// Set the log verbosity level
    #[arg(short = 'l', long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Graphics backend used to render
    #[arg(short = 'b', long = "backend", value_enum, default_value_t = BackendArg::Vulkan)]
    pub backend: BackendArg,

    /// Enable backend validation layers
    #[arg(long = "validation")]
    pub validation: bool,

    /// Number of frames the CPU may record ahead of the GPU
    #[arg(long = "frames-in-flight", default_value_t = 2)]
    pub frames_in_flight: u32,

    /// Swapchain presentation mode
    #[arg(long = "present-mode", value_enum, default_value_t = PresentModeArg::Fifo)]
    pub present_mode: PresentModeArg,

    /// Serve puffin profiling data
    #[arg(long = "profile")]
    pub profile: bool,

    /// Initial window width
    #[arg(long = "width", default_value_t = 1280)]
    pub width: u32,

    /// Initial window height
    #[arg(long = "height", default_value_t = 720)]
    pub height: u32,

    /// Additional positional arguments passed to the application
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

impl EngineArgs {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
