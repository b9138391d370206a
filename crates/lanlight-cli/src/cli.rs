//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// lanlight - discover and control UDP lights on the local network
#[derive(Parser, Debug)]
#[command(name = "lanlight")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Per-attempt reply timeout in milliseconds
    #[arg(long, global = true, default_value = "500", env = "LANLIGHT_TIMEOUT")]
    pub timeout: u64,

    /// Transmissions per request before a device counts as unreachable
    #[arg(long, global = true, default_value = "3", env = "LANLIGHT_ATTEMPTS")]
    pub attempts: u32,

    /// Talk to devices over IPv6 using MAC-derived addresses in this prefix
    /// (four groups, e.g. fe80:0000:0000:0000)
    #[arg(long, global = true, env = "LANLIGHT_IPV6_PREFIX")]
    pub ipv6_prefix: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Exit non-zero if any targeted device fails
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover devices on the network
    Discover(DiscoverArgs),

    /// Show detailed device information
    Info(InfoArgs),

    /// Switch devices on or off
    Power(PowerArgs),

    /// Set device color
    Color(ColorArgs),

    /// Run a waveform effect
    Waveform(WaveformArgs),

    /// Rename a device
    Label(LabelArgs),
}

// ==================== Targets ====================

/// Device selection shared by every command acting on devices.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Only devices in this group
    #[arg(long)]
    pub group: Option<String>,

    /// Only devices with this label
    #[arg(long)]
    pub label: Option<String>,

    /// Only the device with this MAC address
    #[arg(long)]
    pub mac: Option<String>,

    /// Discovery duration (seconds)
    #[arg(long, default_value = "3")]
    pub discovery_duration: u64,
}

// ==================== Discover ====================

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Watch mode - keep discovering and reprint on every change
    #[arg(short, long)]
    pub watch: bool,

    /// Discovery duration in seconds (ignored in watch mode)
    #[arg(short, long, default_value = "5")]
    pub duration: u64,
}

// ==================== Info ====================

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Also query host clock and wifi statistics
    #[arg(long)]
    pub extended: bool,
}

// ==================== Power ====================

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

#[derive(Args, Debug)]
pub struct PowerArgs {
    /// Desired power state
    #[arg(value_enum)]
    pub state: PowerState,

    /// Fade duration in milliseconds (uses the light power message)
    #[arg(long)]
    pub duration: Option<u32>,

    /// Don't wait for acknowledgements
    #[arg(long)]
    pub rapid: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

// ==================== Color ====================

#[derive(Args, Debug)]
pub struct ColorArgs {
    /// Hue (0-65535)
    pub hue: u16,

    /// Saturation (0-65535)
    pub saturation: u16,

    /// Brightness (0-65535)
    pub brightness: u16,

    /// Color temperature in kelvin
    #[arg(long, default_value = "3500")]
    pub kelvin: u16,

    /// Transition duration in milliseconds
    #[arg(long, default_value = "0")]
    pub duration: u32,

    /// Don't wait for acknowledgements
    #[arg(long)]
    pub rapid: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

// ==================== Waveform ====================

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveformArg {
    Saw,
    Sine,
    HalfSine,
    Triangle,
    Pulse,
}

#[derive(Args, Debug)]
pub struct WaveformArgs {
    /// Waveform shape
    #[arg(value_enum)]
    pub kind: WaveformArg,

    /// Hue (0-65535)
    pub hue: u16,

    /// Saturation (0-65535)
    pub saturation: u16,

    /// Brightness (0-65535)
    pub brightness: u16,

    /// Color temperature in kelvin
    #[arg(long, default_value = "3500")]
    pub kelvin: u16,

    /// Cycle period in milliseconds
    #[arg(long, default_value = "1000")]
    pub period: u32,

    /// Number of cycles
    #[arg(long, default_value = "3")]
    pub cycles: f32,

    /// Skew ratio (-32768 to 32767)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub skew: i16,

    /// Stay on the waveform color when finished
    #[arg(long)]
    pub persist: bool,

    /// Don't wait for acknowledgements
    #[arg(long)]
    pub rapid: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

// ==================== Label ====================

#[derive(Args, Debug)]
pub struct LabelArgs {
    /// MAC address of the device to rename
    pub mac: String,

    /// New label (truncated to 32 bytes)
    pub label: String,

    /// Discovery duration (seconds)
    #[arg(long, default_value = "3")]
    pub discovery_duration: u64,
}
