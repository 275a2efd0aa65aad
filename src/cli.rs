// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kinect")]
#[command(author, version, about = "Kinect depth sensor session tool")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Device index (default: from config, else 0)
    #[arg(short, long, global = true)]
    pub device: Option<usize>,

    /// Config file path (default: ~/.config/kinect/kinect.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Enable driver monitoring (logs every driver call at debug level)
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Monitored call category (all, lifecycle, streams, actuators)
    #[arg(long, global = true)]
    pub filter: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List attached devices
    #[command(visible_alias = "ls")]
    List,

    /// Set the LED indicator
    Led {
        /// off, green, red, yellow, blink-green, blink-red-yellow, or a code
        option: String,
    },

    /// Set the tilt motor angle
    Tilt {
        /// Angle in degrees
        #[arg(allow_hyphen_values = true)]
        degrees: f64,
    },

    /// Stream frames and report them
    Stream {
        /// Enable the depth stream
        #[arg(long)]
        depth: bool,
        /// Enable the video stream
        #[arg(long)]
        video: bool,
        /// Stop after this many frames per stream
        #[arg(short = 'n', long)]
        frames: Option<u64>,
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<f64>,
    },

    /// Run JSON-lines method calls against one session
    Script {
        /// Script file (default: stdin)
        file: Option<PathBuf>,
    },
}
