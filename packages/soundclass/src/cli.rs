//! Command line interface for the soundclass pipeline.

use clap::{Parser, Subcommand};
use soundclass::ModelType;
use std::path::PathBuf;

/// MFCC sound classifier
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify consecutive frames of a WAV file
    Classify(ClassifyCommand),

    /// Print the MFCC cepstrogram of a WAV file as JSON
    Features(FeaturesCommand),

    /// Inspect a model file
    Inspect(InspectCommand),

    /// Write a randomly initialised model for a given input contract
    InitModel(InitModelCommand),

    /// Classify live microphone input until interrupted
    #[cfg(feature = "microphone")]
    Listen(ListenCommand),

    /// Record a labelled training clip from the microphone
    #[cfg(feature = "microphone")]
    Record(RecordCommand),

    /// List audio input devices
    #[cfg(feature = "microphone")]
    ListDevices,
}

#[derive(Parser, Debug)]
pub struct ClassifyCommand {
    /// Model file (falls back to `classifier.model_path` in the config)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Mono 16-bit or float WAV input
    pub wav: PathBuf,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    pub cycles: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct FeaturesCommand {
    /// Mono WAV input
    pub wav: PathBuf,

    /// Subtract the per-coefficient mean across windows
    #[arg(long, default_value_t = false)]
    pub cmn: bool,
}

#[derive(Parser, Debug)]
pub struct InspectCommand {
    /// Path to the model file
    pub model_path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct InitModelCommand {
    /// Output path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Network size (tiny, small, medium)
    #[arg(short, long, default_value = "tiny")]
    pub model_type: ModelType,

    /// Comma separated class names (defaults to the configured labels)
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Expect int8-quantised inputs
    #[arg(long, default_value_t = false)]
    pub int8: bool,

    /// Quantisation scale for --int8
    #[arg(long, default_value_t = 1.0 / 255.0)]
    pub scale: f32,

    /// Quantisation zero point for --int8
    #[arg(long, default_value_t = -128, allow_negative_numbers = true)]
    pub zero_point: i32,
}

#[cfg(feature = "microphone")]
#[derive(Parser, Debug)]
pub struct ListenCommand {
    /// Model file (falls back to `classifier.model_path` in the config)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Audio device to use (see list-devices)
    #[arg(short, long)]
    pub device: Option<String>,
}

#[cfg(feature = "microphone")]
#[derive(Parser, Debug)]
pub struct RecordCommand {
    /// Class the clip belongs to; becomes the sub-directory name
    pub category: String,

    /// Audio device to use (see list-devices)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Clip length in seconds (defaults to the configured duration)
    #[arg(short, long)]
    pub seconds: Option<u32>,
}
