use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mon2cam")]
#[command(about = "Mon2Cam - Monitor 2 Camera", long_about = None)]
#[command(after_help = "To find out more, visit https://github.com/shaybox/mon2cam")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Set framerate
    #[arg(short, long)]
    pub framerate: Option<u32>,

    /// Set device number (/dev/video<N>)
    #[arg(short, long)]
    pub device: Option<u32>,

    /// Set monitor number (as listed by `mon2cam monitors`)
    #[arg(short, long)]
    pub monitor: Option<u32>,

    /// Set output resolution (W:H)
    #[arg(short, long, value_parser = parse_resolution)]
    pub resolution: Option<String>,

    /// Vertically flip the camera
    #[arg(long)]
    pub vflip: bool,

    /// Horizontally flip the camera
    #[arg(long)]
    pub hflip: bool,

    /// Add border when scaling to avoid stretching
    #[arg(short, long)]
    pub border: bool,

    /// Create virtual sinks and route sound into them
    #[arg(short, long)]
    pub sound: bool,

    /// Force the Wayland backend (useful when it is not detected)
    #[arg(short, long)]
    pub wayland: bool,

    /// Recording application whose input is pinned to the virtual microphone
    #[arg(long, value_name = "BINARY")]
    pub record_app: Option<String>,

    /// Only set up audio routing, without the virtual camera
    #[arg(long, requires = "sound")]
    pub no_camera: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// List active monitors
    Monitors,
}

fn parse_resolution(raw: &str) -> Result<String, String> {
    let (width, height) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected W:H, got '{raw}'"))?;
    for part in [width, height] {
        part.parse::<u32>()
            .map_err(|_| format!("'{part}' is not a valid dimension"))?;
    }
    Ok(raw.to_string())
}
