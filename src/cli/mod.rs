use crate::audio::RoutingOptions;
use crate::config::Config;
use crate::exec::{ensure_tools, SystemRunner};
use crate::video::{self, CameraOptions};
use anyhow::Result;

pub mod args;

pub use args::{Cli, CliCommand};

/// User choices after merging the config file with command line flags.
#[derive(Debug, Clone)]
pub struct Options {
    pub camera: CameraOptions,
    pub routing: RoutingOptions,
    pub monitor: Option<u32>,
    pub sound: bool,
    pub camera_enabled: bool,
    pub force_wayland: bool,
    pub verbose: bool,
}

impl Options {
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        let mut camera = config.video.camera_options();
        if let Some(framerate) = cli.framerate {
            camera.framerate = framerate;
        }
        if let Some(device) = cli.device {
            camera.device = device;
        }
        camera.resolution = cli.resolution.clone();
        camera.vflip = cli.vflip;
        camera.hflip = cli.hflip;
        camera.border |= cli.border;
        if let Ok(display) = std::env::var("DISPLAY") {
            if !display.is_empty() {
                camera.display = display;
            }
        }

        let mut routing = config.audio.routing_options();
        if let Some(target) = cli.record_app.as_deref().map(str::trim) {
            routing.recording_target = (!target.is_empty()).then(|| target.to_string());
        }

        Self {
            camera,
            routing,
            monitor: cli.monitor,
            sound: cli.sound,
            camera_enabled: !cli.no_camera,
            force_wayland: cli.wayland,
            verbose: cli.verbose,
        }
    }
}

pub async fn handle_monitors_command(verbose: bool) -> Result<()> {
    ensure_tools(&["xrandr"])?;
    let monitors = video::list_monitors(&SystemRunner, verbose).await?;

    if monitors.is_empty() {
        println!("No active monitors found.");
        return Ok(());
    }

    for monitor in monitors {
        println!("{monitor}");
    }
    Ok(())
}
