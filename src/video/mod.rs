//! Virtual camera: v4l2loopback device, display server detection, monitor
//! selection and the capture process.

pub mod capture;
pub mod monitor;

pub use capture::CaptureCommand;
pub use monitor::{list_monitors, parse_monitors, prompt_monitor, select_monitor, Monitor};

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::exec::{CommandRunner, ExecOptions, OutputMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoBackend {
    X11,
    Wayland,
}

impl VideoBackend {
    /// Binary that performs the capture on this backend.
    pub fn capture_tool(&self) -> &'static str {
        match self {
            VideoBackend::X11 => "ffmpeg",
            VideoBackend::Wayland => "wf-recorder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraOptions {
    pub framerate: u32,
    /// Number of the `/dev/video<N>` loopback device
    pub device: u32,
    pub card_label: String,
    /// Output size as `W:H`
    pub resolution: Option<String>,
    pub vflip: bool,
    pub hflip: bool,
    /// Keep the aspect ratio when scaling and pad the rest
    pub border: bool,
    /// X display to grab from
    pub display: String,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            framerate: 60,
            device: 50,
            card_label: "Mon2Cam".to_string(),
            resolution: None,
            vflip: false,
            hflip: false,
            border: false,
            display: ":0.0".to_string(),
        }
    }
}

impl CameraOptions {
    pub fn device_path(&self) -> String {
        format!("/dev/video{}", self.device)
    }
}

/// Wayland when forced or when `xisxwayland` says the X server is Xwayland.
pub async fn detect_backend(runner: &dyn CommandRunner, force_wayland: bool) -> VideoBackend {
    if force_wayland {
        return VideoBackend::Wayland;
    }

    match runner.run("xisxwayland", ExecOptions::quiet()).await {
        Ok(output) if output.success => {
            info!("Xwayland detected, using the Wayland backend");
            VideoBackend::Wayland
        }
        Ok(_) => VideoBackend::X11,
        Err(e) => {
            debug!("xisxwayland unavailable ({}), assuming X11", e);
            VideoBackend::X11
        }
    }
}

/// Make sure `/dev/video<device>` exists, (re)loading v4l2loopback if needed.
pub async fn ensure_loopback_device(
    runner: &dyn CommandRunner,
    options: &CameraOptions,
    verbose: bool,
) -> Result<()> {
    let path = options.device_path();
    if Path::new(&path).exists() {
        debug!("{} already present", path);
        return Ok(());
    }

    let exec = ExecOptions {
        output: if verbose { OutputMode::Tee } else { OutputMode::Capture },
        verbose,
    };

    info!("{} not found, loading v4l2loopback", path);
    match runner.run("sudo modprobe -r v4l2loopback", exec).await {
        Ok(output) if !output.success => {
            warn!("Unloading v4l2loopback failed: {}", output.stderr);
        }
        Err(e) => warn!("Unloading v4l2loopback failed: {}", e),
        _ => {}
    }

    let command = format!(
        "sudo modprobe v4l2loopback video_nr={} card_label={}",
        options.device,
        options.card_label.replace(char::is_whitespace, "_")
    );
    let output = runner
        .run(&command, exec)
        .await
        .with_context(|| format!("Failed to run `{command}`"))?;
    if !output.success {
        bail!(
            "`{}` failed with status {:?}: {}",
            command,
            output.code,
            output.stderr
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::{failed, ok, FakeRunner};

    #[tokio::test]
    async fn test_detect_backend() {
        let wayland = FakeRunner::new();
        wayland.reply("xisxwayland", ok(""));
        assert_eq!(detect_backend(&wayland, false).await, VideoBackend::Wayland);

        let x11 = FakeRunner::new();
        x11.reply("xisxwayland", failed(1));
        assert_eq!(detect_backend(&x11, false).await, VideoBackend::X11);

        let missing = FakeRunner::new();
        assert_eq!(detect_backend(&missing, false).await, VideoBackend::X11);
        assert_eq!(detect_backend(&missing, true).await, VideoBackend::Wayland);
        assert_eq!(missing.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_loopback_device_is_loaded_when_missing() {
        let runner = FakeRunner::new();
        runner
            .reply("sudo modprobe -r", failed(1))
            .reply("sudo modprobe v4l2loopback", ok(""));
        let options = CameraOptions {
            device: 9999,
            card_label: "Mon 2 Cam".to_string(),
            ..Default::default()
        };

        ensure_loopback_device(&runner, &options, false).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "sudo modprobe -r v4l2loopback",
                "sudo modprobe v4l2loopback video_nr=9999 card_label=Mon_2_Cam"
            ]
        );
    }

    #[tokio::test]
    async fn test_loopback_load_failure_is_an_error() {
        let runner = FakeRunner::new();
        runner.reply("sudo modprobe", failed(1));
        let options = CameraOptions {
            device: 9998,
            ..Default::default()
        };

        assert!(ensure_loopback_device(&runner, &options, false).await.is_err());
    }
}
