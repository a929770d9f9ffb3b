//! Screen capture process feeding the v4l2loopback device.

use std::io;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::info;

use super::monitor::Monitor;
use super::{CameraOptions, VideoBackend};

/// A fully built capture command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// ffmpeg filter chain for the requested transforms, if any.
pub fn filter_chain(options: &CameraOptions) -> Option<String> {
    let mut filters = Vec::new();

    if let Some(resolution) = &options.resolution {
        if options.border {
            filters.push(format!(
                "scale={resolution}:force_original_aspect_ratio=decrease"
            ));
            filters.push(format!("pad={resolution}:(ow-iw)/2:(oh-ih)/2"));
        } else {
            filters.push(format!("scale={resolution}"));
        }
    }
    if options.vflip {
        filters.push("vflip".to_string());
    }
    if options.hflip {
        filters.push("hflip".to_string());
    }

    (!filters.is_empty()).then(|| filters.join(","))
}

impl CaptureCommand {
    pub fn build(backend: VideoBackend, monitor: &Monitor, options: &CameraOptions) -> Self {
        let device = options.device_path();
        let filters = filter_chain(options);

        match backend {
            VideoBackend::X11 => {
                let mut args = vec![
                    "-f".to_string(),
                    "x11grab".to_string(),
                    "-framerate".to_string(),
                    options.framerate.to_string(),
                    "-video_size".to_string(),
                    format!("{}x{}", monitor.width, monitor.height),
                    "-i".to_string(),
                    format!("{}+{},{}", options.display, monitor.x, monitor.y),
                ];
                if let Some(filters) = filters {
                    args.push("-vf".to_string());
                    args.push(filters);
                }
                args.extend(
                    [
                        "-vcodec",
                        "rawvideo",
                        "-pix_fmt",
                        "yuv420p",
                        "-f",
                        "v4l2",
                    ]
                    .map(str::to_string),
                );
                args.push(device);
                Self {
                    program: "ffmpeg".to_string(),
                    args,
                }
            }
            VideoBackend::Wayland => {
                let mut args = Vec::new();
                // Older Xwayland names outputs XWAYLAND<n>, which wf-recorder
                // does not know; let it pick the output itself.
                if !monitor.name.starts_with("XWAYLAND") {
                    args.push("-o".to_string());
                    args.push(monitor.name.clone());
                }
                args.extend([
                    "--muxer=v4l2".to_string(),
                    "--codec=rawvideo".to_string(),
                    "--pixel-format=yuv420p".to_string(),
                    format!("--framerate={}", options.framerate),
                ]);
                if let Some(filters) = filters {
                    args.push("-F".to_string());
                    args.push(filters);
                }
                args.push(format!("--file={device}"));
                Self {
                    program: "wf-recorder".to_string(),
                    args,
                }
            }
        }
    }

    /// Start the capture process. It is killed when the returned child is dropped.
    pub fn spawn(&self, verbose: bool) -> io::Result<Child> {
        info!("Starting capture: {} {}", self.program, self.args.join(" "));
        let output = || if verbose { Stdio::inherit() } else { Stdio::null() };
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
    }
}
