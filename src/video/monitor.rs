//! Active monitor discovery through `xrandr --listactivemonitors`.

use anyhow::{anyhow, bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Select};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::exec::{CommandRunner, ExecOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub index: u32,
    /// Output name (`DP-1`, `HDMI-A-1`, ...)
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub primary: bool,
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {}x{}+{}+{}{}",
            self.index,
            self.name,
            self.width,
            self.height,
            self.x,
            self.y,
            if self.primary { " (primary)" } else { "" }
        )
    }
}

fn monitor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+):\s+\+(\*?)(\S+)\s+(\d+)/\d+x(\d+)/\d+([+-]\d+)([+-]\d+)")
            .expect("monitor pattern is valid")
    })
}

/// Parse the output of `xrandr --listactivemonitors`, skipping lines that do
/// not describe a monitor.
pub fn parse_monitors(output: &str) -> Vec<Monitor> {
    output
        .lines()
        .filter_map(|line| {
            let caps = monitor_pattern().captures(line)?;
            Some(Monitor {
                index: caps[1].parse().ok()?,
                primary: !caps[2].is_empty(),
                name: caps[3].to_string(),
                width: caps[4].parse().ok()?,
                height: caps[5].parse().ok()?,
                x: caps[6].parse().ok()?,
                y: caps[7].parse().ok()?,
            })
        })
        .collect()
}

pub async fn list_monitors(runner: &dyn CommandRunner, verbose: bool) -> Result<Vec<Monitor>> {
    let output = runner
        .run("xrandr --listactivemonitors", ExecOptions::capture(verbose))
        .await
        .context("Failed to run xrandr")?;
    if !output.success {
        bail!("xrandr exited with status {:?}: {}", output.code, output.stderr);
    }
    Ok(parse_monitors(&output.output))
}

/// Pick the monitor to capture.
///
/// Returns `Ok(None)` when the user has to choose among several monitors.
pub fn select_monitor(monitors: &[Monitor], requested: Option<u32>) -> Result<Option<Monitor>> {
    if let Some(index) = requested {
        return monitors
            .iter()
            .find(|m| m.index == index)
            .cloned()
            .map(Some)
            .ok_or_else(|| anyhow!("Monitor {} is not active", index));
    }

    match monitors {
        [] => bail!("No active monitors found"),
        [only] => Ok(Some(only.clone())),
        _ => Ok(None),
    }
}

/// Ask on the terminal which monitor to capture.
pub async fn prompt_monitor(monitors: Vec<Monitor>) -> Result<Monitor> {
    tokio::task::spawn_blocking(move || -> Result<Monitor> {
        let labels: Vec<String> = monitors.iter().map(Monitor::to_string).collect();
        let default = monitors.iter().position(|m| m.primary).unwrap_or(0);
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Which monitor")
            .items(&labels)
            .default(default)
            .interact()?;
        Ok(monitors[choice].clone())
    })
    .await?
}
