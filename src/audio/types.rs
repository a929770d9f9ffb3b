use std::fmt;

use super::parser::ParsedBlock;

/// Sink state as printed by `pactl list sinks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Running,
    Idle,
    Suspended,
    Unknown,
}

impl SinkState {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "RUNNING" => SinkState::Running,
            "IDLE" => SinkState::Idle,
            "SUSPENDED" => SinkState::Suspended,
            _ => SinkState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sink {
    pub index: u32,
    pub name: String,
    /// Module that created the sink; hardware sinks may have none
    pub owner_module: Option<u32>,
    pub driver: String,
    pub sample_spec: String,
    pub state: SinkState,
}

impl Sink {
    pub fn from_block(block: &ParsedBlock) -> Option<Self> {
        Some(Self {
            index: block.index,
            name: block.argument("Name")?.to_string(),
            owner_module: block
                .argument("Owner Module")
                .and_then(|m| m.trim().parse().ok()),
            driver: block.argument("Driver").unwrap_or_default().to_string(),
            sample_spec: block
                .argument("Sample Specification")
                .unwrap_or_default()
                .to_string(),
            state: block
                .argument("State")
                .map(SinkState::parse)
                .unwrap_or(SinkState::Unknown),
        })
    }

    /// Name of the source that captures everything played into this sink.
    pub fn monitor_name(&self) -> String {
        format!("{}.monitor", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub index: u32,
    pub name: String,
    pub description: Option<String>,
    pub driver: String,
    /// Only set for real capture hardware
    pub udev_id: Option<String>,
    pub product_name: Option<String>,
    /// Name of the sink this source monitors, if it is a monitor
    pub monitor_of: Option<String>,
    pub device_class: Option<String>,
}

impl Source {
    pub fn from_block(block: &ParsedBlock) -> Option<Self> {
        let owned = |v: Option<&str>| v.map(str::to_string);
        Some(Self {
            index: block.index,
            name: block.argument("Name")?.to_string(),
            description: owned(block.argument("Description")),
            driver: block.argument("Driver").unwrap_or_default().to_string(),
            udev_id: owned(block.property("udev.id")),
            product_name: owned(block.property("device.product.name")),
            monitor_of: owned(block.argument("Monitor of Sink")).filter(|m| m != "n/a"),
            device_class: owned(block.property("device.class")),
        })
    }

    pub fn is_monitor(&self) -> bool {
        self.monitor_of.is_some() || self.device_class.as_deref() == Some("monitor")
    }

    pub fn is_hardware(&self) -> bool {
        self.udev_id.is_some() && !self.is_monitor() && !self.driver.contains("loopback")
    }

    pub fn display_name(&self) -> &str {
        self.product_name
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or(&self.name)
    }
}

/// A sink-input or source-output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub index: u32,
    /// Index of the sink (for sink-inputs) or source (for source-outputs)
    pub attached_to: Option<u32>,
    pub application_name: Option<String>,
    pub binary: Option<String>,
    pub media_name: Option<String>,
}

impl Stream {
    pub fn from_block(block: &ParsedBlock) -> Self {
        let owned = |v: Option<&str>| v.map(str::to_string);
        let attached_to = block
            .argument("Sink")
            .or_else(|| block.argument("Source"))
            .and_then(|v| v.trim().parse().ok());
        Self {
            index: block.index,
            attached_to,
            application_name: owned(block.property("application.name")),
            binary: owned(block.property("application.process.binary")),
            media_name: owned(block.property("media.name")),
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.application_name, &self.media_name) {
            (Some(app), Some(media)) => format!("{app} ({media})"),
            (Some(app), None) => app.clone(),
            (None, Some(media)) => media.clone(),
            (None, None) => format!("stream #{}", self.index),
        }
    }
}

/// Audio-server modules mon2cam loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    NullSink,
    CombinedSink,
    Loopback,
}

impl ModuleKind {
    pub fn module_name(&self) -> &'static str {
        match self {
            ModuleKind::NullSink => "module-null-sink",
            ModuleKind::CombinedSink => "module-combine-sink",
            ModuleKind::Loopback => "module-loopback",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.module_name())
    }
}

/// A module this process loaded and must unload on shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub index: u32,
    pub kind: ModuleKind,
    pub arguments: String,
}

/// An entry offered to the user for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub index: u32,
    pub label: String,
}
