//! Thin `pactl` command layer.
//!
//! Builds command lines, checks exit status and turns listings into parsed
//! blocks. Every successfully loaded module is recorded in the
//! [`ModuleRegistry`] before the index is handed back to the caller.

use std::sync::Arc;
use tracing::{debug, info};

use super::error::{AudioError, AudioResult};
use super::parser::{parse, ParsedBlock};
use super::registry::ModuleRegistry;
use super::types::{ModuleKind, ModuleRecord};
use crate::exec::{CommandRunner, ExecOptions, ExecOutput};

const PACTL: &str = "pactl";

/// Listings understood by `pactl list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Sinks,
    SinkInputs,
    Sources,
    SourceOutputs,
}

impl Listing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Listing::Sinks => "sinks",
            Listing::SinkInputs => "sink-inputs",
            Listing::Sources => "sources",
            Listing::SourceOutputs => "source-outputs",
        }
    }
}

/// pactl cannot handle spaces in `device.description` (pulseaudio#615).
pub fn sanitize_description(description: &str) -> String {
    description.split_whitespace().collect::<Vec<_>>().join("_")
}

#[derive(Clone)]
pub struct PulseClient {
    runner: Arc<dyn CommandRunner>,
    registry: ModuleRegistry,
    verbose: bool,
}

impl PulseClient {
    pub fn new(runner: Arc<dyn CommandRunner>, registry: ModuleRegistry, verbose: bool) -> Self {
        Self {
            runner,
            registry,
            verbose,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    async fn pactl(&self, args: &str) -> AudioResult<ExecOutput> {
        let command = format!("{PACTL} {args}");
        let output = self
            .runner
            .run(&command, ExecOptions::capture(self.verbose))
            .await
            .map_err(|source| AudioError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.success {
            return Err(AudioError::CommandFailed {
                command,
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    pub async fn list(&self, listing: Listing) -> AudioResult<Vec<ParsedBlock>> {
        let output = self.pactl(&format!("list {}", listing.as_str())).await?;
        let blocks = parse(&output.output);
        debug!("pactl list {}: {} entries", listing.as_str(), blocks.len());
        Ok(blocks)
    }

    async fn load_module(&self, kind: ModuleKind, arguments: String) -> AudioResult<u32> {
        let args = format!("load-module {} {}", kind.module_name(), arguments);
        let output = self.pactl(&args).await?;

        let index = output
            .output
            .trim()
            .parse::<u32>()
            .map_err(|_| AudioError::UnexpectedOutput {
                command: format!("{PACTL} {args}"),
                output: output.output.clone(),
            })?;

        self.registry
            .record(ModuleRecord {
                index,
                kind,
                arguments,
            })
            .await;
        info!("Loaded {} as module {}", kind, index);
        Ok(index)
    }

    pub async fn load_null_sink(&self, name: &str, description: &str) -> AudioResult<u32> {
        self.load_module(
            ModuleKind::NullSink,
            format!(
                "sink_name={} sink_properties=device.description={}",
                name,
                sanitize_description(description)
            ),
        )
        .await
    }

    /// Load a sink that plays into every sink in `members`.
    ///
    /// An empty member list is rejected before anything is executed.
    pub async fn load_combined_sink(
        &self,
        name: &str,
        description: &str,
        members: &[String],
    ) -> AudioResult<u32> {
        if members.is_empty() {
            return Err(AudioError::NoCombineMembers);
        }
        self.load_module(
            ModuleKind::CombinedSink,
            format!(
                "sink_name={} slaves={} sink_properties=device.description={}",
                name,
                members.join(","),
                sanitize_description(description)
            ),
        )
        .await
    }

    /// Copy `source` into `sink`, pinned so the server never reroutes either end.
    pub async fn load_loopback(&self, source: u32, sink: u32) -> AudioResult<u32> {
        self.load_module(
            ModuleKind::Loopback,
            format!("source={source} sink={sink} sink_dont_move=true source_dont_move=true"),
        )
        .await
    }

    pub async fn move_sink_input(&self, input: u32, sink: u32) -> AudioResult<()> {
        self.pactl(&format!("move-sink-input {input} {sink}")).await?;
        Ok(())
    }

    pub async fn move_source_output(&self, output: u32, source: &str) -> AudioResult<()> {
        self.pactl(&format!("move-source-output {output} {source}"))
            .await?;
        Ok(())
    }

    pub async fn unload_module(&self, index: u32) -> AudioResult<()> {
        self.pactl(&format!("unload-module {index}")).await?;
        Ok(())
    }
}
