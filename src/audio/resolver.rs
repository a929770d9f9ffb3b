//! Lookups against the audio server and interactive selection of streams
//! and capture devices.

use async_trait::async_trait;
use dialoguer::Input;
use std::collections::HashSet;
use tracing::{debug, info};

use super::client::{Listing, PulseClient};
use super::error::{AudioError, AudioResult, SelectionError};
use super::parser::ParsedBlock;
use super::types::{Candidate, Sink, Source, Stream};

/// Find the sink created by `module`.
///
/// `Ok(None)` means the sink is not listed yet; the module may still be
/// initialising.
pub async fn resolve_sink_by_owning_module(
    client: &PulseClient,
    module: u32,
) -> AudioResult<Option<Sink>> {
    let blocks = client.list(Listing::Sinks).await?;
    Ok(blocks
        .iter()
        .filter(|block| {
            block
                .argument("Owner Module")
                .and_then(|m| m.trim().parse::<u32>().ok())
                == Some(module)
        })
        .find_map(Sink::from_block))
}

/// Sink-inputs that belong to a named application.
pub fn application_candidates(blocks: &[ParsedBlock]) -> Vec<Candidate> {
    blocks
        .iter()
        .map(Stream::from_block)
        .filter(|stream| stream.application_name.is_some())
        .map(|stream| Candidate {
            index: stream.index,
            label: stream.display_name(),
        })
        .collect()
}

/// Real capture hardware, without monitors or loopback sources.
pub fn hardware_source_candidates(blocks: &[ParsedBlock]) -> Vec<Candidate> {
    blocks
        .iter()
        .filter_map(Source::from_block)
        .filter(Source::is_hardware)
        .map(|source| Candidate {
            index: source.index,
            label: source.display_name().to_string(),
        })
        .collect()
}

/// Validate a line of whitespace separated indices against `candidates`.
pub fn parse_selection(line: &str, candidates: &[Candidate]) -> Result<Vec<u32>, SelectionError> {
    let allowed: HashSet<u32> = candidates.iter().map(|c| c.index).collect();
    let mut seen = HashSet::new();
    let mut selection = Vec::new();

    for token in line.split_whitespace() {
        let index: u32 = token
            .parse()
            .map_err(|_| SelectionError::NotANumber(token.to_string()))?;
        if !allowed.contains(&index) {
            return Err(SelectionError::UnknownIndex(index));
        }
        if seen.insert(index) {
            selection.push(index);
        }
    }

    Ok(selection)
}

/// Reads one line of input from the user.
#[async_trait]
pub trait SelectionPrompt: Send + Sync {
    async fn read_line(&self, prompt: &str) -> AudioResult<String>;
}

/// Reads from the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl SelectionPrompt for TerminalPrompt {
    async fn read_line(&self, prompt: &str) -> AudioResult<String> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        })
        .await
        .map_err(|e| AudioError::Prompt(e.to_string()))?
        .map_err(|e| AudioError::Prompt(e.to_string()))
    }
}

/// Print `candidates` and let the user pick any number of them.
///
/// An empty answer is a valid, empty selection. Without candidates nothing is
/// asked.
pub async fn present_and_select(
    candidates: &[Candidate],
    prompt: &str,
    reader: &dyn SelectionPrompt,
) -> AudioResult<Vec<u32>> {
    if candidates.is_empty() {
        info!("Nothing to choose from for: {}", prompt);
        return Ok(Vec::new());
    }

    println!("{prompt}");
    for candidate in candidates {
        println!("  [{}] {}", candidate.index, candidate.label);
    }

    let line = reader
        .read_line("Indices (space separated, empty for none)")
        .await?;
    let selection = parse_selection(&line, candidates)?;
    debug!("Selected {:?}", selection);
    Ok(selection)
}
