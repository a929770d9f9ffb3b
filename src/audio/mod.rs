//! PulseAudio routing: virtual microphone sink, application sink, loopbacks
//! and the recording-target watch.

pub mod client;
pub mod error;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod routing_machine;
pub mod shutdown;
pub mod types;

pub use client::{Listing, PulseClient};
pub use error::{AudioError, AudioResult, SelectionError};
pub use parser::{parse, ParsedBlock};
pub use registry::{ModuleRegistry, UnloadReport};
pub use resolver::{SelectionPrompt, TerminalPrompt};
pub use routing_machine::{
    RoutingMachine, RoutingOptions, RoutingPhase, RoutingSelection, RoutingSetup,
    RoutingStatusHandle, VirtualSinkSpec,
};
pub use shutdown::ShutdownHandler;
pub use types::{Candidate, ModuleKind, ModuleRecord, Sink, SinkState, Source, Stream};
