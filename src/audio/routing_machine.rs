//! Audio routing orchestrator.
//!
//! Setup runs strictly in order:
//! select → mic sink → combined sink → move streams → loopbacks,
//! after which a cancellable watch task keeps the recording application's
//! input pinned to the mic sink's monitor.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{Listing, PulseClient};
use super::error::{AudioError, AudioResult};
use super::resolver::{
    application_candidates, hardware_source_candidates, present_and_select,
    resolve_sink_by_owning_module, SelectionPrompt,
};
use super::types::{Sink, Stream};

const RESOLVE_ATTEMPTS: u32 = 5;
const RESOLVE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingPhase {
    Init,
    SelectingApplications,
    SelectingSources,
    CreatingMicSink,
    CreatingCombinedSink,
    SkipCombinedSink,
    MovingStreams,
    CreatingLoopbacks,
    WatchingRecordingTarget,
    ShuttingDown,
    Terminated,
}

impl RoutingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingPhase::Init => "init",
            RoutingPhase::SelectingApplications => "selecting-applications",
            RoutingPhase::SelectingSources => "selecting-sources",
            RoutingPhase::CreatingMicSink => "creating-mic-sink",
            RoutingPhase::CreatingCombinedSink => "creating-combined-sink",
            RoutingPhase::SkipCombinedSink => "skip-combined-sink",
            RoutingPhase::MovingStreams => "moving-streams",
            RoutingPhase::CreatingLoopbacks => "creating-loopbacks",
            RoutingPhase::WatchingRecordingTarget => "watching-recording-target",
            RoutingPhase::ShuttingDown => "shutting-down",
            RoutingPhase::Terminated => "terminated",
        }
    }
}

#[derive(Clone)]
pub struct RoutingStatusHandle {
    inner: Arc<Mutex<RoutingPhase>>,
}

impl Default for RoutingStatusHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RoutingPhase::Init)),
        }
    }
}

impl RoutingStatusHandle {
    pub async fn get(&self) -> RoutingPhase {
        *self.inner.lock().await
    }

    pub async fn set(&self, phase: RoutingPhase) {
        debug!("Routing phase: {}", phase.as_str());
        *self.inner.lock().await = phase;
    }
}

/// A sink mon2cam creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualSinkSpec {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct RoutingOptions {
    pub mic_sink: VirtualSinkSpec,
    pub app_sink: VirtualSinkSpec,
    /// Sink the combined sink mirrors to besides the mic sink
    pub default_sink: String,
    /// `application.process.binary` of the recording application to pin
    pub recording_target: Option<String>,
    pub watch_interval: Duration,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            mic_sink: VirtualSinkSpec {
                name: "VirtualSinkMIC".to_string(),
                description: "Mon2Cam_microphone_sink".to_string(),
            },
            app_sink: VirtualSinkSpec {
                name: "VirtualSinkAPP".to_string(),
                description: "Mon2Cam_application_sink".to_string(),
            },
            default_sink: "@DEFAULT_SINK@".to_string(),
            recording_target: Some("Discord".to_string()),
            watch_interval: Duration::from_secs(2),
        }
    }
}

/// What the user chose to route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingSelection {
    /// Sink-input indices to move into the combined sink
    pub applications: Vec<u32>,
    /// Source indices to loop back into the mic sink
    pub sources: Vec<u32>,
}

impl RoutingSelection {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty() && self.sources.is_empty()
    }
}

/// Devices created by a completed setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSetup {
    pub mic_sink: Sink,
    pub app_sink: Option<Sink>,
    pub moved_streams: Vec<u32>,
    pub loopbacks: Vec<u32>,
}

pub struct RoutingMachine {
    client: PulseClient,
    prompt: Box<dyn SelectionPrompt>,
    options: RoutingOptions,
    status: RoutingStatusHandle,
}

impl RoutingMachine {
    pub fn new(
        client: PulseClient,
        prompt: Box<dyn SelectionPrompt>,
        options: RoutingOptions,
        status: RoutingStatusHandle,
    ) -> Self {
        Self {
            client,
            prompt,
            options,
            status,
        }
    }

    pub fn status(&self) -> &RoutingStatusHandle {
        &self.status
    }

    /// Ask the user which application streams and capture devices to route.
    pub async fn select(&self) -> AudioResult<RoutingSelection> {
        self.status.set(RoutingPhase::SelectingApplications).await;
        let inputs = self.client.list(Listing::SinkInputs).await?;
        let applications = present_and_select(
            &application_candidates(&inputs),
            "Applications to route into the virtual microphone:",
            self.prompt.as_ref(),
        )
        .await?;

        self.status.set(RoutingPhase::SelectingSources).await;
        let sources = self.client.list(Listing::Sources).await?;
        let sources = present_and_select(
            &hardware_source_candidates(&sources),
            "Capture devices to route into the virtual microphone:",
            self.prompt.as_ref(),
        )
        .await?;

        let selection = RoutingSelection {
            applications,
            sources,
        };
        if selection.is_empty() {
            warn!("No applications or devices selected; only the virtual microphone sink will be created");
        }
        Ok(selection)
    }

    /// Create the sinks, move the selected streams and loop back the selected
    /// sources. The first failing command aborts setup; modules created
    /// before it stay in the registry for shutdown.
    ///
    /// `cancel` is checked between commands and never interrupts one, so a
    /// module the server loaded is always recorded before this returns
    /// [`AudioError::Interrupted`].
    pub async fn apply(
        &self,
        selection: &RoutingSelection,
        cancel: &CancellationToken,
    ) -> AudioResult<RoutingSetup> {
        checkpoint(cancel)?;
        self.status.set(RoutingPhase::CreatingMicSink).await;
        let mic = &self.options.mic_sink;
        let mic_module = self
            .client
            .load_null_sink(&mic.name, &mic.description)
            .await?;
        let mic_sink = self.resolve_sink(mic_module).await?;
        info!("Virtual microphone sink ready: {} (#{})", mic_sink.name, mic_sink.index);

        let app_sink = if selection.applications.is_empty() {
            self.status.set(RoutingPhase::SkipCombinedSink).await;
            None
        } else {
            checkpoint(cancel)?;
            self.status.set(RoutingPhase::CreatingCombinedSink).await;
            let app = &self.options.app_sink;
            let members = vec![mic_sink.name.clone(), self.options.default_sink.clone()];
            let module = self
                .client
                .load_combined_sink(&app.name, &app.description, &members)
                .await?;
            let sink = self.resolve_sink(module).await?;
            info!("Application sink ready: {} (#{})", sink.name, sink.index);
            Some(sink)
        };

        self.status.set(RoutingPhase::MovingStreams).await;
        let mut moved_streams = Vec::new();
        if let Some(target) = &app_sink {
            for &input in &selection.applications {
                checkpoint(cancel)?;
                self.client.move_sink_input(input, target.index).await?;
                debug!("Moved sink-input {} to {}", input, target.name);
                moved_streams.push(input);
            }
        }

        self.status.set(RoutingPhase::CreatingLoopbacks).await;
        let mut loopbacks = Vec::new();
        for &source in &selection.sources {
            checkpoint(cancel)?;
            let module = self.client.load_loopback(source, mic_sink.index).await?;
            debug!("Source {} looped into {} via module {}", source, mic_sink.name, module);
            loopbacks.push(module);
        }

        Ok(RoutingSetup {
            mic_sink,
            app_sink,
            moved_streams,
            loopbacks,
        })
    }

    /// [`select`](Self::select) followed by [`apply`](Self::apply).
    pub async fn setup(&self, cancel: &CancellationToken) -> AudioResult<RoutingSetup> {
        self.status.set(RoutingPhase::Init).await;
        // Selecting loads nothing, so it can be abandoned midway.
        let selection = tokio::select! {
            selection = self.select() => selection?,
            _ = cancel.cancelled() => return Err(AudioError::Interrupted),
        };
        self.apply(&selection, cancel).await
    }

    async fn resolve_sink(&self, module: u32) -> AudioResult<Sink> {
        for attempt in 1..=RESOLVE_ATTEMPTS {
            if let Some(sink) = resolve_sink_by_owning_module(&self.client, module).await? {
                return Ok(sink);
            }
            debug!(
                "Sink for module {} not listed yet (attempt {}/{})",
                module, attempt, RESOLVE_ATTEMPTS
            );
            if attempt < RESOLVE_ATTEMPTS {
                sleep(RESOLVE_DELAY).await;
            }
        }
        Err(AudioError::SinkNotFound { module })
    }

    /// One watch tick: move every source-output of the recording target to
    /// `monitor`. Returns the number of outputs moved.
    pub async fn retarget_once(&self, monitor: &str) -> AudioResult<usize> {
        let Some(target) = self.options.recording_target.as_deref() else {
            return Ok(0);
        };

        let outputs = self.client.list(Listing::SourceOutputs).await?;
        let mut moved = 0;
        for stream in outputs.iter().map(Stream::from_block) {
            if stream.binary.as_deref() != Some(target) {
                continue;
            }
            match self.client.move_source_output(stream.index, monitor).await {
                Ok(()) => moved += 1,
                Err(e) => debug!("Could not move source-output {}: {}", stream.index, e),
            }
        }
        Ok(moved)
    }

    /// Keep the recording target on the mic sink's monitor until `cancel` fires.
    ///
    /// Errors are logged and retried on the next tick.
    pub async fn watch(&self, setup: &RoutingSetup, cancel: CancellationToken) {
        self.status.set(RoutingPhase::WatchingRecordingTarget).await;

        let Some(target) = self.options.recording_target.clone() else {
            info!("No recording application configured; waiting for shutdown");
            cancel.cancelled().await;
            return;
        };

        let monitor = setup.mic_sink.monitor_name();
        info!(
            "Watching for {} and pinning its input to {} every {}ms",
            target,
            monitor,
            self.options.watch_interval.as_millis()
        );

        let mut ticker = interval(self.options.watch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.retarget_once(&monitor).await {
                        Ok(0) => {}
                        Ok(moved) => debug!("Moved {} {} input(s) to {}", moved, target, monitor),
                        Err(e) => debug!("Watch tick failed, retrying next tick: {}", e),
                    }
                }
            }
        }

        debug!("Recording target watch stopped");
    }
}

fn checkpoint(cancel: &CancellationToken) -> AudioResult<()> {
    if cancel.is_cancelled() {
        return Err(AudioError::Interrupted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::registry::ModuleRegistry;
    use crate::audio::types::SinkState;
    use crate::exec::testing::{failed, ok, FakeRunner};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    const SINKS: &str = "Sink #0\n\tName: alsa_output\n\tOwner Module: 7\n\
                         Sink #12\n\tState: IDLE\n\tName: VirtualSinkMIC\n\tOwner Module: 25\n\
                         Sink #13\n\tName: VirtualSinkAPP\n\tOwner Module: 26\n";

    struct Answers(StdMutex<VecDeque<String>>);

    impl Answers {
        fn new(answers: &[&str]) -> Box<Self> {
            Box::new(Self(StdMutex::new(
                answers.iter().map(|a| a.to_string()).collect(),
            )))
        }
    }

    #[async_trait]
    impl SelectionPrompt for Answers {
        async fn read_line(&self, _prompt: &str) -> AudioResult<String> {
            Ok(self.0.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn machine(runner: Arc<FakeRunner>, answers: &[&str]) -> (RoutingMachine, ModuleRegistry) {
        let registry = ModuleRegistry::default();
        let client = PulseClient::new(runner, registry.clone(), false);
        let machine = RoutingMachine::new(
            client,
            Answers::new(answers),
            RoutingOptions::default(),
            RoutingStatusHandle::default(),
        );
        (machine, registry)
    }

    fn mic_only_runner() -> Arc<FakeRunner> {
        let runner = Arc::new(FakeRunner::new());
        runner
            .reply("pactl load-module module-null-sink", ok("25"))
            .reply("pactl list sinks", ok(SINKS));
        runner
    }

    #[tokio::test]
    async fn test_mic_sink_only_when_nothing_selected() {
        let runner = mic_only_runner();
        let (machine, registry) = machine(runner.clone(), &[]);

        let setup = machine
            .apply(&RoutingSelection::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(setup.mic_sink.index, 12);
        assert_eq!(setup.mic_sink.state, SinkState::Idle);
        assert!(setup.app_sink.is_none());
        assert!(runner
            .calls_starting_with("pactl load-module module-combine-sink")
            .is_empty());
        assert_eq!(registry.len().await, 1);
        assert_eq!(machine.status().get().await, RoutingPhase::CreatingLoopbacks);
    }

    #[tokio::test]
    async fn test_select_reads_applications_then_sources() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .reply(
                "pactl list sink-inputs",
                ok("Sink Input #5\n\tSink: 0\n\tProperties:\n\t\tapplication.name = \"Firefox\"\n"),
            )
            .reply(
                "pactl list sources",
                ok("Source #3\n\tName: mic\n\tProperties:\n\t\tudev.id = \"usb-mic\"\n"),
            );
        let (machine, _) = machine(runner, &["5", ""]);

        let selection = machine.select().await.unwrap();

        assert_eq!(selection.applications, vec![5]);
        assert!(selection.sources.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_selection_is_fatal_before_any_module() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .reply(
                "pactl list sink-inputs",
                ok("Sink Input #5\n\tProperties:\n\t\tapplication.name = \"Firefox\"\n"),
            )
            .reply("pactl load-module", ok("1"));
        let (machine, registry) = machine(runner.clone(), &["abc"]);

        let err = machine.setup(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, AudioError::Selection(_)));
        assert!(runner.calls_starting_with("pactl load-module").is_empty());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_move_aborts_and_keeps_created_modules() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .reply("pactl load-module module-null-sink", ok("25"))
            .reply("pactl load-module module-combine-sink", ok("26"))
            .reply("pactl list sinks", ok(SINKS))
            .reply("pactl move-sink-input", failed(1));
        let (machine, registry) = machine(runner.clone(), &[]);

        let err = machine
            .apply(
                &RoutingSelection {
                    applications: vec![5, 7],
                    sources: vec![3],
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AudioError::CommandFailed { .. }));
        assert_eq!(runner.calls_starting_with("pactl move-sink-input").len(), 1);
        assert!(runner
            .calls_starting_with("pactl load-module module-loopback")
            .is_empty());
        let indices: Vec<u32> = registry.snapshot().await.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![25, 26]);
    }

    #[tokio::test]
    async fn test_unresolvable_sink_is_fatal() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .reply("pactl load-module module-null-sink", ok("99"))
            .reply("pactl list sinks", ok(SINKS));
        let (machine, registry) = machine(runner.clone(), &[]);

        let err = machine
            .apply(&RoutingSelection::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AudioError::SinkNotFound { module: 99 }));
        assert_eq!(
            runner.calls_starting_with("pactl list sinks").len(),
            RESOLVE_ATTEMPTS as usize
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_retarget_moves_matching_output() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .reply(
                "pactl list source-outputs",
                ok("Source Output #41\n\tSource: 2\n\tProperties:\n\t\tapplication.process.binary = \"Discord\"\n\
                    Source Output #42\n\tSource: 2\n\tProperties:\n\t\tapplication.process.binary = \"obs\"\n"),
            )
            .reply("pactl move-source-output", ok(""));
        let (machine, _) = machine(runner.clone(), &[]);

        let moved = machine.retarget_once("VirtualSinkMIC.monitor").await.unwrap();

        assert_eq!(moved, 1);
        assert_eq!(
            runner.calls_starting_with("pactl move-source-output"),
            vec!["pactl move-source-output 41 VirtualSinkMIC.monitor"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_apply_creates_nothing_more() {
        let runner = mic_only_runner();
        let (machine, registry) = machine(runner.clone(), &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = machine
            .apply(
                &RoutingSelection {
                    applications: vec![5],
                    sources: vec![3],
                },
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AudioError::Interrupted));
        assert!(runner.calls().is_empty());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_retarget_tries_every_output_after_a_failed_move() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .reply(
                "pactl list source-outputs",
                ok("Source Output #41\n\tProperties:\n\t\tapplication.process.binary = \"Discord\"\n\
                    Source Output #43\n\tProperties:\n\t\tapplication.process.binary = \"Discord\"\n"),
            )
            .reply("pactl move-source-output 41", failed(1))
            .reply("pactl move-source-output 43", ok(""));
        let (machine, _) = machine(runner.clone(), &[]);

        let moved = machine.retarget_once("VirtualSinkMIC.monitor").await.unwrap();

        assert_eq!(moved, 1);
        assert_eq!(
            runner.calls_starting_with("pactl move-source-output"),
            vec![
                "pactl move-source-output 41 VirtualSinkMIC.monitor",
                "pactl move-source-output 43 VirtualSinkMIC.monitor",
            ]
        );
    }

    #[tokio::test]
    async fn test_retarget_without_match_moves_nothing() {
        let runner = Arc::new(FakeRunner::new());
        runner.reply(
            "pactl list source-outputs",
            ok("Source Output #42\n\tProperties:\n\t\tapplication.process.binary = \"obs\"\n"),
        );
        let (machine, _) = machine(runner.clone(), &[]);

        assert_eq!(machine.retarget_once("VirtualSinkMIC.monitor").await.unwrap(), 0);
        assert!(runner
            .calls_starting_with("pactl move-source-output")
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_survives_errors_and_stops_on_cancel() {
        let runner = mic_only_runner();
        runner.reply("pactl list source-outputs", failed(1));
        let (machine, _) = machine(runner.clone(), &[]);
        let setup = machine
            .apply(&RoutingSelection::default(), &CancellationToken::new())
            .await
            .unwrap();
        let machine = Arc::new(machine);

        let cancel = CancellationToken::new();
        let task = {
            let machine = machine.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { machine.watch(&setup, cancel).await })
        };

        // Ticks at 0s, 2s and 4s.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(
            runner.calls_starting_with("pactl list source-outputs").len(),
            3
        );
        assert_eq!(
            machine.status().get().await,
            RoutingPhase::WatchingRecordingTarget
        );
    }
}
