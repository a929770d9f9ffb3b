use crate::audio::{
    AudioError, ModuleRegistry, PulseClient, RoutingMachine, RoutingStatusHandle,
    SelectionPrompt, ShutdownHandler, TerminalPrompt,
};
use crate::cli::Options;
use crate::exec::{ensure_tools, CommandRunner, SystemRunner};
use crate::video::{self, CaptureCommand, VideoBackend};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Audio routing state shared between the session task and shutdown.
#[derive(Clone)]
struct AudioSession {
    machine: Arc<RoutingMachine>,
    shutdown: ShutdownHandler,
}

impl AudioSession {
    fn new(
        runner: Arc<dyn CommandRunner>,
        prompt: Box<dyn SelectionPrompt>,
        options: &Options,
    ) -> Self {
        let registry = ModuleRegistry::default();
        let client = PulseClient::new(runner, registry, options.verbose);
        let status = RoutingStatusHandle::default();
        let machine = RoutingMachine::new(
            client.clone(),
            prompt,
            options.routing.clone(),
            status.clone(),
        );
        Self {
            machine: Arc::new(machine),
            shutdown: ShutdownHandler::new(client, status),
        }
    }
}

/// Run mon2cam until Ctrl-C, the capture process exits or setup fails.
pub async fn run(options: Options) -> Result<i32> {
    info!("Starting Mon2Cam");
    ensure_tools(&required_tools(&options))?;

    let stop = CancellationToken::new();
    let interrupt = {
        let stop = stop.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, shutting down");
                    stop.cancel();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        })
    };

    let code = run_with(
        Arc::new(SystemRunner),
        Box::new(TerminalPrompt),
        options,
        stop,
    )
    .await;
    interrupt.abort();
    Ok(code)
}

/// Run a session with the given command runner and selection prompt until
/// `stop` is cancelled, the capture process exits or setup fails.
///
/// Returns the process exit status. Virtual audio devices are removed before
/// this returns, also when the session panics.
pub async fn run_with(
    runner: Arc<dyn CommandRunner>,
    prompt: Box<dyn SelectionPrompt>,
    options: Options,
    stop: CancellationToken,
) -> i32 {
    let audio = options
        .sound
        .then(|| AudioSession::new(runner.clone(), prompt, &options));

    let session = tokio::spawn(run_session(runner, options, audio.clone(), stop));
    let outcome = session.await;

    if let Some(audio) = &audio {
        audio.shutdown.shutdown().await;
    }

    match outcome {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!("{:#}", e);
            exit_code(&e)
        }
        Err(e) => {
            error!("Session aborted: {}", e);
            1
        }
    }
}

fn required_tools(options: &Options) -> Vec<&'static str> {
    let mut tools = Vec::new();
    if options.sound {
        tools.push("pactl");
    }
    if options.camera_enabled {
        tools.extend(["sudo", "modprobe", "xrandr"]);
    }
    tools
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<AudioError>()
        .map(AudioError::exit_code)
        .unwrap_or(1)
}

async fn run_session(
    runner: Arc<dyn CommandRunner>,
    options: Options,
    audio: Option<AudioSession>,
    stop: CancellationToken,
) -> Result<()> {
    let backend = if options.camera_enabled {
        video::ensure_loopback_device(runner.as_ref(), &options.camera, options.verbose).await?;
        let backend = video::detect_backend(runner.as_ref(), options.force_wayland).await;
        ensure_tools(&[backend.capture_tool()])?;
        Some(backend)
    } else {
        None
    };

    if let Some(audio) = &audio {
        let setup = match audio.machine.setup(&stop).await {
            Ok(setup) => setup,
            Err(AudioError::Interrupted) => {
                warn!("Interrupted during audio setup");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        info!("Virtual microphone available as {}", setup.mic_sink.monitor_name());

        let machine = audio.machine.clone();
        let token = audio.shutdown.token();
        tokio::spawn(async move { machine.watch(&setup, token).await });
    }

    let Some(backend) = backend else {
        info!("Audio routing active, press Ctrl-C to stop");
        stop.cancelled().await;
        return Ok(());
    };

    let mut child = tokio::select! {
        result = start_capture(runner.as_ref(), &options, backend) => result?,
        _ = stop.cancelled() => {
            warn!("Interrupted during camera setup");
            return Ok(());
        }
    };

    info!(
        "Streaming to {}, press Ctrl-C to stop",
        options.camera.device_path()
    );
    tokio::select! {
        status = child.wait() => {
            let status = status.context("Failed to wait for the capture process")?;
            if !status.success() {
                bail!("{} exited with {}", backend.capture_tool(), status);
            }
            info!("Capture process finished");
        }
        _ = stop.cancelled() => {}
    }

    Ok(())
}

async fn start_capture(
    runner: &dyn CommandRunner,
    options: &Options,
    backend: VideoBackend,
) -> Result<tokio::process::Child> {
    let monitors = video::list_monitors(runner, options.verbose).await?;
    let monitor = match video::select_monitor(&monitors, options.monitor)? {
        Some(monitor) => monitor,
        None => video::prompt_monitor(monitors).await?,
    };
    info!("Capturing monitor {}", monitor);

    CaptureCommand::build(backend, &monitor, &options.camera)
        .spawn(options.verbose)
        .with_context(|| format!("Failed to start {}", backend.capture_tool()))
}
