//! Service wiring.
//!
//! The protocol client runs as its own task and delivers decoded frames on
//! one ordered channel. This loop is the only place the tracker and the
//! recording controller are touched, so meeting updates, API commands and
//! encoder failures are applied strictly one after another.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{ApiCommand, ApiServer, ApiState};
use crate::audio::{AudioMixerEngine, CaptureBackend, CpalBackend};
use crate::config::Config;
use crate::global;
use crate::meeting::MeetingStateTracker;
use crate::protocol::{InboundMessage, ProtocolClient, TokenStore};
use crate::recording::RecordingController;

const EVENT_QUEUE: usize = 256;
const COMMAND_QUEUE: usize = 16;

/// Run the service until Ctrl-C.
pub async fn run_service(config: Config) -> Result<()> {
    info!("Starting teams-helper service");

    let token_path = global::token_file()?;
    let tokens = TokenStore::load(token_path);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal.cancel();
    });

    run(config, Arc::new(CpalBackend), tokens, shutdown).await
}

/// Run against an explicit capture backend and token store until `shutdown`.
pub async fn run(
    config: Config,
    backend: Arc<dyn CaptureBackend>,
    tokens: TokenStore,
    shutdown: CancellationToken,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let (client, client_handle) = ProtocolClient::new(
        config.connection.clone(),
        config.reconnect.clone(),
        tokens,
    );
    let (events_tx, mut events) = mpsc::channel::<InboundMessage>(EVENT_QUEUE);
    let client_task = tokio::spawn(client.run(events_tx, shutdown.clone()));

    let (failure_tx, mut failures) = mpsc::unbounded_channel();
    let engine = AudioMixerEngine::new(
        backend,
        config.audio.clone(),
        config.recording.shutdown_timeout(),
        failure_tx,
    );
    let mut controller = RecordingController::new(engine, &config.recording, config.audio.codec);
    let mut tracker = MeetingStateTracker::new();

    let (command_tx, mut commands) = mpsc::channel::<ApiCommand>(COMMAND_QUEUE);
    if config.api.enabled {
        let state = ApiState {
            tx: command_tx.clone(),
            recording: controller.status_handle(),
            meeting: tracker.subscribe(),
            client: client_handle.clone(),
        };
        let server = ApiServer::new(config.api.port, state);
        let api_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server.start(api_shutdown).await {
                error!("API server failed: {:#}", e);
            }
        });
    }

    info!(
        "teams-helper is ready; recordings go to {:?} (record all meetings: {})",
        config.recording.output_dir, config.recording.record_all_meetings
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            message = events.recv() => {
                let Some(message) = message else {
                    warn!("Control channel client stopped unexpectedly");
                    break;
                };
                if let InboundMessage::TokenRefresh(_) = &message {
                    info!("Meeting client issued a new pairing token");
                }
                if let Some(transition) = tracker.on_message(&message) {
                    controller.on_transition(transition);
                }
            }
            Some(command) = commands.recv() => {
                let outcome = controller.handle_command(command.command, tracker.is_in_meeting());
                if let Err(e) = &outcome {
                    warn!("{:?} command failed: {}", command.command, e);
                }
                let _ = command.reply.send(outcome);
            }
            Some(failure) = failures.recv() => controller.on_engine_failure(failure),
        }
    }

    controller.shutdown();
    shutdown.cancel();
    if tokio::time::timeout(config.recording.shutdown_timeout(), client_task)
        .await
        .is_err()
    {
        warn!("Control channel client did not stop in time");
    }

    info!("teams-helper stopped");
    Ok(())
}
