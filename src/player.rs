use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PlayerConfig;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("failed to launch player '{0}': {1}. Is the player installed and in your PATH?")]
    Launch(String, String),
}

/// A prepared stream, ready to hand to the player. URLs are absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSource {
    pub title: String,
    pub video_url: String,
    pub subtitle_url: Option<String>,
}

/// Sent when the player process leaves on its own. Deliberate teardown via
/// the handle is silent.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerExit {
    /// Populated when the process exited with a failure status.
    pub error: Option<String>,
}

/// Stops the running player when asked. Dropping the handle does not stop
/// playback; teardown is always explicit.
pub struct EngineHandle {
    stop: CancellationToken,
}

impl EngineHandle {
    pub fn new(stop: CancellationToken) -> Self {
        Self { stop }
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }
}

/// Starts playback attempts. Implemented by the external-process engine and
/// by test stubs.
pub trait PlayerEngine: Send + Sync {
    fn start(
        &self,
        source: &PlaybackSource,
        exits: mpsc::Sender<PlayerExit>,
    ) -> Result<EngineHandle, PlayerError>;
}

/// Plays streams through an external player process (mpv by default).
pub struct ProcessEngine {
    command: String,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

/// Player-specific arguments for the fixed control surface.
fn player_args(command: &str, source: &PlaybackSource) -> Vec<String> {
    let mut args = Vec::new();

    if command.contains("mpv") {
        args.extend(
            [
                "--force-seekable=yes",
                "--cache=yes",
                "--demuxer-max-bytes=150M",
                "--hwdec=auto",
                "--really-quiet", // Suppress all terminal output
            ]
            .map(String::from),
        );
        args.push(format!("--force-media-title={}", source.title));

        if let Some(sub_url) = &source.subtitle_url {
            args.push(format!("--sub-file={}", sub_url));
        }
    }

    // For VLC, only the subtitle needs wiring up
    if command.contains("vlc")
        && let Some(sub_url) = &source.subtitle_url
    {
        args.push(format!("--sub-file={}", sub_url));
    }

    args
}

impl PlayerEngine for ProcessEngine {
    fn start(
        &self,
        source: &PlaybackSource,
        exits: mpsc::Sender<PlayerExit>,
    ) -> Result<EngineHandle, PlayerError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(player_args(&self.command, source));
        cmd.args(&self.args);
        cmd.arg(&source.video_url);

        // Suppress all output to not corrupt the TUI
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| PlayerError::Launch(self.command.clone(), e.to_string()))?;

        info!(command = %self.command, title = %source.title, "player started");

        let stop = CancellationToken::new();
        let watcher_stop = stop.clone();

        // The watcher owns the child: it either kills it on stop() or reports
        // the exit when the user closes the player themselves.
        tokio::spawn(async move {
            tokio::select! {
                _ = watcher_stop.cancelled() => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    debug!("player stopped");
                }
                status = child.wait() => {
                    let error = match status {
                        Ok(s) if s.success() => None,
                        Ok(s) => Some(format!("player exited with {}", s)),
                        Err(e) => Some(format!("failed to wait on player: {}", e)),
                    };
                    debug!(?error, "player exited on its own");
                    let _ = exits.send(PlayerExit { error }).await;
                }
            }
        });

        Ok(EngineHandle::new(stop))
    }
}

/// Owns the one live player instance. There is never more than one: loading
/// tears down whatever came before, and destroy is safe to call at any time.
pub struct MediaSession {
    engine: Arc<dyn PlayerEngine>,
    exits: mpsc::Sender<(u64, PlayerExit)>,
    live: Option<(u64, EngineHandle)>,
    generation: u64,
}

impl MediaSession {
    pub fn new(engine: Arc<dyn PlayerEngine>, exits: mpsc::Sender<(u64, PlayerExit)>) -> Self {
        Self {
            engine,
            exits,
            live: None,
            generation: 0,
        }
    }

    /// Start playing a prepared source, replacing any current playback.
    pub fn load(&mut self, source: &PlaybackSource) -> Result<(), PlayerError> {
        self.destroy();

        self.generation += 1;
        let generation = self.generation;

        // Tag exits with the generation they belong to, so an exit that was
        // already queued when the next load happened cannot be mistaken for
        // the new player going away.
        let (exit_tx, mut exit_rx) = mpsc::channel(1);
        let exits = self.exits.clone();
        tokio::spawn(async move {
            if let Some(exit) = exit_rx.recv().await {
                let _ = exits.send((generation, exit)).await;
            }
        });

        let handle = self.engine.start(source, exit_tx)?;
        self.live = Some((generation, handle));
        Ok(())
    }

    /// Stop playback. A no-op without a live player; calling it twice in a
    /// row is fine.
    pub fn destroy(&mut self) {
        if let Some((_, handle)) = self.live.take() {
            handle.stop();
        }
    }

    /// Forget the live handle if this exit belongs to it; a stale exit from
    /// a replaced player leaves the current one untouched. Returns whether
    /// the exit was current.
    pub fn note_exit(&mut self, generation: u64) -> bool {
        if self.live.as_ref().is_some_and(|(g, _)| *g == generation) {
            self.live = None;
            true
        } else {
            false
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }
}
