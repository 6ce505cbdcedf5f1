//! Client Session Agent
//!
//! The player's side of the session protocol: one object holding both
//! channel handles, constructed at join time and handed to whatever drives
//! the UI. The primary channel is request/response: send a vote or a
//! choice, then block for the next broadcast. The secondary channel is
//! covered by two background tasks, a fixed-cadence heartbeat emitter and
//! a roster receiver that republishes the latest name list through a
//! `watch` channel.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::game::Gesture;
use crate::network::channel::{Channel, ChannelError, Frame, FrameReader, FrameWriter};
use crate::network::protocol::{self, GateBroadcast, ProtocolError, ReadyVote, RoundOutcome};

/// Tunables for one client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on each of the two socket connects.
    pub connect_timeout: Duration,
    /// Cadence of the heartbeat emitter.
    pub heartbeat_period: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            heartbeat_period: Duration::from_secs(1),
        }
    }
}

/// Faults on the client side of the protocol.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// One of the two channels could not be opened.
    #[error("failed to join session: {0}")]
    Connect(#[source] ChannelError),

    /// The primary channel faulted mid-exchange.
    #[error(transparent)]
    Transport(#[from] ChannelError),

    /// The server sent a frame outside the expected sequence.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// One player's live connection to a game instance.
pub struct SessionClient {
    name: String,
    primary: Channel,
    roster_rx: watch::Receiver<Vec<String>>,
    heartbeat_task: JoinHandle<()>,
    roster_task: JoinHandle<()>,
}

impl SessionClient {
    /// Open both channels to a session's join ports and send the identity
    /// frame that binds this player's name.
    pub async fn join(
        host: &str,
        ports: (u16, u16),
        name: &str,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let (primary_port, secondary_port) = ports;
        let mut primary = Channel::connect((host, primary_port), config.connect_timeout)
            .await
            .map_err(ClientError::Connect)?;
        let secondary = Channel::connect((host, secondary_port), config.connect_timeout)
            .await
            .map_err(ClientError::Connect)?;

        // The first frame on the primary channel is always the identity.
        primary.send_text(name).await?;

        let (roster_reader, heartbeat_writer) = secondary.split();
        let heartbeat_task = spawn_heartbeat(heartbeat_writer, config.heartbeat_period);
        let (roster_tx, roster_rx) = watch::channel(Vec::new());
        let roster_task = spawn_roster_receiver(roster_reader, roster_tx);

        Ok(Self {
            name: name.to_string(),
            primary,
            roster_rx,
            heartbeat_task,
            roster_task,
        })
    }

    /// The name this client joined under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block for the next lobby broadcast without sending anything; this is
    /// how a freshly joined player learns the ready-check has opened.
    pub async fn await_lobby(&mut self) -> Result<GateBroadcast, ClientError> {
        let frame = self.primary.recv().await?;
        Ok(GateBroadcast::from_frame(frame)?)
    }

    /// Send a ready-vote, then block for the gate's answer.
    pub async fn submit_vote(&mut self, vote: ReadyVote) -> Result<GateBroadcast, ClientError> {
        self.primary.send_text(vote.as_str()).await?;
        let frame = self.primary.recv().await?;
        Ok(GateBroadcast::from_frame(frame)?)
    }

    /// Send a choice, then block for the round's outcome. An
    /// [`RoundOutcome::Aborted`] answer means the round lost its quorum and
    /// the caller should fall back to the waiting state.
    pub async fn submit_choice(&mut self, choice: Gesture) -> Result<RoundOutcome, ClientError> {
        self.primary.send_text(choice.as_str()).await?;
        let frame = self.primary.recv().await?;
        Ok(RoundOutcome::from_frame(frame)?)
    }

    /// A receiver over the latest roster pushed by the server. The UI layer
    /// watches this instead of touching the secondary channel.
    pub fn roster(&self) -> watch::Receiver<Vec<String>> {
        self.roster_rx.clone()
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.heartbeat_task.abort();
        self.roster_task.abort();
    }
}

/// Emit the heartbeat token on a fixed cadence until the socket goes away.
fn spawn_heartbeat(mut writer: FrameWriter, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = writer.send_text(protocol::HEARTBEAT).await {
                debug!("heartbeat stopped: {e}");
                return;
            }
        }
    })
}

/// Republish every roster push into the watch cell; the loop ends when the
/// server goes away or the client is dropped.
fn spawn_roster_receiver(
    mut reader: FrameReader,
    roster_tx: watch::Sender<Vec<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match reader.recv().await {
                Ok(Frame::List(names)) => {
                    if roster_tx.send(names).is_err() {
                        return;
                    }
                }
                Ok(frame) => debug!("ignoring non-roster push: {frame:?}"),
                Err(e) => {
                    debug!("roster receiver stopped: {e}");
                    return;
                }
            }
        }
    })
}
