//! Session Runner
//!
//! One running game instance: up to four player slots, two listening
//! sockets, and the lobby → ready-check → play → resolve cycle, re-entered
//! until the last player leaves or the registry signals shutdown. Each
//! session runs as a single task that exclusively owns its slots; the only
//! pieces shared outward are the read-only [`SessionInfo`] view and the
//! roster sinks used by the broadcaster task.
//!
//! Disconnect policy is uniform: any transport fault, deadline expiry, or
//! out-of-sequence frame during a blocking read or a broadcast write
//! compacts that slot (later slots shift down, order preserved) and the
//! round continues with whoever remains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::game::{ready_gate, score_round, winner_index, Gesture, ReadyOutcome};
use crate::network::channel::{Channel, ChannelError, FrameReader, FrameWriter};
use crate::network::protocol::{self, choice_from_frame, ProtocolError, ReadyVote};
use crate::store::ScoreStore;

/// Tunables for one session. Defaults follow the lobby's long-standing
/// cadence: a 1-second accept poll and 1-second roster pushes.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Slot capacity; a full lobby bypasses the ready-check.
    pub max_players: usize,
    /// Quorum below which rounds never start.
    pub min_players: usize,
    /// How long one accept attempt blocks before the heartbeat drain runs.
    pub accept_timeout: Duration,
    /// Deadline for a joiner's secondary connection and identity frame.
    pub join_deadline: Duration,
    /// Deadline for each ready-vote and choice read.
    pub read_deadline: Duration,
    /// Cadence of the roster broadcaster.
    pub roster_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            min_players: 2,
            accept_timeout: Duration::from_secs(1),
            join_deadline: Duration::from_secs(5),
            read_deadline: Duration::from_secs(30),
            roster_period: Duration::from_secs(1),
        }
    }
}

/// Faults constructing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The listening sockets could not be bound.
    #[error("failed to bind session sockets: {0}")]
    Bind(#[from] std::io::Error),
}

/// The publicly readable face of a running session.
///
/// The registry and the roster broadcaster only ever touch this view; the
/// run loop is its sole writer.
pub struct SessionInfo {
    name: String,
    primary_port: u16,
    secondary_port: u16,
    players: RwLock<Vec<String>>,
    in_progress: AtomicBool,
}

impl SessionInfo {
    /// The instance name, unique within the registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join ports: (primary, secondary).
    pub fn ports(&self) -> (u16, u16) {
        (self.primary_port, self.secondary_port)
    }

    /// Names of the connected players, in slot order.
    pub async fn player_names(&self) -> Vec<String> {
        self.players.read().await.clone()
    }

    /// Number of connected players.
    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }

    /// False once the session's run loop has ended.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Relaxed)
    }

    fn set_ended(&self) {
        self.in_progress.store(false, Ordering::Relaxed);
    }
}

/// One connected player: identity, round state, and the session-owned ends
/// of both channels. The secondary writer half lives in the roster sink
/// list instead, where the broadcaster task can reach it.
struct PlayerSlot {
    id: u64,
    name: String,
    ready: bool,
    choice: Option<Gesture>,
    round_score: u32,
    primary: Channel,
    heartbeat: FrameReader,
}

struct RosterSink {
    id: u64,
    writer: FrameWriter,
}

enum AcceptOutcome {
    Joined,
    Shutdown,
    Ended,
}

#[derive(Debug, thiserror::Error)]
enum JoinError {
    #[error("secondary channel never arrived")]
    SecondaryTimeout,
    #[error("identity frame was not a name")]
    BadIdentity,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transport(#[from] ChannelError),
}

/// One named game instance and its run loop.
pub struct GameSession {
    info: Arc<SessionInfo>,
    config: SessionConfig,
    primary: TcpListener,
    secondary: TcpListener,
    slots: Vec<PlayerSlot>,
    sinks: Arc<Mutex<Vec<RosterSink>>>,
    lost_tx: mpsc::UnboundedSender<u64>,
    lost_rx: mpsc::UnboundedReceiver<u64>,
    shutdown: broadcast::Receiver<()>,
    store: Arc<ScoreStore>,
    round_done: bool,
    next_slot_id: u64,
}

impl GameSession {
    /// Bind the two listening sockets and prepare an empty session.
    pub async fn bind(
        name: impl Into<String>,
        store: Arc<ScoreStore>,
        config: SessionConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self, SessionError> {
        let primary = TcpListener::bind("0.0.0.0:0").await?;
        let secondary = TcpListener::bind("0.0.0.0:0").await?;
        let info = Arc::new(SessionInfo {
            name: name.into(),
            primary_port: primary.local_addr()?.port(),
            secondary_port: secondary.local_addr()?.port(),
            players: RwLock::new(Vec::new()),
            in_progress: AtomicBool::new(true),
        });
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        Ok(Self {
            info,
            config,
            primary,
            secondary,
            slots: Vec::new(),
            sinks: Arc::new(Mutex::new(Vec::new())),
            lost_tx,
            lost_rx,
            shutdown,
            store,
            round_done: false,
            next_slot_id: 0,
        })
    }

    /// The shared read-only view of this session.
    pub fn info(&self) -> Arc<SessionInfo> {
        self.info.clone()
    }

    /// Drive the session to completion. Returns the session name, which the
    /// registry's reaper uses to release the instance.
    pub async fn run(mut self) -> String {
        let (primary_port, secondary_port) = self.info.ports();
        info!(
            "session {} in progress on ports {primary_port}/{secondary_port}",
            self.info.name()
        );

        let roster = spawn_roster_broadcaster(
            self.info.clone(),
            self.sinks.clone(),
            self.lost_tx.clone(),
            self.config.roster_period,
        );

        self.run_rounds().await;

        roster.abort();
        self.info.set_ended();
        self.info.players.write().await.clear();
        info!("session {} has ended", self.info.name());
        self.info.name().to_string()
    }

    async fn run_rounds(&mut self) {
        loop {
            self.reap_lost().await;
            if !self.info.is_in_progress() {
                return;
            }

            // A freshly resolved round gets one vote cycle before new
            // players are admitted again.
            if self.slots.len() < self.config.max_players && !self.round_done {
                match self.accept_player().await {
                    AcceptOutcome::Joined => {}
                    AcceptOutcome::Shutdown => {
                        info!("session {} shutting down", self.info.name());
                        return;
                    }
                    AcceptOutcome::Ended => return,
                }
            }

            self.reap_lost().await;
            if self.slots.len() < self.config.min_players {
                self.round_done = false;
                continue;
            }

            let gate = if self.slots.len() == self.config.max_players {
                // Full lobby: straight to the round.
                ReadyOutcome::Play
            } else {
                self.ready_check().await
            };

            match gate {
                ReadyOutcome::Wait => {
                    debug!("session {} waiting for more players", self.info.name());
                    self.round_done = false;
                    self.broadcast(protocol::WAIT).await;
                    continue;
                }
                ReadyOutcome::Play => {}
            }

            self.broadcast(protocol::PLAYING).await;
            self.gather_choices().await;
            if self.slots.len() < self.config.min_players {
                self.broadcast(protocol::WAIT).await;
                continue;
            }

            self.round_done = self.resolve_round().await;
        }
    }

    /// Block until one player completes a join, draining heartbeats on
    /// every accept timeout so idle secondary sockets never back up.
    async fn accept_player(&mut self) -> AcceptOutcome {
        debug!("session {} waiting for a player to connect", self.info.name());
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.recv() => return AcceptOutcome::Shutdown,
                res = tokio::time::timeout(self.config.accept_timeout, self.primary.accept()) => res,
            };
            match accepted {
                Err(_) => {
                    self.drain_heartbeats().await;
                    self.reap_lost().await;
                    if !self.info.is_in_progress() {
                        return AcceptOutcome::Ended;
                    }
                }
                Ok(Err(e)) => {
                    warn!("session {}: accept fault: {e}", self.info.name());
                }
                Ok(Ok((stream, addr))) => match self.complete_join(stream).await {
                    Ok(name) => {
                        info!(
                            "player {name} joined session {} from {addr}",
                            self.info.name()
                        );
                        return AcceptOutcome::Joined;
                    }
                    Err(e) => {
                        warn!("session {}: join from {addr} failed: {e}", self.info.name());
                    }
                },
            }
        }
    }

    /// Finish a join: take the matching secondary connection, then read the
    /// identity frame that binds the slot's player name.
    async fn complete_join(&mut self, primary_stream: TcpStream) -> Result<String, JoinError> {
        let mut primary = Channel::from_stream(primary_stream);

        let (secondary_stream, _) =
            tokio::time::timeout(self.config.join_deadline, self.secondary.accept())
                .await
                .map_err(|_| JoinError::SecondaryTimeout)??;

        // The first frame on the primary channel is always the identity.
        let frame = primary.recv_deadline(self.config.join_deadline).await?;
        let name = frame.into_text().ok_or(JoinError::BadIdentity)?;

        let (heartbeat, roster_writer) = Channel::from_stream(secondary_stream).split();
        let id = self.next_slot_id;
        self.next_slot_id += 1;
        self.slots.push(PlayerSlot {
            id,
            name: name.clone(),
            ready: false,
            choice: None,
            round_score: 0,
            primary,
            heartbeat,
        });
        self.sync_player_names().await;
        self.sinks.lock().await.push(RosterSink {
            id,
            writer: roster_writer,
        });
        Ok(name)
    }

    /// Announce the lobby, then tally one vote per slot.
    async fn ready_check(&mut self) -> ReadyOutcome {
        if !self.round_done {
            self.broadcast(protocol::CONNECTED).await;
        }
        self.gather_votes().await;
        if self.slots.len() < self.config.min_players {
            return ReadyOutcome::Wait;
        }
        let ready = self.slots.iter().filter(|s| s.ready).count();
        let waiting = self.slots.len() - ready;
        debug!(
            "session {}: {ready} ready, {waiting} waiting",
            self.info.name()
        );
        ready_gate(ready, waiting)
    }

    /// Read one ready-vote from every slot in slot order. A slot that
    /// faults, times out, or answers out of sequence is compacted and the
    /// tally continues with the remainder.
    async fn gather_votes(&mut self) {
        let mut i = 0;
        while i < self.slots.len() {
            debug!(
                "session {}: waiting for ready status from {}",
                self.info.name(),
                self.slots[i].name
            );
            let vote = self.slots[i]
                .primary
                .recv_deadline(self.config.read_deadline)
                .await
                .map_err(ProtocolError::Transport)
                .and_then(ReadyVote::from_frame);
            match vote {
                Ok(v) => {
                    self.slots[i].ready = v == ReadyVote::Ready;
                    i += 1;
                }
                Err(e) => {
                    warn!(
                        "session {}: dropping {}: {e}",
                        self.info.name(),
                        self.slots[i].name
                    );
                    self.compact(i).await;
                }
            }
        }
    }

    /// Read one choice from every slot in slot order, same fault policy as
    /// the vote gather.
    async fn gather_choices(&mut self) {
        let mut i = 0;
        while i < self.slots.len() {
            debug!(
                "session {}: waiting for choice from {}",
                self.info.name(),
                self.slots[i].name
            );
            let choice = self.slots[i]
                .primary
                .recv_deadline(self.config.read_deadline)
                .await
                .map_err(ProtocolError::Transport)
                .and_then(choice_from_frame);
            match choice {
                Ok(c) => {
                    self.slots[i].choice = Some(c);
                    i += 1;
                }
                Err(e) => {
                    warn!(
                        "session {}: dropping {}: {e}",
                        self.info.name(),
                        self.slots[i].name
                    );
                    self.compact(i).await;
                }
            }
        }
    }

    /// Score the gathered choices, persist the winner's new total, and
    /// announce the winner. Returns whether the round actually resolved.
    async fn resolve_round(&mut self) -> bool {
        let mut choices = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            match slot.choice {
                Some(c) => choices.push(c),
                None => return false,
            }
        }

        let scores = score_round(&choices);
        for (slot, &score) in self.slots.iter_mut().zip(&scores) {
            slot.round_score = score;
        }
        let round_scores: Vec<u32> = self.slots.iter().map(|s| s.round_score).collect();
        let Some(winner) = winner_index(&round_scores) else {
            return false;
        };

        let winner_name = self.slots[winner].name.clone();
        let total = self.store.record_win(&winner_name).await;
        info!(
            "session {}: {winner_name} wins the round ({total} total)",
            self.info.name()
        );
        self.broadcast(&winner_name).await;
        true
    }

    /// Send a text frame to every slot's primary channel; a slot that
    /// cannot be written to is compacted on the spot.
    async fn broadcast(&mut self, message: &str) {
        let mut i = 0;
        while i < self.slots.len() {
            match self.slots[i].primary.send_text(message).await {
                Ok(()) => i += 1,
                Err(e) => {
                    warn!(
                        "session {}: dropping {}: {e}",
                        self.info.name(),
                        self.slots[i].name
                    );
                    self.compact(i).await;
                }
            }
        }
    }

    /// Consume buffered heartbeats from every slot's secondary channel; a
    /// fault there means the player is gone.
    async fn drain_heartbeats(&mut self) {
        let mut i = 0;
        while i < self.slots.len() {
            match self.slots[i].heartbeat.drain().await {
                Ok(_) => i += 1,
                Err(e) => {
                    debug!(
                        "session {}: heartbeat fault from {}: {e}",
                        self.info.name(),
                        self.slots[i].name
                    );
                    self.compact(i).await;
                }
            }
        }
    }

    /// Compact slots the roster broadcaster reported as unreachable.
    async fn reap_lost(&mut self) {
        while let Ok(id) = self.lost_rx.try_recv() {
            if let Some(index) = self.slots.iter().position(|s| s.id == id) {
                self.compact(index).await;
            }
        }
    }

    /// Remove slot `index` and close the gap; later slots shift down one.
    /// Out-of-range indices are a no-op, so a slot reported lost through
    /// two paths is reclaimed once. Reaching zero slots ends the session.
    async fn compact(&mut self, index: usize) {
        if index >= self.slots.len() {
            return;
        }
        let slot = self.slots.remove(index);
        info!("player {} left session {}", slot.name, self.info.name());
        self.sinks.lock().await.retain(|sink| sink.id != slot.id);
        self.sync_player_names().await;
        if self.slots.is_empty() {
            self.info.set_ended();
        }
    }

    async fn sync_player_names(&self) {
        let names: Vec<String> = self.slots.iter().map(|s| s.name.clone()).collect();
        *self.info.players.write().await = names;
    }
}

/// Push the current roster to every slot's secondary channel on a fixed
/// cadence. A sink that faults is dropped and its slot queued for
/// compaction by the run loop; the task itself never stops early.
fn spawn_roster_broadcaster(
    info: Arc<SessionInfo>,
    sinks: Arc<Mutex<Vec<RosterSink>>>,
    lost_tx: mpsc::UnboundedSender<u64>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let names = info.player_names().await;
            let mut sinks = sinks.lock().await;
            let mut failed = Vec::new();
            for sink in sinks.iter_mut() {
                if let Err(e) = sink.writer.send_list(&names).await {
                    debug!("session {}: roster push failed: {e}", info.name());
                    failed.push(sink.id);
                }
            }
            if !failed.is_empty() {
                sinks.retain(|sink| !failed.contains(&sink.id));
                for id in failed {
                    let _ = lost_tx.send(id);
                }
            }
        }
    })
}
