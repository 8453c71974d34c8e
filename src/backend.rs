//! Remote leaderboard and referral-credit collaborator
//!
//! Requests leave the simulation through [`BackendHandle`], which forwards
//! them over a channel to a background worker thread. The tick never waits
//! on the network; failures are logged and dropped.

use std::fmt;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use crate::sim::session::PlayerProfile;

/// Remote call failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No player id to attribute the request to
    Anonymous,
    /// Transport or server failure
    Request(String),
    /// Worker thread is gone
    Disconnected,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Anonymous => f.write_str("no player id"),
            BackendError::Request(msg) => write!(f, "backend request failed: {}", msg),
            BackendError::Disconnected => f.write_str("backend worker disconnected"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Remote service the worker talks to
pub trait BackendClient: Send {
    /// Record a finished run on the leaderboard
    fn submit_score(&mut self, player: &PlayerProfile, score: i64) -> Result<(), BackendError>;
    /// Spend one referral credit. Returns the credits left.
    fn consume_referral_credit(&mut self, player: &PlayerProfile) -> Result<u32, BackendError>;
}

/// Client that only logs (offline and headless runs)
#[derive(Debug, Default)]
pub struct LoggingClient;

impl BackendClient for LoggingClient {
    fn submit_score(&mut self, player: &PlayerProfile, score: i64) -> Result<(), BackendError> {
        log::info!(
            "Score {} for {}",
            score,
            player.player_name.as_deref().unwrap_or("anonymous")
        );
        Ok(())
    }

    fn consume_referral_credit(&mut self, player: &PlayerProfile) -> Result<u32, BackendError> {
        if player.player_id.is_none() {
            return Err(BackendError::Anonymous);
        }
        log::info!("Referral credit consumed");
        Ok(0)
    }
}

/// Work sent to the backend thread
#[derive(Debug, Clone)]
pub enum BackendCmd {
    SubmitScore { player: PlayerProfile, score: i64 },
    ConsumeReferralCredit { player: PlayerProfile },
    Shutdown,
}

/// Replies from the backend thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    ScoreSubmitted { score: i64 },
    ReferralCreditConsumed { remaining: u32 },
    Failed(BackendError),
}

fn backend_thread(mut client: Box<dyn BackendClient>, rx: Receiver<BackendCmd>, tx: Sender<BackendMessage>) {
    while let Ok(cmd) = rx.recv() {
        let reply = match cmd {
            BackendCmd::SubmitScore { player, score } => client
                .submit_score(&player, score)
                .map(|()| BackendMessage::ScoreSubmitted { score }),
            BackendCmd::ConsumeReferralCredit { player } => client
                .consume_referral_credit(&player)
                .map(|remaining| BackendMessage::ReferralCreditConsumed { remaining }),
            BackendCmd::Shutdown => break,
        };
        let reply = reply.unwrap_or_else(|e| {
            log::warn!("{}", e);
            BackendMessage::Failed(e)
        });
        if tx.send(reply).is_err() {
            break;
        }
    }
    log::debug!("Backend worker stopped");
}

/// Owner of the backend worker
pub struct BackendHandle {
    tx_cmd: Sender<BackendCmd>,
    rx_msg: Receiver<BackendMessage>,
    handle: Option<JoinHandle<()>>,
}

impl BackendHandle {
    /// Spawn the worker thread around `client`
    pub fn spawn(client: Box<dyn BackendClient>) -> Self {
        let (tx_cmd, rx_cmd) = unbounded::<BackendCmd>();
        let (tx_msg, rx_msg) = unbounded::<BackendMessage>();
        let handle = std::thread::spawn(move || backend_thread(client, rx_cmd, tx_msg));
        Self {
            tx_cmd,
            rx_msg,
            handle: Some(handle),
        }
    }

    /// Queue a request. Never blocks.
    pub fn send(&self, cmd: BackendCmd) {
        if self.tx_cmd.send(cmd).is_err() {
            log::warn!("{}", BackendError::Disconnected);
        }
    }

    pub fn submit_score(&self, player: &PlayerProfile, score: i64) {
        self.send(BackendCmd::SubmitScore {
            player: player.clone(),
            score,
        });
    }

    pub fn consume_referral_credit(&self, player: &PlayerProfile) {
        self.send(BackendCmd::ConsumeReferralCredit {
            player: player.clone(),
        });
    }

    /// Drain replies received so far
    pub fn poll(&self) -> Vec<BackendMessage> {
        let mut out = Vec::new();
        loop {
            match self.rx_msg.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Stop the worker after it finishes queued requests
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx_cmd.send(BackendCmd::Shutdown);
            let _ = handle.join();
        }
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
