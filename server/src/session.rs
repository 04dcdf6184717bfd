//! Binding of connected players to one game
//!
//! A session owns its [`Game`] and the outboxes of the members playing it.
//! The lobby keeps every session behind a `tokio::sync::Mutex`, so joins,
//! leaves and moves of one game are applied one at a time.

use crate::error::GameError;
use crate::game::Game;
use log::{debug, info, warn};
use shared::frame_line;
use tokio::sync::{mpsc, watch};

/// Queue of framed lines waiting to be written to one connection.
pub type Outbox = mpsc::UnboundedSender<String>;

/// Channel on which failed deliveries are reported, by recipient name.
pub type DeliveryErrors = mpsc::UnboundedSender<String>;

struct Member {
    name: String,
    outbox: Outbox,
}

/// Recipients of a broadcast, relative to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience<'a> {
    All,
    Only(&'a str),
    Except(&'a str),
}

impl Audience<'_> {
    fn includes(&self, name: &str) -> bool {
        match self {
            Audience::All => true,
            Audience::Only(target) => *target == name,
            Audience::Except(excluded) => *excluded != name,
        }
    }
}

pub struct Session {
    id: usize,
    game: Game,
    members: Vec<Member>,
    closed: watch::Sender<bool>,
}

impl Session {
    pub fn new(id: usize, game: Game) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            game,
            members: Vec::new(),
            closed,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    /// Adds a player to the game and the member list. Returns true when this
    /// join filled the roster and started the game.
    pub fn join(&mut self, name: &str, outbox: Outbox) -> Result<bool, GameError> {
        self.game.add_player(name)?;
        self.members.push(Member {
            name: name.to_string(),
            outbox,
        });
        debug!("Session {}: {} joined", self.id, name);

        if self.game.roster_full() {
            self.game.start();
            info!("Session {} started", self.id);
            return Ok(true);
        }
        Ok(false)
    }

    /// Removes a member. Leaving before the start frees the seat; leaving a
    /// running game ends it without a winner. Returns true when the game was
    /// ended by this departure.
    pub fn leave(&mut self, name: &str) -> bool {
        self.members.retain(|member| member.name != name);
        debug!("Session {}: {} left", self.id, name);

        if self.game.remove_player(name) || self.game.is_finished() {
            return false;
        }
        if self.game.players().iter().any(|player| player == name) {
            self.game.finish(None);
            self.close();
            return true;
        }
        false
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// A finished game nobody is connected to any more.
    pub fn is_retired(&self) -> bool {
        self.game.is_finished() && self.members.is_empty()
    }

    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Tells every member's worker that the game is over.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Queues `"<sender>> <text>"` for every member in `audience`.
    ///
    /// Delivery never waits on a recipient. A member whose connection is
    /// gone is reported on `errors` and the remaining members still get the
    /// message. Returns the number of members the line was queued for.
    pub fn broadcast(
        &self,
        sender: &str,
        text: &str,
        audience: Audience<'_>,
        errors: &DeliveryErrors,
    ) -> usize {
        let line = frame_line(&format!("{}> {}", sender, text));
        let mut delivered = 0;
        for member in self.members.iter().filter(|m| audience.includes(&m.name)) {
            if member.outbox.send(line.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!("Session {}: can't write to {}", self.id, member.name);
                let _ = errors.send(member.name.clone());
            }
        }
        delivered
    }
}
