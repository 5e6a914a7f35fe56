use std::{env, sync::Arc, time::Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::data::{Board, TileStatus};
use crate::model::{
    BoardParams, Pos, Side,
    server::{EndReason, JoinErrorKind, ServerMessage},
};

mod board;

pub use board::{ConfigError, MatchResult, WinReason, validate_params};

pub type Rooms = Arc<DashMap<String, Arc<Mutex<Room>>>>;

pub type ParticipantSender = mpsc::UnboundedSender<ServerMessage>;

struct Participant {
    id: Uuid,
    side: Side,
    sender: ParticipantSender,
}

/// Room lifecycle. `Ready` only exists inside `join` (two participants,
/// board not yet generated); it is never observable between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Created,
    Ready,
    Countdown,
    Active,
    Ended,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub participant_id: Uuid,
    pub side: Side,
    /// Set when this join generated the board; the caller must spawn
    /// `run_countdown` with this epoch.
    pub countdown_epoch: Option<u64>,
}

/// One match instance. All board mutation goes through `&mut self` behind
/// the room's mutex, so a reveal always sees a fully settled board.
pub struct Room {
    id: String,
    passcode: String,
    params: BoardParams,
    state: RoomState,
    board: Option<Board>,
    participants: Vec<Participant>,
    countdown_epoch: u64,
    last_activity: Instant,
}

impl Room {
    /// Callers must run `validate_params` on `params` first; board
    /// generation relies on it.
    pub fn new(id: String, passcode: String, params: BoardParams) -> Self {
        info!(
            "Creating room {}: {}x{} with {} mines",
            id, params.height, params.width, params.mines
        );
        Self {
            id,
            passcode,
            params,
            state: RoomState::Created,
            board: None,
            participants: Vec::with_capacity(2),
            countdown_epoch: 0,
            last_activity: Instant::now(),
        }
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    #[instrument(level = "trace", skip(self, passcode, sender))]
    pub fn join(
        &mut self,
        passcode: &str,
        sender: ParticipantSender,
    ) -> Result<JoinOutcome, JoinErrorKind> {
        if passcode != self.passcode {
            return Err(JoinErrorKind::WrongPasscode);
        }
        if self.state != RoomState::Created || self.participants.len() >= 2 {
            return Err(JoinErrorKind::RoomFull);
        }

        let side = if self.participants.iter().any(|p| p.side == Side::Blue) {
            Side::Red
        } else {
            Side::Blue
        };
        let id = Uuid::new_v4();
        let _ = sender.send(ServerMessage::RoomJoined {
            room_id: self.id.clone(),
            side,
        });
        self.participants.push(Participant { id, side, sender });
        self.last_activity = Instant::now();
        info!(
            "Room {}: {:?} joined ({} of 2 participants)",
            self.id,
            side,
            self.participants.len()
        );

        let mut countdown_epoch = None;
        if self.participants.len() == 2 {
            self.state = RoomState::Ready;
            let board =
                Board::new(self.params).expect("board params are validated at room creation");
            self.broadcast(&ServerMessage::InitialBoard {
                height: board.height,
                width: board.width,
                mines: board.mines,
                board: board.snapshot(),
            });
            self.board = Some(board);
            self.state = RoomState::Countdown;
            self.countdown_epoch += 1;
            countdown_epoch = Some(self.countdown_epoch);
            info!("Room {}: board generated, countdown running", self.id);
        }

        Ok(JoinOutcome {
            participant_id: id,
            side,
            countdown_epoch,
        })
    }

    /// Flips the room to `Active` once the countdown has elapsed. The epoch
    /// check keeps a stale timer from an abandoned countdown from starting a
    /// regenerated match early.
    pub fn begin_active(&mut self, epoch: u64) {
        if self.state != RoomState::Countdown || self.countdown_epoch != epoch {
            debug!("Room {}: ignoring stale countdown timer", self.id);
            return;
        }
        self.state = RoomState::Active;
        self.broadcast(&ServerMessage::GameStart);
        info!("Room {}: match started", self.id);
    }

    /// Applies one reveal request under the adjacency-claim rule. Requests
    /// outside the `Active` state and rule violations are silently dropped:
    /// a racing or stale client request is expected, not a fault.
    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub fn reveal(&mut self, side: Side, pos: Pos) {
        if self.state != RoomState::Active {
            debug!("Room {}: ignoring reveal outside active state", self.id);
            return;
        }
        let Some(board) = self.board.as_mut() else {
            return;
        };
        if !board.contains(pos) {
            warn!(
                "Room {}: reveal out of bounds at ({}, {})",
                self.id, pos.row, pos.col
            );
            return;
        }
        if board.status(pos) != TileStatus::Hidden {
            debug!(
                "Room {}: ignoring reveal of settled tile ({}, {})",
                self.id, pos.row, pos.col
            );
            return;
        }
        if !board.may_claim(side, pos) {
            debug!(
                "Room {}: {:?} may not claim ({}, {})",
                self.id, side, pos.row, pos.col
            );
            return;
        }

        board.reveal(side, pos);
        let snapshot = board.snapshot();
        let decision = board.evaluate();
        self.last_activity = Instant::now();

        self.broadcast(&ServerMessage::UpdateBoard { board: snapshot });
        if let Some(result) = decision {
            self.state = RoomState::Ended;
            info!(
                "Room {}: {:?} wins by {:?}",
                self.id, result.winner, result.reason
            );
            self.broadcast(&ServerMessage::GameEnd {
                winning_side: result.winner,
                reason: result.reason.into(),
            });
        }
    }

    /// Before the match starts the room is freed for reuse; mid-match the
    /// remaining side wins by forfeit.
    #[instrument(level = "trace", skip(self))]
    pub fn disconnect(&mut self, participant_id: Uuid) {
        let Some(index) = self
            .participants
            .iter()
            .position(|p| p.id == participant_id)
        else {
            warn!(
                "Room {}: unknown participant {} disconnected",
                self.id, participant_id
            );
            return;
        };
        let participant = self.participants.remove(index);
        self.last_activity = Instant::now();

        match self.state {
            RoomState::Created | RoomState::Ready | RoomState::Countdown => {
                self.board = None;
                self.state = RoomState::Created;
                info!(
                    "Room {}: {:?} left before the match, room freed for reuse",
                    self.id, participant.side
                );
            }
            RoomState::Active => {
                self.state = RoomState::Ended;
                let winner = participant.side.opponent();
                info!(
                    "Room {}: {:?} disconnected mid-match, {:?} wins by forfeit",
                    self.id, participant.side, winner
                );
                self.broadcast(&ServerMessage::GameEnd {
                    winning_side: winner,
                    reason: EndReason::Forfeit,
                });
            }
            RoomState::Ended => {
                debug!(
                    "Room {}: {:?} left after the match ended",
                    self.id, participant.side
                );
            }
        }
    }

    pub fn has_participants(&self) -> bool {
        !self.participants.is_empty()
    }

    pub fn should_cleanup(&self, inactive_timeout_secs: u64, finished_timeout_secs: u64) -> bool {
        let elapsed = Instant::now().duration_since(self.last_activity).as_secs();
        if !self.has_participants() {
            return elapsed > inactive_timeout_secs;
        }
        self.state == RoomState::Ended && elapsed > finished_timeout_secs
    }

    fn broadcast(&self, message: &ServerMessage) {
        for participant in &self.participants {
            let _ = participant.sender.send(message.clone());
        }
    }
}

/// Background timer for one countdown cycle: sleeps for the configured
/// delay, then activates the room if that cycle is still current.
pub async fn run_countdown(room: Arc<Mutex<Room>>, epoch: u64) {
    let secs: u64 = env::var("COUNTDOWN_SECONDS")
        .unwrap_or_else(|_| "10".to_string())
        .parse()
        .unwrap_or(10);

    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
    room.lock().await.begin_active(epoch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Tile, TileStatus};
    use crate::model::Pos;

    fn test_params() -> BoardParams {
        BoardParams {
            height: 9,
            width: 9,
            mines: 10,
        }
    }

    fn test_room() -> Room {
        Room::new("abcd".to_string(), "secret".to_string(), test_params())
    }

    fn channel() -> (
        ParticipantSender,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Board with no mines: the first flood fill claims everything.
    fn mineless_board(height: usize, width: usize) -> Board {
        Board {
            height,
            width,
            mines: 0,
            revealed_blue: 0,
            revealed_red: 0,
            exploded_by: None,
            tiles: (0..height * width)
                .map(|index| Tile {
                    row: index / width,
                    col: index % width,
                    has_mine: false,
                    status: TileStatus::Hidden,
                })
                .collect(),
        }
    }

    struct ActiveRoom {
        room: Room,
        blue_id: Uuid,
        red_id: Uuid,
        rx_blue: mpsc::UnboundedReceiver<ServerMessage>,
        rx_red: mpsc::UnboundedReceiver<ServerMessage>,
    }

    fn active_room() -> ActiveRoom {
        let mut room = test_room();
        let (tx_blue, mut rx_blue) = channel();
        let (tx_red, mut rx_red) = channel();
        let blue = room.join("secret", tx_blue).unwrap();
        let red = room.join("secret", tx_red).unwrap();
        room.begin_active(red.countdown_epoch.unwrap());
        drain(&mut rx_blue);
        drain(&mut rx_red);
        ActiveRoom {
            room,
            blue_id: blue.participant_id,
            red_id: red.participant_id,
            rx_blue,
            rx_red,
        }
    }

    #[test]
    fn first_join_is_blue_second_is_red() {
        let mut room = test_room();
        let (tx_blue, mut rx_blue) = channel();
        let (tx_red, mut rx_red) = channel();

        let blue = room.join("secret", tx_blue).unwrap();
        assert_eq!(blue.side, Side::Blue);
        assert!(blue.countdown_epoch.is_none());
        assert_eq!(room.state(), RoomState::Created);

        let red = room.join("secret", tx_red).unwrap();
        assert_eq!(red.side, Side::Red);
        assert!(red.countdown_epoch.is_some());
        assert_eq!(room.state(), RoomState::Countdown);
        assert!(room.board.is_some());

        let blue_messages = drain(&mut rx_blue);
        assert!(matches!(
            blue_messages[0],
            ServerMessage::RoomJoined {
                side: Side::Blue,
                ..
            }
        ));
        assert!(matches!(
            blue_messages[1],
            ServerMessage::InitialBoard { mines: 10, .. }
        ));

        let red_messages = drain(&mut rx_red);
        assert!(matches!(
            red_messages[0],
            ServerMessage::RoomJoined { side: Side::Red, .. }
        ));
        assert!(matches!(
            red_messages[1],
            ServerMessage::InitialBoard { .. }
        ));
    }

    #[test]
    fn join_rejections_keep_room_state_untouched() {
        let mut room = test_room();
        let (tx, _rx) = channel();
        assert_eq!(
            room.join("wrong", tx).unwrap_err(),
            JoinErrorKind::WrongPasscode
        );
        assert_eq!(room.state(), RoomState::Created);

        let (tx_blue, _rx_blue) = channel();
        let (tx_red, _rx_red) = channel();
        room.join("secret", tx_blue).unwrap();
        room.join("secret", tx_red).unwrap();

        let (tx_third, _rx_third) = channel();
        assert_eq!(
            room.join("secret", tx_third).unwrap_err(),
            JoinErrorKind::RoomFull
        );
        assert_eq!(room.state(), RoomState::Countdown);
    }

    #[test]
    fn reveal_is_ignored_before_the_match_starts() {
        let mut room = test_room();
        let (tx_blue, mut rx_blue) = channel();
        let (tx_red, _rx_red) = channel();
        room.join("secret", tx_blue).unwrap();
        room.join("secret", tx_red).unwrap();
        drain(&mut rx_blue);

        room.reveal(Side::Blue, Pos { row: 8, col: 0 });
        assert!(drain(&mut rx_blue).is_empty());
        assert_eq!(room.state(), RoomState::Countdown);
    }

    #[test]
    fn countdown_activates_and_broadcasts_game_start() {
        let mut active = active_room();
        assert_eq!(active.room.state(), RoomState::Active);

        active.room.reveal(Side::Blue, Pos { row: 8, col: 0 });
        let messages = drain(&mut active.rx_red);
        assert!(
            messages
                .iter()
                .any(|m| matches!(m, ServerMessage::UpdateBoard { .. }))
        );
    }

    #[test]
    fn stale_countdown_epoch_does_not_activate() {
        let mut room = test_room();
        let (tx_blue, _rx_blue) = channel();
        let (tx_red, _rx_red) = channel();
        room.join("secret", tx_blue).unwrap();
        let red = room.join("secret", tx_red).unwrap();
        let stale_epoch = red.countdown_epoch.unwrap();

        // Red leaves during the countdown; the room resets for reuse.
        room.disconnect(red.participant_id);
        assert_eq!(room.state(), RoomState::Created);
        assert!(room.board.is_none());

        // A new opponent arrives and a new countdown begins.
        let (tx_new, _rx_new) = channel();
        let replacement = room.join("secret", tx_new).unwrap();
        assert_eq!(replacement.side, Side::Red);
        assert_ne!(replacement.countdown_epoch.unwrap(), stale_epoch);

        room.begin_active(stale_epoch);
        assert_eq!(room.state(), RoomState::Countdown);
        room.begin_active(replacement.countdown_epoch.unwrap());
        assert_eq!(room.state(), RoomState::Active);
    }

    #[test]
    fn illegal_claim_produces_no_broadcast() {
        let mut active = active_room();
        active.room.reveal(Side::Blue, Pos { row: 4, col: 4 });
        assert!(drain(&mut active.rx_blue).is_empty());
        assert!(drain(&mut active.rx_red).is_empty());
        assert_eq!(active.room.state(), RoomState::Active);
    }

    #[test]
    fn mid_match_disconnect_forfeits_to_the_peer() {
        let mut active = active_room();
        active.room.disconnect(active.blue_id);
        assert_eq!(active.room.state(), RoomState::Ended);

        let messages = drain(&mut active.rx_red);
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::GameEnd {
                winning_side: Side::Red,
                reason: EndReason::Forfeit,
            }
        )));
    }

    #[test]
    fn reveals_after_the_end_are_no_ops() {
        let mut active = active_room();
        active.room.disconnect(active.blue_id);
        drain(&mut active.rx_red);

        active.room.reveal(Side::Red, Pos { row: 0, col: 8 });
        assert!(drain(&mut active.rx_red).is_empty());

        active.room.disconnect(active.red_id);
        assert!(!active.room.has_participants());
    }

    #[tokio::test]
    async fn concurrent_reveals_serialize_to_one_decision() {
        let mut active = active_room();
        // Mineless board: whichever reveal wins the lock floods the whole
        // grid and ends the match; the loser's request must then no-op.
        active.room.board = Some(mineless_board(8, 8));
        let room = Arc::new(Mutex::new(active.room));

        let blue_room = room.clone();
        let blue = tokio::spawn(async move {
            blue_room
                .lock()
                .await
                .reveal(Side::Blue, Pos { row: 7, col: 0 });
        });
        let red_room = room.clone();
        let red = tokio::spawn(async move {
            red_room
                .lock()
                .await
                .reveal(Side::Red, Pos { row: 0, col: 7 });
        });
        blue.await.unwrap();
        red.await.unwrap();

        let room = room.lock().await;
        assert_eq!(room.state(), RoomState::Ended);
        let board = room.board.as_ref().unwrap();
        assert_eq!(board.revealed_blue + board.revealed_red, 64);
        // Exactly one side owns the whole grid; nothing interleaved.
        assert!(board.revealed_blue == 64 || board.revealed_red == 64);

        let game_ends = drain(&mut active.rx_red)
            .iter()
            .filter(|m| matches!(m, ServerMessage::GameEnd { .. }))
            .count();
        assert_eq!(game_ends, 1);
    }
}
