use serde::Serialize;

use super::{Side, TileView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinErrorKind {
    RoomNotFound,
    WrongPasscode,
    RoomFull,
}

impl JoinErrorKind {
    pub fn message(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "Room doesn't exist!",
            Self::WrongPasscode => "Incorrect passcode!",
            Self::RoomFull => "Room is full! Please try another room.",
        }
    }
}

/// Why a match ended. Forfeit only exists at the protocol layer; the win
/// evaluator itself never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    MineTriggered,
    TerritoryMajority,
    Forfeit,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "roomJoined", rename_all = "camelCase")]
    RoomJoined { room_id: String, side: Side },
    #[serde(rename = "joinError")]
    JoinError {
        kind: JoinErrorKind,
        message: String,
    },
    #[serde(rename = "initialBoard")]
    InitialBoard {
        height: usize,
        width: usize,
        mines: usize,
        board: Vec<Vec<TileView>>,
    },
    #[serde(rename = "gameStart")]
    GameStart,
    #[serde(rename = "updateBoard")]
    UpdateBoard { board: Vec<Vec<TileView>> },
    #[serde(rename = "gameEnd", rename_all = "camelCase")]
    GameEnd { winning_side: Side, reason: EndReason },
}
