use serde::{Deserialize, Serialize};

pub mod api;
pub mod client;
pub mod server;

/// One of the two competing participants in a match. Blue joins first
/// (the room creator), red second.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Blue,
    Red,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::Blue => Side::Red,
            Side::Red => Side::Blue,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

/// Client-visible tile state. Mine positions are only exposed once a mine
/// has actually exploded.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Debug)]
pub enum TileState {
    #[serde(rename = "hidden")]
    Hidden,
    #[serde(rename = "revealed-blue")]
    RevealedBlue,
    #[serde(rename = "revealed-red")]
    RevealedRed,
    #[serde(rename = "mine")]
    Mine,
}

#[derive(Clone, Copy, Serialize, Debug)]
pub struct TileView {
    pub row: usize,
    pub col: usize,
    pub status: TileState,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct BoardParams {
    pub height: usize,
    pub width: usize,
    pub mines: usize,
}

impl Default for BoardParams {
    fn default() -> Self {
        Self {
            height: 16,
            width: 30,
            mines: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::client::ClientMessage;

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Blue).unwrap(), "\"blue\"");
        assert_eq!(serde_json::to_string(&Side::Red).unwrap(), "\"red\"");
    }

    #[test]
    fn tile_state_uses_original_status_strings() {
        let view = TileView {
            row: 2,
            col: 5,
            status: TileState::RevealedBlue,
        };
        let text = serde_json::to_string(&view).unwrap();
        assert_eq!(text, r#"{"row":2,"col":5,"status":"revealed-blue"}"#);
    }

    #[test]
    fn join_error_kinds_cover_every_rejection() {
        use crate::model::server::{JoinErrorKind, ServerMessage};

        let message = ServerMessage::JoinError {
            kind: JoinErrorKind::RoomNotFound,
            message: JoinErrorKind::RoomNotFound.message().to_string(),
        };
        let text = serde_json::to_string(&message).unwrap();
        assert_eq!(
            text,
            r#"{"type":"joinError","kind":"roomNotFound","message":"Room doesn't exist!"}"#
        );

        assert_eq!(
            serde_json::to_string(&JoinErrorKind::WrongPasscode).unwrap(),
            "\"wrongPasscode\""
        );
        assert_eq!(
            serde_json::to_string(&JoinErrorKind::RoomFull).unwrap(),
            "\"roomFull\""
        );
    }

    #[test]
    fn reveal_message_parses() {
        let text = r#"{"action":"reveal","pos":{"row":3,"col":7}}"#;
        let message: ClientMessage = serde_json::from_str(text).unwrap();
        let ClientMessage::Reveal { pos } = message;
        assert_eq!(pos, Pos { row: 3, col: 7 });
    }

    #[test]
    fn board_params_default_matches_standard_game() {
        let params = BoardParams::default();
        assert_eq!(params.height, 16);
        assert_eq!(params.width, 30);
        assert_eq!(params.mines, 90);
    }
}
