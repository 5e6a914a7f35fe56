use std::fmt;

use rand::Rng;

use crate::data::{Board, HOME_REGION_SIZE, Tile, TileStatus};
use crate::model::server::EndReason;
use crate::model::{BoardParams, Pos, Side, TileState, TileView};

/// Upper bound on client-supplied board dimensions. Keeps `POST /create`
/// from requesting absurd tile allocations and keeps `height * width` far
/// away from usize overflow.
pub const MAX_BOARD_DIMENSION: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    BoardTooSmall { height: usize, width: usize },
    BoardTooLarge { height: usize, width: usize },
    TooManyMines { mines: usize, available: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoardTooSmall { height, width } => write!(
                f,
                "board {height}x{width} is too small for two {HOME_REGION_SIZE}x{HOME_REGION_SIZE} home regions"
            ),
            Self::BoardTooLarge { height, width } => write!(
                f,
                "board {height}x{width} exceeds the maximum dimension of {MAX_BOARD_DIMENSION}"
            ),
            Self::TooManyMines { mines, available } => write!(
                f,
                "{mines} mines do not fit into {available} non-home tiles"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinReason {
    MineTriggered,
    TerritoryMajority,
}

impl From<WinReason> for EndReason {
    fn from(reason: WinReason) -> Self {
        match reason {
            WinReason::MineTriggered => EndReason::MineTriggered,
            WinReason::TerritoryMajority => EndReason::TerritoryMajority,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub winner: Side,
    pub reason: WinReason,
}

/// Checks that the home regions fit on the board without touching and that
/// enough non-home tiles remain for the requested mine count.
pub fn validate_params(params: &BoardParams) -> Result<(), ConfigError> {
    let BoardParams {
        height,
        width,
        mines,
    } = *params;
    if height < 2 * HOME_REGION_SIZE || width < 2 * HOME_REGION_SIZE {
        return Err(ConfigError::BoardTooSmall { height, width });
    }
    // Checked before any multiplication so oversized requests can never
    // overflow the area computation below.
    if height > MAX_BOARD_DIMENSION || width > MAX_BOARD_DIMENSION {
        return Err(ConfigError::BoardTooLarge { height, width });
    }
    let available = height * width - 2 * HOME_REGION_SIZE * HOME_REGION_SIZE;
    if mines >= available {
        return Err(ConfigError::TooManyMines { mines, available });
    }
    Ok(())
}

impl Board {
    pub fn new(params: BoardParams) -> Result<Self, ConfigError> {
        validate_params(&params)?;

        let BoardParams {
            height,
            width,
            mines,
        } = params;
        let tiles = (0..height * width)
            .map(|index| Tile {
                row: index / width,
                col: index % width,
                has_mine: false,
                status: TileStatus::Hidden,
            })
            .collect();

        let mut board = Self {
            height,
            width,
            mines,
            revealed_blue: 0,
            revealed_red: 0,
            exploded_by: None,
            tiles,
        };
        board.place_mines(mines);
        Ok(board)
    }

    /// Rejection sampling: redraw on duplicates and on home-region hits.
    /// Terminates because `validate_params` guarantees spare capacity.
    fn place_mines(&mut self, mines: usize) {
        let mut rng = rand::rng();
        let mut placed = 0;
        while placed < mines {
            let pos = Pos {
                row: rng.random_range(0..self.height),
                col: rng.random_range(0..self.width),
            };
            if self.in_home_region(pos, Side::Blue) || self.in_home_region(pos, Side::Red) {
                continue;
            }
            let tile = &mut self.tiles[pos.row * self.width + pos.col];
            if tile.has_mine {
                continue;
            }
            tile.has_mine = true;
            placed += 1;
        }
    }

    fn tile(&self, pos: Pos) -> &Tile {
        &self.tiles[pos.row * self.width + pos.col]
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.row < self.height && pos.col < self.width
    }

    pub fn status(&self, pos: Pos) -> TileStatus {
        self.tile(pos).status
    }

    /// Blue starts from the bottom-left corner, red from the top-right.
    pub fn home_tile(&self, side: Side) -> Pos {
        match side {
            Side::Blue => Pos {
                row: self.height - 1,
                col: 0,
            },
            Side::Red => Pos {
                row: 0,
                col: self.width - 1,
            },
        }
    }

    pub fn is_home_tile(&self, pos: Pos, side: Side) -> bool {
        pos == self.home_tile(side)
    }

    pub fn in_home_region(&self, pos: Pos, side: Side) -> bool {
        match side {
            Side::Blue => pos.row >= self.height - HOME_REGION_SIZE && pos.col < HOME_REGION_SIZE,
            Side::Red => pos.row < HOME_REGION_SIZE && pos.col >= self.width - HOME_REGION_SIZE,
        }
    }

    /// The up-to-8 orthogonally and diagonally adjacent positions that exist
    /// on the grid.
    pub fn neighbors(&self, pos: Pos) -> Vec<Pos> {
        let mut result = Vec::with_capacity(8);
        for d_row in -1i32..=1 {
            for d_col in -1i32..=1 {
                if d_row == 0 && d_col == 0 {
                    continue;
                }
                let row = pos.row as i32 + d_row;
                let col = pos.col as i32 + d_col;
                if row >= 0 && row < self.height as i32 && col >= 0 && col < self.width as i32 {
                    result.push(Pos {
                        row: row as usize,
                        col: col as usize,
                    });
                }
            }
        }
        result
    }

    /// Adjacency-claim rule: a side may only reveal its own home tile or a
    /// tile bordering territory it already owns.
    pub fn may_claim(&self, side: Side, pos: Pos) -> bool {
        self.is_home_tile(pos, side)
            || self
                .neighbors(pos)
                .iter()
                .any(|n| self.tile(*n).status == TileStatus::Revealed(side))
    }

    /// Reveals `target` for `side` and auto-expands through zero-mine
    /// neighborhoods with an explicit worklist (no recursion, so board size
    /// never threatens the stack). Tiles owned by the opponent are walls:
    /// they are no longer `Hidden` and are skipped, which is what produces
    /// the frontier between territories.
    pub fn reveal(&mut self, side: Side, target: Pos) {
        let mut worklist = vec![target];
        while let Some(pos) = worklist.pop() {
            let tile = &mut self.tiles[pos.row * self.width + pos.col];
            if tile.status != TileStatus::Hidden {
                continue;
            }
            if tile.has_mine {
                tile.status = TileStatus::Exploded;
                self.exploded_by = Some(side);
                // Only the requested tile can be a mine: expansion enqueues
                // tiles from zero-mine neighborhoods only.
                break;
            }
            tile.status = TileStatus::Revealed(side);
            match side {
                Side::Blue => self.revealed_blue += 1,
                Side::Red => self.revealed_red += 1,
            }
            let adjacent = self.neighbors(pos);
            if adjacent.iter().all(|n| !self.tile(*n).has_mine) {
                worklist.extend(
                    adjacent
                        .into_iter()
                        .filter(|n| self.tile(*n).status == TileStatus::Hidden),
                );
            }
        }
    }

    pub fn safe_tiles(&self) -> usize {
        self.height * self.width - self.mines
    }

    pub fn win_threshold(&self) -> usize {
        self.safe_tiles().div_ceil(2)
    }

    /// Win evaluator. A triggered mine beats everything; otherwise the first
    /// side to own a majority of the safe tiles wins. Derivable from board
    /// state alone, nothing is stored.
    pub fn evaluate(&self) -> Option<MatchResult> {
        if let Some(side) = self.exploded_by {
            return Some(MatchResult {
                winner: side.opponent(),
                reason: WinReason::MineTriggered,
            });
        }
        let threshold = self.win_threshold();
        if self.revealed_blue >= threshold {
            Some(MatchResult {
                winner: Side::Blue,
                reason: WinReason::TerritoryMajority,
            })
        } else if self.revealed_red >= threshold {
            Some(MatchResult {
                winner: Side::Red,
                reason: WinReason::TerritoryMajority,
            })
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> Vec<Vec<TileView>> {
        self.tiles
            .chunks(self.width)
            .map(|row| row.iter().map(TileView::from).collect())
            .collect()
    }
}

impl From<&Tile> for TileView {
    fn from(tile: &Tile) -> Self {
        let status = match tile.status {
            TileStatus::Hidden => TileState::Hidden,
            TileStatus::Revealed(Side::Blue) => TileState::RevealedBlue,
            TileStatus::Revealed(Side::Red) => TileState::RevealedRed,
            TileStatus::Exploded => TileState::Mine,
        };
        Self {
            row: tile.row,
            col: tile.col,
            status,
        }
    }
}
