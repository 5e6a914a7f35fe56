use crate::model::Side;

/// Side length of the square mine-free home region in each side's corner.
pub const HOME_REGION_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    Hidden,
    Revealed(Side),
    Exploded,
}

#[derive(Debug)]
pub struct Tile {
    pub row: usize,
    pub col: usize,
    pub has_mine: bool,
    pub status: TileStatus,
}

/// The authoritative grid for one match. Mine layout is fixed at creation;
/// tile statuses only ever move away from `Hidden`.
#[derive(Debug)]
pub struct Board {
    pub height: usize,
    pub width: usize,
    pub mines: usize,
    pub revealed_blue: usize,
    pub revealed_red: usize,
    pub exploded_by: Option<Side>,
    pub tiles: Vec<Tile>,
}
