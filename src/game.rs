//! Game-side value types: controller keys, policy actions and the observed state.

use std::fmt::Display;

/// A controller key as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    #[allow(missing_docs)]
    Right,
    #[allow(missing_docs)]
    Left,
    #[allow(missing_docs)]
    Up,
    #[allow(missing_docs)]
    Down,
    #[allow(missing_docs)]
    A,
    #[allow(missing_docs)]
    B,
    #[allow(missing_docs)]
    Start,
}

impl Key {
    /// Every key, in wire order.
    pub const ALL: [Key; 7] = [
        Key::Right,
        Key::Left,
        Key::Up,
        Key::Down,
        Key::A,
        Key::B,
        Key::Start,
    ];

    /// Name used in `{"key":{"value": ...}}`.
    pub fn as_str(self) -> &'static str {
        match self {
            Key::Right => "Right",
            Key::Left => "Left",
            Key::Up => "Up",
            Key::Down => "Down",
            Key::A => "A",
            Key::B => "B",
            Key::Start => "Start",
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moves a policy may choose from, indexed by output neuron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Output 0.
    Right,
    /// Output 1.
    Left,
    /// Output 2.
    Up,
    /// Output 3.
    Down,
    /// Output 4, jump.
    ButtonA,
}

impl Action {
    /// Actions in output-index order.
    pub const ALL: [Action; 5] = [
        Action::Right,
        Action::Left,
        Action::Up,
        Action::Down,
        Action::ButtonA,
    ];

    /// Action bound to output neuron `index`.
    pub fn from_index(index: usize) -> Option<Action> {
        Self::ALL.get(index).copied()
    }

    /// Pick the action of the largest output; the first one wins a tie.
    ///
    /// Returns `None` for an empty output, or when the winner has no action bound to it
    /// (policies with more than five outputs).
    pub fn from_outputs(outputs: &[f64]) -> Option<Action> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &value) in outputs.iter().enumerate() {
            match best {
                Some((_, max)) if value <= max || value.is_nan() => {}
                None if value.is_nan() => {}
                _ => best = Some((i, value)),
            }
        }
        best.and_then(|(i, _)| Action::from_index(i))
    }

    /// Key pressed for this action.
    pub fn key(self) -> Key {
        match self {
            Action::Right => Key::Right,
            Action::Left => Key::Left,
            Action::Up => Key::Up,
            Action::Down => Key::Down,
            Action::ButtonA => Key::A,
        }
    }
}

/// Emulation speed accepted by `config.speed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    #[allow(missing_docs)]
    Normal,
    /// Used for evaluation.
    #[default]
    Maximum,
    #[allow(missing_docs)]
    Turbo,
}

impl Speed {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Speed::Normal => "normal",
            Speed::Maximum => "maximum",
            Speed::Turbo => "turbo",
        }
    }
}

impl std::str::FromStr for Speed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Speed::Normal),
            "maximum" => Ok(Speed::Maximum),
            "turbo" => Ok(Speed::Turbo),
            other => Err(format!("unknown speed '{other}'")),
        }
    }
}

/// Square tile neighbourhood centred on the player, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    side: usize,
    cells: Vec<i32>,
}

impl TileGrid {
    /// All-zero grid of `side × side` cells.
    pub fn zeros(side: usize) -> TileGrid {
        TileGrid {
            side,
            cells: vec![0; side * side],
        }
    }

    /// Build a grid from full rows. Every row must be `rows.len()` long.
    pub fn from_rows(rows: &[Vec<i32>]) -> Option<TileGrid> {
        let side = rows.len();
        if rows.iter().any(|r| r.len() != side) {
            return None;
        }
        Some(TileGrid {
            side,
            cells: rows.concat(),
        })
    }

    /// Number of rows (and columns).
    pub fn side(&self) -> usize {
        self.side
    }

    /// Cell at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<i32> {
        if row < self.side && col < self.side {
            Some(self.cells[row * self.side + col])
        } else {
            None
        }
    }

    /// Mutable view of one row.
    pub fn row_mut(&mut self, row: usize) -> Option<&mut [i32]> {
        if row < self.side {
            let start = row * self.side;
            Some(&mut self.cells[start..start + self.side])
        } else {
            None
        }
    }

    /// One row.
    pub fn row(&self, row: usize) -> Option<&[i32]> {
        if row < self.side {
            let start = row * self.side;
            Some(&self.cells[start..start + self.side])
        } else {
            None
        }
    }

    /// Sum of every cell.
    pub fn sum(&self) -> i64 {
        self.cells.iter().map(|&c| i64::from(c)).sum()
    }

    /// Cells row-major.
    pub fn cells(&self) -> &[i32] {
        &self.cells
    }

    /// Policy input: cells row-major followed by a constant `1.0` bias.
    pub fn to_input(&self) -> Vec<f64> {
        let mut input = Vec::with_capacity(self.cells.len() + 1);
        input.extend(self.cells.iter().map(|&c| f64::from(c)));
        input.push(1.0);
        input
    }
}

/// One decoded `game info` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    /// Tiles around the player.
    pub tiles: TileGrid,
    /// Horizontal position in the level.
    pub mario_x: i32,
    /// Vertical position.
    pub mario_y: i32,
    /// Remaining lives.
    pub lives: i32,
    /// Raw player-state code from the emulator RAM.
    pub player_state: i32,
    /// Coin count, when the server reports it.
    pub coins: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_first_occurrence_wins() {
        assert_eq!(
            Action::from_outputs(&[0.1, 0.9, 0.3, 0.9, 0.2]),
            Some(Action::Left)
        );
        assert_eq!(Action::from_outputs(&[0.5; 5]), Some(Action::Right));
        assert_eq!(
            Action::from_outputs(&[0.0, 0.0, 0.0, 0.0, 1.0]),
            Some(Action::ButtonA)
        );
    }

    #[test]
    fn argmax_ignores_nan_and_unbound_outputs() {
        assert_eq!(
            Action::from_outputs(&[f64::NAN, 0.2, 0.1]),
            Some(Action::Left)
        );
        assert_eq!(Action::from_outputs(&[0.0, 0.0, 0.0, 0.0, 0.0, 5.0]), None);
        assert_eq!(Action::from_outputs(&[]), None);
    }

    #[test]
    fn jump_presses_a() {
        assert_eq!(Action::ButtonA.key(), Key::A);
        assert_eq!(Action::ButtonA.key().as_str(), "A");
    }

    #[test]
    fn input_is_row_major_with_bias() {
        let grid = TileGrid::from_rows(&[vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]).unwrap();
        assert_eq!(
            grid.to_input(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 1.0]
        );
        assert_eq!(grid.sum(), 45);
        assert_eq!(grid.get(1, 2), Some(6));
        assert_eq!(grid.get(3, 0), None);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(TileGrid::from_rows(&[vec![1, 2], vec![3]]).is_none());
    }

    #[test]
    fn speed_parses_case_insensitively() {
        assert_eq!("Turbo".parse::<Speed>(), Ok(Speed::Turbo));
        assert!("fast".parse::<Speed>().is_err());
    }
}
