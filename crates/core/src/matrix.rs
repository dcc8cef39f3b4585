//! Matrix module - the playfield
//!
//! The matrix keeps three grids of identical size:
//!
//! - **locked**: blocks of pieces that have been placed
//! - **active**: the falling piece, redrawn every tick
//! - **ghost**: the hard-drop landing preview (negated piece codes)
//!
//! They are combined only when read ([`Matrix::cell`]); the overlays never leak
//! into the locked grid except through an explicit lock.
//!
//! Coordinates: `(x, y)` with `y` growing downward. Row 0 is never a legal
//! position for a piece cell: collision treats `y <= 0` as out of bounds.

use serde::{Deserialize, Serialize};

use crate::types::{Cell, PieceKind, Vec2, EMPTY};

/// One layer of the matrix, flat row-major storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            cells: vec![EMPTY; (width.max(0) * height.max(0)) as usize],
        }
    }

    #[inline(always)]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Get cell at position (x, y); None if out of bounds
    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        self.index(x, y).map(|idx| self.cells[idx])
    }

    /// Set cell at position (x, y); returns false if out of bounds
    pub fn set(&mut self, x: i32, y: i32, cell: Cell) -> bool {
        match self.index(x, y) {
            Some(idx) => {
                self.cells[idx] = cell;
                true
            }
            None => false,
        }
    }

    pub fn row(&self, y: i32) -> Option<&[Cell]> {
        let start = self.index(0, y)?;
        Some(&self.cells[start..start + self.width as usize])
    }

    /// Would `mask` placed at `position` hit a wall, the floor, row 0 or a block?
    pub fn collides(&self, mask: &[Vec2], position: Vec2) -> bool {
        mask.iter().any(|&cell| {
            let Vec2 { x, y } = position + cell;
            x < 0
                || x >= self.width
                || y <= 0
                || y >= self.height
                || self.cells[(y * self.width + x) as usize] != EMPTY
        })
    }

    pub fn fill(&mut self, cell: Cell) {
        self.cells.fill(cell);
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// Which grid of the matrix a write targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Locked,
    Active,
    Ghost,
}

/// Rows removed by a line clear
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineClear {
    /// Indices of the cleared rows (pre-clear numbering), top to bottom.
    pub rows: Vec<i32>,
    /// Cell values of each cleared row, same order as `rows`.
    pub cells: Vec<Vec<Cell>>,
}

impl LineClear {
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The playfield
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    locked: Grid,
    active: Grid,
    ghost: Grid,
    visible_top: i32,
}

impl Matrix {
    /// Create an empty matrix whose bottom `visible_height` rows are visible
    pub fn new(width: i32, height: i32, visible_height: i32) -> Self {
        Self {
            locked: Grid::new(width, height),
            active: Grid::new(width, height),
            ghost: Grid::new(width, height),
            visible_top: (height - visible_height).max(0),
        }
    }

    pub fn width(&self) -> i32 {
        self.locked.width
    }

    pub fn height(&self) -> i32 {
        self.locked.height
    }

    /// First visible row; rows above are the spawn buffer.
    pub fn visible_top(&self) -> i32 {
        self.visible_top
    }

    pub fn layer(&self, layer: Layer) -> &Grid {
        match layer {
            Layer::Locked => &self.locked,
            Layer::Active => &self.active,
            Layer::Ghost => &self.ghost,
        }
    }

    fn layer_mut(&mut self, layer: Layer) -> &mut Grid {
        match layer {
            Layer::Locked => &mut self.locked,
            Layer::Active => &mut self.active,
            Layer::Ghost => &mut self.ghost,
        }
    }

    pub fn locked(&self) -> &Grid {
        &self.locked
    }

    /// Test `mask` at `position` against the locked blocks and the bounds.
    pub fn collides(&self, mask: &[Vec2], position: Vec2) -> bool {
        self.locked.collides(mask, position)
    }

    /// Write a piece into a layer. Collision is the caller's business.
    pub fn insert(&mut self, mask: &[Vec2], position: Vec2, kind: PieceKind, layer: Layer) {
        let code = match layer {
            Layer::Ghost => -kind.code(),
            Layer::Locked | Layer::Active => kind.code(),
        };
        let grid = self.layer_mut(layer);
        for &cell in mask {
            let at = position + cell;
            grid.set(at.x, at.y, code);
        }
    }

    pub fn clear_layer(&mut self, layer: Layer) {
        self.layer_mut(layer).fill(EMPTY);
    }

    /// Set a single locked cell (fixtures, garbage).
    pub fn set_locked(&mut self, x: i32, y: i32, cell: Cell) -> bool {
        self.locked.set(x, y, cell)
    }

    /// Combined read: locked block, else active piece, else ghost marker.
    pub fn cell(&self, x: i32, y: i32) -> Option<Cell> {
        let locked = self.locked.get(x, y)?;
        if locked != EMPTY {
            return Some(locked);
        }
        let active = self.active.get(x, y)?;
        if active != EMPTY {
            return Some(active);
        }
        self.ghost.get(x, y)
    }

    pub fn is_row_full(&self, y: i32) -> bool {
        self.locked
            .row(y)
            .is_some_and(|row| row.iter().all(|&c| c != EMPTY))
    }

    pub fn is_row_empty(&self, y: i32) -> bool {
        self.locked
            .row(y)
            .map_or(true, |row| row.iter().all(|&c| c == EMPTY))
    }

    /// Remove every full row of the locked grid and shift the rows above down
    ///
    /// Uses a bottom-up two-pointer sweep; vacated rows at the top are zeroed.
    pub fn clear_full_rows(&mut self) -> LineClear {
        let width = self.locked.width as usize;
        let height = self.locked.height;
        let mut cleared = LineClear::default();
        let mut write_y = height;

        for read_y in (0..height).rev() {
            if self.is_row_full(read_y) {
                let start = read_y as usize * width;
                cleared.rows.push(read_y);
                cleared
                    .cells
                    .push(self.locked.cells[start..start + width].to_vec());
            } else {
                write_y -= 1;
                if write_y != read_y {
                    let src = read_y as usize * width;
                    let dst = write_y as usize * width;
                    self.locked.cells.copy_within(src..src + width, dst);
                }
            }
        }

        self.locked.cells[..write_y as usize * width].fill(EMPTY);

        cleared.rows.reverse();
        cleared.cells.reverse();
        cleared
    }

    /// Reset every layer.
    pub fn clear(&mut self) {
        self.locked.fill(EMPTY);
        self.active.fill(EMPTY);
        self.ghost.fill(EMPTY);
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::new(
            crate::types::DEFAULT_MATRIX_WIDTH,
            crate::types::DEFAULT_MATRIX_HEIGHT,
            crate::types::DEFAULT_VISIBLE_HEIGHT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOT: [Vec2; 1] = [Vec2::new(0, 0)];

    #[test]
    fn test_grid_index_calculation() {
        let grid = Grid::new(10, 40);
        assert_eq!(grid.index(0, 0), Some(0));
        assert_eq!(grid.index(9, 0), Some(9));
        assert_eq!(grid.index(0, 1), Some(10));
        assert_eq!(grid.index(9, 39), Some(399));
        assert_eq!(grid.index(-1, 0), None);
        assert_eq!(grid.index(10, 0), None);
        assert_eq!(grid.index(0, 40), None);
    }

    #[test]
    fn test_row_zero_is_out_of_bounds() {
        let matrix = Matrix::default();
        assert!(matrix.collides(&DOT, Vec2::new(4, 0)));
        assert!(!matrix.collides(&DOT, Vec2::new(4, 1)));
    }

    #[test]
    fn test_overlays_do_not_touch_locked_grid() {
        let mut matrix = Matrix::default();
        matrix.insert(&DOT, Vec2::new(3, 30), PieceKind::T, Layer::Active);
        matrix.insert(&DOT, Vec2::new(3, 39), PieceKind::T, Layer::Ghost);

        assert!(!matrix.collides(&DOT, Vec2::new(3, 30)));
        assert_eq!(matrix.cell(3, 30), Some(PieceKind::T.code()));
        assert_eq!(matrix.cell(3, 39), Some(-PieceKind::T.code()));

        matrix.clear_layer(Layer::Active);
        assert_eq!(matrix.cell(3, 30), Some(EMPTY));
    }

    #[test]
    fn test_insert_skips_cells_outside_grid() {
        let mut matrix = Matrix::new(4, 6, 4);
        let mask = [Vec2::new(0, 0), Vec2::new(1, 0)];
        matrix.insert(&mask, Vec2::new(3, 2), PieceKind::O, Layer::Locked);
        assert_eq!(matrix.cell(3, 2), Some(PieceKind::O.code()));
    }

    #[test]
    fn test_row_queries() {
        let mut matrix = Matrix::new(4, 6, 4);
        assert!(matrix.is_row_empty(5));
        assert!(!matrix.is_row_full(5));
        for x in 0..4 {
            matrix.set_locked(x, 5, 1);
        }
        assert!(matrix.is_row_full(5));
        assert!(!matrix.is_row_empty(5));
        assert!(matrix.is_row_empty(99));
    }
}
