//! Tiled processing for large rasters

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use thermogis_core::raster::{Raster, RasterElement};
use thermogis_core::Result;

/// A tile representing a subset of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Row offset in the source raster
    pub row_offset: usize,
    /// Column offset in the source raster
    pub col_offset: usize,
    /// Number of rows in this tile
    pub rows: usize,
    /// Number of columns in this tile
    pub cols: usize,
}

impl Tile {
    /// Create a new tile
    pub fn new(row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_offset,
            col_offset,
            rows,
            cols,
        }
    }

    /// Convert tile-local coordinates to source raster coordinates
    pub fn to_source_coords(&self, local_row: usize, local_col: usize) -> (usize, usize) {
        (self.row_offset + local_row, self.col_offset + local_col)
    }

    /// Source (row, col) of every cell, row-major
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.rows).flat_map(move |r| (0..self.cols).map(move |c| self.to_source_coords(r, c)))
    }

    /// Number of cells in the tile
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether the tile holds no cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator over non-overlapping tiles covering a grid, row-major
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_rows: usize,
    tile_cols: usize,
    current_row: usize,
    current_col: usize,
}

impl TileIterator {
    /// Create a new tile iterator; a zero tile size is treated as 1
    pub fn new(total_rows: usize, total_cols: usize, tile_size: usize) -> Self {
        let tile_size = tile_size.max(1);
        Self {
            total_rows,
            total_cols,
            tile_rows: tile_size,
            tile_cols: tile_size,
            current_row: 0,
            current_col: 0,
        }
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let row_end = (self.current_row + self.tile_rows).min(self.total_rows);
        let col_end = (self.current_col + self.tile_cols).min(self.total_cols);
        let tile = Tile::new(
            self.current_row,
            self.current_col,
            row_end - self.current_row,
            col_end - self.current_col,
        );

        self.current_col += self.tile_cols;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.tile_rows;
        }

        Some(tile)
    }
}

/// Processor for tiled raster operations.
///
/// Tiles are independent units of work. Per-tile results are always
/// combined in tile order, so floating-point reductions give the same
/// answer whether or not the `parallel` feature is enabled.
#[derive(Debug, Clone, Copy)]
pub struct TiledProcessor {
    tile_size: usize,
}

impl Default for TiledProcessor {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TiledProcessor {
    /// Create a new tiled processor
    pub fn new(tile_size: usize) -> Self {
        Self {
            tile_size: tile_size.max(1),
        }
    }

    /// Tile edge length in pixels
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Tiles covering a `rows` x `cols` grid
    pub fn tiles(&self, rows: usize, cols: usize) -> Vec<Tile> {
        TileIterator::new(rows, cols, self.tile_size).collect()
    }

    /// Fold every cell of the grid into an accumulator.
    ///
    /// Each tile starts from `identity()` and folds its cells in row-major
    /// order with `fold`; tile accumulators are then merged left to right
    /// with `merge`.
    pub fn reduce<A, I, F, M>(&self, rows: usize, cols: usize, identity: I, fold: F, merge: M) -> A
    where
        A: Send,
        I: Fn() -> A + Sync + Send,
        F: Fn(A, usize, usize) -> A + Sync + Send,
        M: Fn(A, A) -> A,
    {
        let tiles = self.tiles(rows, cols);
        let fold_tile = |tile: Tile| tile.cells().fold(identity(), |acc, (r, c)| fold(acc, r, c));

        #[cfg(feature = "parallel")]
        let partials: Vec<A> = tiles.into_par_iter().map(fold_tile).collect();
        #[cfg(not(feature = "parallel"))]
        let partials: Vec<A> = tiles.into_iter().map(fold_tile).collect();

        partials.into_iter().fold(identity(), merge)
    }

    /// Evaluate `f` for every cell and assemble the results into a raster
    /// sharing `input`'s georeferencing.
    ///
    /// `f` receives (row, col, value, neighbor) where `neighbor(dr, dc)`
    /// returns the input value at the given offset, or `None` outside the grid.
    pub fn focal<T, U, F>(&self, input: &Raster<T>, nodata: Option<U>, f: F) -> Result<Raster<U>>
    where
        T: RasterElement,
        U: RasterElement,
        F: Fn(usize, usize, T, &dyn Fn(isize, isize) -> Option<T>) -> U + Sync + Send,
    {
        let (rows, cols) = input.shape();
        let data = input.data();

        let run_tile = |tile: Tile| -> (Tile, Vec<U>) {
            let values = tile
                .cells()
                .map(|(row, col)| {
                    let neighbor = |dr: isize, dc: isize| -> Option<T> {
                        let nr = row as isize + dr;
                        let nc = col as isize + dc;
                        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                            None
                        } else {
                            Some(data[[nr as usize, nc as usize]])
                        }
                    };
                    f(row, col, data[[row, col]], &neighbor)
                })
                .collect();
            (tile, values)
        };

        let tiles = self.tiles(rows, cols);
        #[cfg(feature = "parallel")]
        let results: Vec<(Tile, Vec<U>)> = tiles.into_par_iter().map(run_tile).collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<(Tile, Vec<U>)> = tiles.into_iter().map(run_tile).collect();

        let mut output = vec![U::zero(); rows * cols];
        for (tile, values) in results {
            for ((row, col), value) in tile.cells().zip(values) {
                output[row * cols + col] = value;
            }
        }
        input.derive(output, nodata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_iterator() {
        let tiles: Vec<_> = TileIterator::new(100, 70, 32).collect();
        assert_eq!(tiles.len(), 4 * 3);
        assert_eq!(tiles[0], Tile::new(0, 0, 32, 32));
        assert_eq!(tiles.last().copied(), Some(Tile::new(96, 64, 4, 6)));
    }

    #[test]
    fn test_tile_coverage() {
        let rows = 100;
        let cols = 100;
        let mut covered = vec![vec![0u8; cols]; rows];

        for tile in TileIterator::new(rows, cols, 32) {
            for (r, c) in tile.cells() {
                covered[r][c] += 1;
            }
        }

        for r in 0..rows {
            for c in 0..cols {
                assert_eq!(covered[r][c], 1, "Cell ({}, {}) covered {} times", r, c, covered[r][c]);
            }
        }
    }

    #[test]
    fn test_empty_grid_has_no_tiles() {
        assert_eq!(TileIterator::new(0, 10, 8).count(), 0);
        assert_eq!(TileIterator::new(10, 0, 8).count(), 0);
    }

    #[test]
    fn test_reduce_sum_matches_sequential() {
        let processor = TiledProcessor::new(7);
        let total = processor.reduce(50, 40, || 0usize, |acc, r, c| acc + r * 40 + c, |a, b| a + b);
        let n = 50 * 40;
        assert_eq!(total, n * (n - 1) / 2);
    }

    #[test]
    fn test_focal_counts_neighbors() {
        let input: Raster<f64> = Raster::filled(5, 5, 1.0);
        let counts = TiledProcessor::new(2)
            .focal(&input, None, |_, _, _, neighbor| {
                let mut n = 0.0;
                for dr in -1..=1 {
                    for dc in -1..=1 {
                        n += neighbor(dr, dc).unwrap_or(0.0);
                    }
                }
                n
            })
            .unwrap();
        assert_eq!(counts.get(0, 0).unwrap(), 4.0);
        assert_eq!(counts.get(0, 2).unwrap(), 6.0);
        assert_eq!(counts.get(2, 2).unwrap(), 9.0);
    }
}
