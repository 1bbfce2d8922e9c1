// rust/sharding-core/src/sharding/tile.rs

use std::ops::Range;

/// Reason a tensor shape does not fit a tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeMismatch {
    /// Grid rank differs from tensor rank.
    Rank { grid: usize, shape: usize },
    /// Dimension `dim` of `size` elements does not split evenly into `tiles`.
    Indivisible { dim: usize, size: usize, tiles: usize },
}

/// The region of a tensor owned by one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSlice {
    /// Row-major index of the tile within the grid.
    pub tile_index: usize,
    /// Core that owns this tile.
    pub core: usize,
    /// Half-open element range along every tensor dimension.
    pub ranges: Vec<Range<usize>>,
}

/// Borrowed view of a tiled sharding's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid<'a> {
    dims: &'a [usize],
    devices: &'a [usize],
}

impl<'a> TileGrid<'a> {
    pub fn new(dims: &'a [usize], devices: &'a [usize]) -> Self {
        Self { dims, devices }
    }

    /// Tile counts per dimension.
    pub fn dims(&self) -> &'a [usize] {
        self.dims
    }

    /// Total number of tiles, saturating on overflow.
    pub fn size(&self) -> usize {
        self.dims.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Whether the device list has exactly one entry per tile.
    pub fn is_consistent(&self) -> bool {
        self.size() == self.devices.len()
    }

    /// Position of `core` in the device order, if it owns a tile.
    pub fn position_of(&self, core: usize) -> Option<usize> {
        self.devices.iter().position(|&d| d == core)
    }

    /// Grid coordinates of a row-major tile index.
    pub fn coordinates(&self, tile_index: usize) -> Vec<usize> {
        let mut coords = vec![0; self.dims.len()];
        let mut rest = tile_index;
        for (axis, &count) in self.dims.iter().enumerate().rev() {
            coords[axis] = rest % count;
            rest /= count;
        }
        coords
    }

    /// Dimensions that are actually split, with their tile counts, in
    /// ascending dimension order.
    pub fn split_dims(&self) -> Vec<(usize, usize)> {
        self.dims
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 1)
            .map(|(dim, &count)| (dim, count))
            .collect()
    }

    /// Shape of a single tile of a tensor with the given global shape.
    pub fn tile_shape(&self, shape: &[usize]) -> Result<Vec<usize>, ShapeMismatch> {
        if shape.len() != self.dims.len() {
            return Err(ShapeMismatch::Rank {
                grid: self.dims.len(),
                shape: shape.len(),
            });
        }
        shape
            .iter()
            .zip(self.dims)
            .enumerate()
            .map(|(dim, (&size, &tiles))| {
                if size % tiles == 0 {
                    Ok(size / tiles)
                } else {
                    Err(ShapeMismatch::Indivisible { dim, size, tiles })
                }
            })
            .collect()
    }

    /// Element ranges of every tile, in row-major tile order.
    pub fn slices(&self, shape: &[usize]) -> Result<Vec<TileSlice>, ShapeMismatch> {
        let tile_shape = self.tile_shape(shape)?;
        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(tile_index, &core)| {
                let ranges = self
                    .coordinates(tile_index)
                    .iter()
                    .zip(&tile_shape)
                    .map(|(&coord, &extent)| coord * extent..(coord + 1) * extent)
                    .collect();
                TileSlice {
                    tile_index,
                    core,
                    ranges,
                }
            })
            .collect())
    }
}
