//! Decomposition of a plane region into tiles.

use crate::format::Region;

/// Row-major grid of tiles covering a region.
///
/// Tiles have the nominal size except in the last column and row, which
/// hold the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    area: Region,
    tile_width: u32,
    tile_height: u32,
}

impl TileGrid {
    /// Grid over `area` with the given nominal tile size (at least 1x1).
    pub fn new(area: Region, tile_width: u32, tile_height: u32) -> Self {
        Self {
            area,
            tile_width: tile_width.clamp(1, area.width.max(1)),
            tile_height: tile_height.clamp(1, area.height.max(1)),
        }
    }

    /// The region the grid covers.
    pub fn area(&self) -> Region {
        self.area
    }

    pub fn columns(&self) -> u32 {
        self.area.width.div_ceil(self.tile_width)
    }

    pub fn rows(&self) -> u32 {
        self.area.height.div_ceil(self.tile_height)
    }

    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tile at `(column, row)` in plane coordinates.
    pub fn tile(&self, column: u32, row: u32) -> Region {
        let x = column * self.tile_width;
        let y = row * self.tile_height;
        Region::new(
            self.area.x + x,
            self.area.y + y,
            self.tile_width.min(self.area.width - x),
            self.tile_height.min(self.area.height - y),
        )
    }

    /// Position of a plane-coordinate tile relative to the grid's area.
    pub fn relative(&self, tile: &Region) -> Region {
        Region::new(
            tile.x - self.area.x,
            tile.y - self.area.y,
            tile.width,
            tile.height,
        )
    }

    /// Every tile, row by row.
    pub fn tiles(&self) -> impl Iterator<Item = Region> + '_ {
        (0..self.rows())
            .flat_map(move |row| (0..self.columns()).map(move |col| self.tile(col, row)))
    }
}

/// Copy a tile into a buffer holding the whole grid area.
///
/// `pixel_bytes` is the size of one sample; `samples` and `interleaved`
/// describe how samples are laid out in both buffers.
pub fn paste_tile(
    dest: &mut [u8],
    area: &Region,
    tile: &Region,
    bytes: &[u8],
    pixel_bytes: usize,
    samples: usize,
    interleaved: bool,
) {
    let (blocks, pixel) = if interleaved {
        (1, pixel_bytes * samples)
    } else {
        (samples, pixel_bytes)
    };
    let width = area.width as usize;
    let block_size = area.area() * pixel;
    let row = tile.width as usize * pixel;
    let (tx, ty) = ((tile.x - area.x) as usize, (tile.y - area.y) as usize);

    for block in 0..blocks {
        for y in 0..tile.height as usize {
            let dst = block * block_size + ((ty + y) * width + tx) * pixel;
            let src = (block * tile.height as usize + y) * row;
            dest[dst..dst + row].copy_from_slice(&bytes[src..src + row]);
        }
    }
}
