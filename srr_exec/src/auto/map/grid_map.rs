//! # Generic Layered Grid Map
//!
//! A map over a rectangular world divided into uniform square cells, with
//! any number of layers of the same cell type. The world origin sits at the
//! lower left corner of the map, so cell `[0, 0]` covers the position range
//! `[0, cell_size)` on both axes, cell indices are `[x, y]` and no axis is
//! ever flipped between positions and cells.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A layered map over a grid of uniform square cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridMap<T, L>
where
    L: Eq + Hash,
{
    /// Side length of a cell in metres.
    cell_size_m: f64,

    /// Number of cells along `[x, y]`.
    num_cells: [usize; 2],

    /// Maps a layer to its index along the first axis of `data`.
    layer_map: HashMap<L, usize>,

    /// Backing data, indexed `[layer, cell_x, cell_y]`.
    data: Array3<T>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can arise when using a [`GridMap`].
#[derive(Debug, thiserror::Error)]
pub enum GridMapError {
    #[error("The requested layer is not present in the map")]
    LayerNotInMap,

    #[error("Cell {0:?} is outside the map")]
    CellOutOfBounds([usize; 2]),

    #[error("Position {0:?} m is outside the map")]
    PositionOutOfMap([f64; 2]),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T, L> GridMap<T, L>
where
    T: Clone,
    L: Copy + Eq + Hash,
{
    /// Create a new map in which every cell of every layer holds `initial`.
    pub fn new(cell_size_m: f64, num_cells: [usize; 2], layers: &[L], initial: T) -> Self {
        let mut layer_map = HashMap::with_capacity(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            layer_map.insert(*layer, index);
        }

        Self {
            cell_size_m,
            num_cells,
            layer_map,
            data: Array3::from_elem((layers.len(), num_cells[0], num_cells[1]), initial),
        }
    }

    /// Number of cells along `[x, y]`.
    pub fn num_cells(&self) -> [usize; 2] {
        self.num_cells
    }

    /// Side length of a cell in metres.
    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    /// The cell containing the given world position, or an error if the
    /// position lies outside the map.
    pub fn position_to_cell(&self, pos_m: &Vector2<f64>) -> Result<[usize; 2], GridMapError> {
        let x = (pos_m[0] / self.cell_size_m).floor();
        let y = (pos_m[1] / self.cell_size_m).floor();

        if x < 0.0 || y < 0.0 || x >= self.num_cells[0] as f64 || y >= self.num_cells[1] as f64 {
            return Err(GridMapError::PositionOutOfMap([pos_m[0], pos_m[1]]));
        }

        Ok([x as usize, y as usize])
    }

    /// The cell containing the given world position, with positions outside
    /// the map clipped onto the border cells.
    ///
    /// Detections slightly beyond the world edge belong on the edge, not in
    /// the bin, so accumulation uses this rather than the checked variant.
    pub fn position_to_cell_clipped(&self, pos_m: &Vector2<f64>) -> [usize; 2] {
        let clip = |value_m: f64, cells: usize| -> usize {
            let cell = (value_m / self.cell_size_m).floor();
            if cell < 0.0 {
                0
            } else if cell > (cells - 1) as f64 {
                cells - 1
            } else {
                cell as usize
            }
        };

        [
            clip(pos_m[0], self.num_cells[0]),
            clip(pos_m[1], self.num_cells[1]),
        ]
    }

    /// World position of the centre of the given cell.
    pub fn cell_centre(&self, cell: [usize; 2]) -> Vector2<f64> {
        Vector2::new(
            (cell[0] as f64 + 0.5) * self.cell_size_m,
            (cell[1] as f64 + 0.5) * self.cell_size_m,
        )
    }

    /// Reference to the value of a cell in a layer.
    pub fn get(&self, layer: L, cell: [usize; 2]) -> Result<&T, GridMapError> {
        let index = self.layer_index(layer)?;

        self.data
            .get([index, cell[0], cell[1]])
            .ok_or(GridMapError::CellOutOfBounds(cell))
    }

    /// Mutable reference to the value of a cell in a layer.
    pub fn get_mut(&mut self, layer: L, cell: [usize; 2]) -> Result<&mut T, GridMapError> {
        let index = self.layer_index(layer)?;

        self.data
            .get_mut([index, cell[0], cell[1]])
            .ok_or(GridMapError::CellOutOfBounds(cell))
    }

    /// View of an entire layer, indexed `[cell_x, cell_y]`.
    pub fn layer_view(&self, layer: L) -> Result<ArrayView2<T>, GridMapError> {
        let index = self.layer_index(layer)?;

        Ok(self.data.index_axis(Axis(0), index))
    }

    fn layer_index(&self, layer: L) -> Result<usize, GridMapError> {
        self.layer_map
            .get(&layer)
            .copied()
            .ok_or(GridMapError::LayerNotInMap)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
