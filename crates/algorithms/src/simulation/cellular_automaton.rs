//! Neighbourhood-driven urban growth
//!
//! Each iteration convolves the urban state with a weight kernel and turns a
//! non-urban cell urban when its weighted count of urban neighbours is
//! strictly greater than the growth threshold. Urban cells never revert, so
//! the urban count is non-decreasing and the automaton reaches a fixed point
//! after finitely many steps.

use super::markov::{urban_count, MASKED, NON_URBAN, URBAN};
use serde::{Deserialize, Serialize};
use thermogis_core::raster::{Neighborhood, NeighborhoodKernel, Raster};
use thermogis_core::{Algorithm, Error, Result};
use thermogis_parallel::TiledProcessor;
use tracing::{debug, info, instrument};

/// Parameters for [`CellularAutomaton`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaParams {
    /// Neighbourhood shape with unit weights
    pub neighborhood: Neighborhood,
    /// Whether the cell itself is part of its neighbourhood
    pub include_center: bool,
    /// Growth happens when the weighted urban count is strictly above this
    pub growth_threshold: f64,
    /// Maximum number of iterations
    pub iterations: usize,
}

impl Default for CaParams {
    fn default() -> Self {
        Self {
            neighborhood: Neighborhood::Queen3x3,
            include_center: true,
            growth_threshold: 1.0,
            iterations: 10,
        }
    }
}

/// Final state of a simulation run
#[derive(Debug, Clone)]
pub struct CaOutcome {
    pub state: Raster<u8>,
    /// Iterations executed, including the one that found a fixed point
    pub iterations_run: usize,
    /// Whether the last iteration left the state unchanged
    pub converged: bool,
    /// Urban cell count before the first iteration and after each one
    pub urban_counts: Vec<usize>,
}

/// Cellular automaton over a binary urban raster
#[derive(Debug, Clone)]
pub struct CellularAutomaton {
    kernel: NeighborhoodKernel,
    growth_threshold: f64,
    iterations: usize,
    tiles: TiledProcessor,
}

impl Default for CellularAutomaton {
    fn default() -> Self {
        Self::new(CaParams::default())
    }
}

impl CellularAutomaton {
    pub fn new(params: CaParams) -> Self {
        Self {
            kernel: NeighborhoodKernel::unit(params.neighborhood, params.include_center),
            growth_threshold: params.growth_threshold,
            iterations: params.iterations,
            tiles: TiledProcessor::default(),
        }
    }

    /// Replace the unit kernel with explicit weights
    pub fn with_kernel(mut self, kernel: NeighborhoodKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn kernel(&self) -> &NeighborhoodKernel {
        &self.kernel
    }

    /// One growth step. Out-of-bounds and masked neighbours count 0.
    pub fn step(&self, state: &Raster<u8>) -> Result<Raster<u8>> {
        let taps = self.kernel.taps();
        let threshold = self.growth_threshold;
        self.tiles.focal(state, Some(MASKED), |_, _, value, neighbor| {
            if value != NON_URBAN {
                return if value == URBAN { URBAN } else { MASKED };
            }
            let count: f64 = taps
                .iter()
                .filter(|&&(dr, dc, _)| neighbor(dr, dc) == Some(URBAN))
                .map(|&(_, _, w)| w)
                .sum();
            if count > threshold {
                URBAN
            } else {
                NON_URBAN
            }
        })
    }

    /// Iterate from `initial` until the iteration limit or a fixed point.
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] for a non-finite growth threshold.
    #[instrument(skip_all, fields(iterations = self.iterations))]
    pub fn run(&self, initial: &Raster<u8>) -> Result<CaOutcome> {
        if !self.growth_threshold.is_finite() {
            return Err(Error::InvalidParameter {
                name: "growth_threshold",
                value: self.growth_threshold.to_string(),
                reason: "must be finite".to_string(),
            });
        }

        let mut state = initial.clone();
        state.set_nodata(Some(MASKED));
        let mut urban_counts = vec![urban_count(&state)];
        let mut converged = false;
        let mut iterations_run = 0;

        while iterations_run < self.iterations {
            let next = self.step(&state)?;
            iterations_run += 1;
            let count = urban_count(&next);
            let changed = count != urban_counts[urban_counts.len() - 1];
            urban_counts.push(count);
            state = next;
            debug!(iteration = iterations_run, urban = count, "CA step");
            if !changed {
                converged = true;
                break;
            }
        }

        info!(
            iterations_run,
            converged,
            urban = urban_counts[urban_counts.len() - 1],
            "cellular automaton finished"
        );
        Ok(CaOutcome {
            state,
            iterations_run,
            converged,
            urban_counts,
        })
    }
}

impl Algorithm for CellularAutomaton {
    type Input = Raster<u8>;
    type Output = CaOutcome;
    type Params = CaParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "CellularAutomaton"
    }

    fn description(&self) -> &'static str {
        "Urban growth by thresholded neighbourhood counts"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        CellularAutomaton::new(params).run(&input)
    }
}
