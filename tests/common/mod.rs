#![allow(dead_code)]

use chainsim::cells::{Cells, PeriodicCells};
use chainsim::core::{Branch, StateId, Time, Unit, ROOT};
use chainsim::error::Result;
use chainsim::potential::{Estimator, Potential};
use chainsim::setting::Setting;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Regular lattice of `per_side^dimension` cells over a hypercubic periodic box.
///
/// Cells are flat indices. The zero cell sits in the middle of the box so that the corners of
/// relative cells agree with minimum-image separations (requires odd `per_side`).
#[derive(Debug)]
pub struct Lattice {
    setting: Setting,
    per_side: usize,
}

impl Lattice {
    pub fn new(setting: Setting, per_side: usize) -> Self {
        Self { setting, per_side }
    }

    fn width(&self, d: usize) -> f64 {
        self.setting.system_lengths()[d] / self.per_side as f64
    }

    fn decode(&self, mut cell: usize) -> Vec<usize> {
        (0..self.setting.dimension())
            .map(|_| {
                let c = cell % self.per_side;
                cell /= self.per_side;
                c
            })
            .collect()
    }

    fn encode(&self, coordinates: &[usize]) -> usize {
        coordinates
            .iter()
            .rev()
            .fold(0, |acc, &c| acc * self.per_side + c % self.per_side)
    }

    fn center(&self) -> usize {
        self.per_side / 2
    }
}

impl Cells for Lattice {
    type Cell = usize;

    fn position_to_cell(&self, position: &[f64]) -> usize {
        let coordinates: Vec<usize> = position
            .iter()
            .enumerate()
            .map(|(d, x)| ((x / self.width(d)) as usize).min(self.per_side - 1))
            .collect();
        self.encode(&coordinates)
    }

    fn cells(&self) -> Vec<usize> {
        (0..self.per_side.pow(self.setting.dimension() as u32)).collect()
    }

    fn separation_vector(&self, from: &[f64], to: &[f64]) -> Vec<f64> {
        self.setting.separation_vector(from, to)
    }
}

impl PeriodicCells for Lattice {
    fn zero_cell(&self) -> usize {
        self.encode(&vec![self.center(); self.setting.dimension()])
    }

    fn nearby_cells(&self, cell: usize) -> Vec<usize> {
        let base = self.decode(cell);
        let mut out = vec![Vec::new()];
        for &c in &base {
            out = out
                .into_iter()
                .flat_map(|prefix: Vec<usize>| {
                    [self.per_side - 1, 0, 1].into_iter().map(move |offset| {
                        let mut next = prefix.clone();
                        next.push((c + offset) % self.per_side);
                        next
                    })
                })
                .collect();
        }
        let mut cells: Vec<usize> = out.iter().map(|c| self.encode(c)).collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    fn relative_cell(&self, cell: usize, reference: usize) -> usize {
        let n = self.per_side;
        let coordinates: Vec<usize> = self
            .decode(cell)
            .into_iter()
            .zip(self.decode(reference))
            .map(|(c, r)| (c + 2 * n - r + self.center()) % n)
            .collect();
        self.encode(&coordinates)
    }

    fn translate(&self, cell: usize, relative: usize) -> usize {
        let n = self.per_side;
        let coordinates: Vec<usize> = self
            .decode(cell)
            .into_iter()
            .zip(self.decode(relative))
            .map(|(c, r)| (c + r + n - self.center()) % n)
            .collect();
        self.encode(&coordinates)
    }

    fn cell_bounds(&self, cell: usize) -> (Vec<f64>, Vec<f64>) {
        let coordinates = self.decode(cell);
        let lower = coordinates.iter().enumerate().map(|(d, &c)| c as f64 * self.width(d)).collect();
        let upper = coordinates
            .iter()
            .enumerate()
            .map(|(d, &c)| (c + 1) as f64 * self.width(d))
            .collect();
        (lower, upper)
    }

    fn neighbor_cell(&self, cell: usize, direction: usize, positive: bool) -> usize {
        let mut coordinates = self.decode(cell);
        let n = self.per_side;
        coordinates[direction] = if positive {
            (coordinates[direction] + 1) % n
        } else {
            (coordinates[direction] + n - 1) % n
        };
        self.encode(&coordinates)
    }
}

/// Coulomb-like pair potential `q1 q2 / |r|`, derivative taken with respect to the active unit.
#[derive(Debug, Clone, Copy)]
pub struct InverseDistance;

impl Potential for InverseDistance {
    fn number_charge_arguments(&self) -> usize {
        2
    }

    fn derivative(&self, direction: usize, separation: &[f64], charges: &[f64]) -> f64 {
        let r2: f64 = separation.iter().map(|x| x * x).sum();
        charges[0] * charges[1] * separation[direction] / (r2 * r2.sqrt())
    }
}

/// Bounds `|derivative| <= 1 / d_min^2` over a separation box not containing the origin, for
/// charges of magnitude at most one.
#[derive(Debug, Clone, Copy)]
pub struct DistanceEstimator;

impl Estimator for DistanceEstimator {
    fn derivative_bound(&self, lower_corner: &[f64], upper_corner: &[f64], _direction: usize) -> (f64, f64) {
        let d2: f64 = lower_corner
            .iter()
            .zip(upper_corner)
            .map(|(&lo, &hi)| if lo > 0.0 { lo } else if hi < 0.0 { -hi } else { 0.0 })
            .map(|x| x * x)
            .sum();
        let bound = 1.0 / d2;
        (bound, -bound)
    }

    fn charge_correction_factor(&self, charge: f64) -> f64 {
        charge
    }
}

pub fn resting_point(id: usize, position: Vec<f64>) -> Result<Branch> {
    Branch::new(Unit::new(StateId::root_id(id), position)?, 1.0)
}

pub fn charged_point(id: usize, position: Vec<f64>, charge: f64) -> Result<Branch> {
    Branch::new(
        Unit::new(StateId::root_id(id), position)?.with_charge([("charge", charge)]),
        1.0,
    )
}

pub fn moving_point(id: usize, position: Vec<f64>, velocity: Vec<f64>, time: f64) -> Result<Branch> {
    let unit = Unit::new(StateId::root_id(id), position)?.with_motion(velocity, Time::from_float(time))?;
    Branch::new(unit, 1.0)
}

/// Two-leaf molecule with both leaves at `position`, weights one half.
pub fn molecule(id: usize, position: Vec<f64>, charges: [f64; 2]) -> Result<Branch> {
    let mut branch = Branch::new(Unit::new(StateId::root_id(id), position.clone())?, 1.0)?;
    for (k, q) in charges.into_iter().enumerate() {
        let leaf = Unit::new(StateId::new(vec![id, k]), position.clone())?.with_charge([("charge", q)]);
        branch.add_child(ROOT, leaf, 0.5)?;
    }
    Ok(branch)
}

/// Molecule of `charges.len()` leaves, each at `position` shifted by its offset along the first
/// axis, with equal weights.
pub fn spread_molecule(id: usize, position: Vec<f64>, offsets: &[f64], charges: &[f64]) -> Result<Branch> {
    let mut branch = Branch::new(Unit::new(StateId::root_id(id), position.clone())?, 1.0)?;
    let weight = 1.0 / charges.len() as f64;
    for (k, (&offset, &q)) in offsets.iter().zip(charges).enumerate() {
        let mut leaf_position = position.clone();
        leaf_position[0] += offset;
        let leaf = Unit::new(StateId::new(vec![id, k]), leaf_position)?.with_charge([("charge", q)]);
        branch.add_child(ROOT, leaf, weight)?;
    }
    Ok(branch)
}

/// `count` resting point masses at uniformly random positions.
pub fn random_points(setting: &Setting, count: usize, seed: u64) -> Result<Vec<Branch>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|id| {
            let position = setting
                .system_lengths()
                .iter()
                .map(|&l| rng.random::<f64>() * l)
                .collect();
            resting_point(id, position)
        })
        .collect()
}
