//! Capability interfaces of interaction potentials and their bound estimators.

/// Pair potential between two leaf units.
pub trait Potential {
    /// Number of charges `derivative` expects.
    fn number_charge_arguments(&self) -> usize;

    /// Derivative of the potential with respect to the active unit's position along `direction`,
    /// evaluated at `separation` (pointing from the active unit to its partner).
    fn derivative(&self, direction: usize, separation: &[f64], charges: &[f64]) -> f64;
}

/// Bounds on a potential derivative over regions of separation space.
pub trait Estimator {
    /// Upper and lower bound `(upper, lower)` of the derivative along `direction` for all separations
    /// inside the box spanned by `lower_corner` and `upper_corner`.
    fn derivative_bound(&self, lower_corner: &[f64], upper_corner: &[f64], direction: usize) -> (f64, f64);

    /// Factor by which the bounds scale for an active unit carrying `charge`.
    ///
    /// A negative factor means the roles of the upper and lower bounds swap.
    fn charge_correction_factor(&self, charge: f64) -> f64;
}
