//! Walker alias table for O(1) sampling of items with fixed rates.

use crate::error::{Error, Result};
use rand::Rng;

#[derive(Debug, Clone)]
struct Column<T> {
    primary: T,
    primary_rate: f64,
    alias: Option<T>,
}

/// Alias table over items `T` with nonnegative rates.
///
/// Every column has the mean rate as its total: the primary item owns `primary_rate` of it and the
/// alias owns the rest.
#[derive(Debug, Clone)]
pub struct WalkerTable<T: Clone> {
    columns: Vec<Column<T>>,
    mean_rate: f64,
    total_rate: f64,
}

impl<T: Clone> WalkerTable<T> {
    /// Build the table.
    ///
    /// Errors: `Error::Configuration` for no items or a negative or non-finite rate.
    pub fn new(items: Vec<(T, f64)>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::Configuration("walker table needs at least one item".into()));
        }
        if items.iter().any(|(_, rate)| !rate.is_finite() || *rate < 0.0) {
            return Err(Error::Configuration(
                "walker table rates must be finite and >= 0".into(),
            ));
        }
        let total_rate: f64 = items.iter().map(|(_, rate)| rate).sum();
        let mean_rate = total_rate / items.len() as f64;

        let (mut large, mut small): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|(_, rate)| *rate > mean_rate);
        let mut columns = Vec::with_capacity(small.len() + large.len());
        while !small.is_empty() && !large.is_empty() {
            let (Some((item, rate)), Some((big, big_rate))) = (small.pop(), large.pop()) else {
                break;
            };
            let remaining = big_rate - (mean_rate - rate);
            columns.push(Column {
                primary: item,
                primary_rate: rate,
                alias: Some(big.clone()),
            });
            if remaining < mean_rate {
                small.push((big, remaining));
            } else {
                large.push((big, remaining));
            }
        }
        // Leftovers hold the mean up to rounding.
        columns.extend(small.into_iter().chain(large).map(|(item, _)| Column {
            primary: item,
            primary_rate: mean_rate,
            alias: None,
        }));

        Ok(Self {
            columns,
            mean_rate,
            total_rate,
        })
    }

    #[inline]
    pub fn total_rate(&self) -> f64 {
        self.total_rate
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Draw an item with probability proportional to its rate; `None` if all rates vanish.
    pub fn sample(&self, rng: &mut impl Rng) -> Option<&T> {
        if self.total_rate <= 0.0 {
            return None;
        }
        let column = &self.columns[rng.random_range(0..self.columns.len())];
        let draw = rng.random::<f64>() * self.mean_rate;
        match &column.alias {
            Some(alias) if draw >= column.primary_rate => Some(alias),
            _ => Some(&column.primary),
        }
    }
}
