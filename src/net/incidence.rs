//! 库所 × 迁移稠密矩阵，行为库所、列为迁移，缺省弧以零填充。
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::structure::Weight;

type SmallRow<T> = SmallVec<[T; 4]>;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Incidence<T> {
    rows: Vec<SmallRow<T>>,
    cols: usize,
}

impl<T> Incidence<T>
where
    T: Clone,
{
    pub fn new(places: usize, transitions: usize, default: T) -> Self {
        let rows = (0..places)
            .map(|_| SmallRow::from_elem(default.clone(), transitions))
            .collect();
        Self {
            rows,
            cols: transitions,
        }
    }
}

impl<T> Incidence<T> {
    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.cols
    }

    pub fn set(&mut self, place: usize, transition: usize, value: T) {
        self.rows[place][transition] = value;
    }

    pub fn get(&self, place: usize, transition: usize) -> &T {
        &self.rows[place][transition]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.rows.iter().map(|row| row.as_slice())
    }
}

impl<T> fmt::Debug for Incidence<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incidence")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl Incidence<Weight> {
    /// `self - other` cell by cell, e.g. `C = O - I`.
    pub fn difference(&self, other: &Self) -> Incidence<i64> {
        assert_eq!(self.places(), other.places());
        assert_eq!(self.transitions(), other.transitions());
        let rows = self
            .rows
            .iter()
            .zip(other.rows.iter())
            .map(|(left, right)| {
                left.iter()
                    .zip(right.iter())
                    .map(|(l, r)| *l as i64 - *r as i64)
                    .collect::<SmallRow<_>>()
            })
            .collect();
        Incidence {
            rows,
            cols: self.cols,
        }
    }
}
