//! 形式化表示 `PN = {P, T, I, O, M₀}` 与库所 × 迁移矩阵。
//!
//! S-model 下所有正权重归一化为 1。`M₀` 读取库所当前的 token 数。
use std::fmt::{self, Write as FmtWrite};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use crate::analysis::decompose::Subnet;
use crate::net::core::Net;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::Incidence;
use crate::net::structure::Weight;

fn place_name(net: &Net, id: PlaceId) -> String {
    net.place(id)
        .map_or_else(|| id.to_string(), |place| place.name().to_string())
}

fn transition_name(net: &Net, id: TransitionId) -> String {
    net.transition(id)
        .map_or_else(|| id.to_string(), |t| t.name().to_string())
}

pub fn formal_notation(net: &Net, subnet: &Subnet) -> String {
    let mode = net.mode();
    let mut out = String::new();
    let _ = writeln!(out, "PN = {{P, T, I, O, M₀}}");
    let _ = writeln!(
        out,
        "P = {{{}}}",
        subnet.places.iter().map(|id| place_name(net, *id)).join(", ")
    );
    let _ = writeln!(
        out,
        "T = {{{}}}",
        subnet
            .transitions
            .iter()
            .map(|id| transition_name(net, *id))
            .join(", ")
    );
    for (function, table) in [("I", &subnet.input), ("O", &subnet.output)] {
        for ((place, transition), weight) in table {
            let _ = writeln!(
                out,
                "{function}({}, {}) = {}",
                place_name(net, *place),
                transition_name(net, *transition),
                mode.normalize(*weight)
            );
        }
    }
    let _ = write!(
        out,
        "M₀ = ({})",
        subnet
            .places
            .iter()
            .map(|id| net.place(*id).map_or(0, |place| place.tokens()))
            .join(", ")
    );
    out
}

/// Place × transition grid; the label marks the middle row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matrix<T> {
    pub label: String,
    pub places: Vec<String>,
    pub transitions: Vec<String>,
    pub cells: Incidence<T>,
}

impl<T: Clone> Matrix<T> {
    fn with_cells(net: &Net, subnet: &Subnet, label: &str, cells: Incidence<T>) -> Self {
        Self {
            label: label.to_string(),
            places: subnet.places.iter().map(|id| place_name(net, *id)).collect(),
            transitions: subnet
                .transitions
                .iter()
                .map(|id| transition_name(net, *id))
                .collect(),
            cells,
        }
    }
}

fn grid(net: &Net, subnet: &Subnet, table: &IndexMap<(PlaceId, TransitionId), Weight>) -> Incidence<Weight> {
    let mode = net.mode();
    let mut cells = Incidence::new(subnet.places.len(), subnet.transitions.len(), 0);
    for (row, place) in subnet.places.iter().enumerate() {
        for (col, transition) in subnet.transitions.iter().enumerate() {
            if let Some(weight) = table.get(&(*place, *transition)) {
                cells.set(row, col, mode.normalize(*weight));
            }
        }
    }
    cells
}

pub fn input_matrix(net: &Net, subnet: &Subnet) -> Matrix<Weight> {
    Matrix::with_cells(net, subnet, "I", grid(net, subnet, &subnet.input))
}

pub fn output_matrix(net: &Net, subnet: &Subnet) -> Matrix<Weight> {
    Matrix::with_cells(net, subnet, "O", grid(net, subnet, &subnet.output))
}

/// `C = O − I`
pub fn effect_matrix(input: &Matrix<Weight>, output: &Matrix<Weight>) -> Matrix<i64> {
    Matrix {
        label: "C".to_string(),
        places: input.places.clone(),
        transitions: input.transitions.clone(),
        cells: output.cells.difference(&input.cells),
    }
}

impl<T: fmt::Display> fmt::Display for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .cells
            .rows()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();
        let width = self
            .transitions
            .iter()
            .map(|name| name.chars().count())
            .chain(cells.iter().flatten().map(String::len))
            .max()
            .unwrap_or(1);
        let name_width = self
            .places
            .iter()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0);
        let label_width = self.label.chars().count();

        let header_label = if self.places.is_empty() { self.label.as_str() } else { "" };
        write!(f, "{header_label:label_width$} {:name_width$}", "")?;
        for transition in &self.transitions {
            write!(f, " {transition:>width$}")?;
        }
        writeln!(f)?;

        let middle = self.places.len() / 2;
        for (index, (place, row)) in self.places.iter().zip(&cells).enumerate() {
            let label = if index == middle { self.label.as_str() } else { "" };
            write!(f, "{label:label_width$} {place:name_width$}")?;
            for cell in row {
                write!(f, " {cell:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
