//! 网结构分析：子网分解、形式化表示与矩阵。
pub mod decompose;
pub mod graph;
pub mod notation;

pub use decompose::{Subnet, decompose};
pub use graph::NetGraph;
pub use notation::{Matrix, effect_matrix, formal_notation, input_matrix, output_matrix};
