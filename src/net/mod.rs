//! # 网模型（Place/Transition Net 及其 Smart 扩展）
//!
//! 设库所集合 `P`、迁移集合 `T`，输入/输出函数 `I, O : P × T → ℕ`。
//!
//! * T-model：迁移 `t` **可激发** 当且仅当 `∀p: M[p] ≥ I(p, t)`，且 `t` 至少有一条输入弧；
//! * S-model：弧权重退化为存在性，`t` 可激发当且仅当其所有输入库所 `M[p] > 0`，
//!   token 携带标量值，迁移按其任务（`+ - * / == != cp p`）计算输出。
//!
//! 节点以稳定 id 标识（[`PlaceId`]、[`TransitionId`]、[`InitializerId`]），
//! 显示名称可以修改而不影响引用。
//!
//! ## 示例
//!
//! ```rust
//! use smart_petri::net::*;
//!
//! let mut net = Net::empty();
//! let p0 = net.add_place(Place::with_tokens("p0", 1)).unwrap();
//! let p1 = net.add_place(Place::new("p1")).unwrap();
//! let t0 = net.add_transition(Transition::new("t0")).unwrap();
//!
//! net.add_arc(p0, t0, 1).unwrap();
//! net.add_arc(t0, p1, 1).unwrap();
//!
//! assert_eq!(net.enabled_transitions(), vec![t0]);
//! assert_eq!(net.marking().tokens(p0), 1);
//! ```

pub mod core;
pub mod ids;
pub mod incidence;
pub mod io;
pub mod snapshot;
pub mod structure;
pub mod task;

pub use self::core::{DiagnosticReport, Net, NetError};
pub use ids::{ArcId, InitializerId, NodeKind, NodeRef, PlaceId, TransitionId};
pub use incidence::Incidence;
pub use snapshot::{NetSnapshot, SnapshotError};
pub use structure::{
    Arc, ArcKind, Initializer, Marking, NetMode, NetNode, PendingToken, Place, Position, Routing,
    SmartToken, TokenOrder, Transition, Value, Weight,
};
pub use task::{Task, TaskParseError};
