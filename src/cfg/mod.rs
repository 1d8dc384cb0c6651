//! Control flow graph model and builder

mod builder;
mod node;

pub use builder::build_cfg;
pub use node::{CfgEdge, CfgNode, ControlFlowGraph, NodeKind};
