//! Input model for the Promela model builder.
//!
//! A [`Specification`] is what a Promela frontend produces: a variable
//! table, process instances with their control-flow automata, and an
//! optional never claim. All types are plain data and (de)serialize with
//! serde, so frontends in other languages can hand a model over as JSON.

mod action;
mod build;
mod expr;
mod pretty;
mod span;
mod spec;
mod types;

pub use action::{Action, AssignOp};
pub use build::{ProcessBuilder, SpecBuilder};
pub use expr::{
    BinOp, ChanOp, CmpOp, Expr, Identifier, LogicOp, Member, RunExpr, RunInit, UnaryOp,
};
pub use pretty::{pretty_print_action, pretty_print_expr, pretty_print_identifier};
pub use span::Span;
pub use spec::{Automaton, Export, Process, Specification, State, Transition};
pub use types::{
    ChannelType, Field, ProcId, ScalarType, StateId, StructType, VarId, VarType, Variable,
};
