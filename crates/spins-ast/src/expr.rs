//! Promela expressions.

use crate::span::Span;
use crate::types::{ProcId, StateId, VarId};
use serde::{Deserialize, Serialize};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

/// Arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    /// Apply the operator; `None` on division by zero.
    pub fn apply(self, a: i32, b: i32) -> Option<i32> {
        Some(match self {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            BinOp::Mod => {
                if b == 0 {
                    return None;
                }
                a.rem_euclid(b)
            }
            BinOp::BitAnd => a & b,
            BinOp::BitOr => a | b,
            BinOp::BitXor => a ^ b,
            BinOp::Shl => a.wrapping_shl(b as u32),
            BinOp::Shr => a.wrapping_shr(b as u32),
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn apply(self, a: i32, b: i32) -> bool {
        match self {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }

    /// The operator of the logical negation: `!(a < b)` is `a >= b`.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    /// The operator with swapped operands: `a < b` is `b > a`.
    pub fn mirror(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Short-circuit boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

/// Channel status predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChanOp {
    Empty,
    NotEmpty,
    Full,
    NotFull,
}

impl ChanOp {
    pub fn name(self) -> &'static str {
        match self {
            ChanOp::Empty => "empty",
            ChanOp::NotEmpty => "nempty",
            ChanOp::Full => "full",
            ChanOp::NotFull => "nfull",
        }
    }
}

/// A reference to (part of) a variable: `v`, `v[i]`, `v[i].f`, or one of
/// the channel components the model builder addresses directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub var: VarId,
    #[serde(default)]
    pub index: Option<Box<Expr>>,
    #[serde(default)]
    pub member: Option<Box<Member>>,
}

/// Selection below a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Member {
    /// A `typedef` field, possibly indexed, possibly with further selection.
    Field {
        name: String,
        #[serde(default)]
        index: Option<Box<Expr>>,
        #[serde(default)]
        member: Option<Box<Member>>,
    },
    /// The fill count of a buffered channel.
    Fill,
    /// Message field `field` of buffer row `row` of a buffered channel.
    Buffer { row: Box<Expr>, field: usize },
}

impl Identifier {
    pub fn new(var: VarId) -> Self {
        Self {
            var,
            index: None,
            member: None,
        }
    }

    pub fn indexed(var: VarId, index: Expr) -> Self {
        Self {
            var,
            index: Some(Box::new(index)),
            member: None,
        }
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.member = Some(Box::new(member));
        self
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        self.with_member(Member::Field {
            name: name.into(),
            index: None,
            member: None,
        })
    }

    /// The fill count of this channel.
    pub fn fill(&self) -> Self {
        self.clone().with_member(Member::Fill)
    }

    /// Message field `field` at buffer row `row` of this channel.
    pub fn buffer(&self, row: Expr, field: usize) -> Self {
        self.clone().with_member(Member::Buffer {
            row: Box::new(row),
            field,
        })
    }

    /// True when every index along the path folds to a constant.
    pub fn is_constant_path(&self) -> bool {
        let index_ok = self
            .index
            .as_deref()
            .map_or(true, |e| e.constant_value().is_some());
        index_ok && self.member.as_deref().map_or(true, Member::is_constant_path)
    }

    /// True for a bare variable without index or member selection.
    pub fn is_plain(&self) -> bool {
        self.index.is_none() && self.member.is_none()
    }
}

impl Member {
    fn is_constant_path(&self) -> bool {
        match self {
            Member::Field { index, member, .. } => {
                index.as_deref().map_or(true, |e| e.constant_value().is_some())
                    && member.as_deref().map_or(true, Member::is_constant_path)
            }
            Member::Fill => true,
            Member::Buffer { row, .. } => row.constant_value().is_some(),
        }
    }
}

/// Initial value for a parameter of a statically bound process, assigned
/// when the run expression executes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunInit {
    pub target: Identifier,
    pub value: Expr,
}

/// `run P(args)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunExpr {
    pub proctype: String,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub span: Span,
    /// Instances this run may start. Filled in by run binding.
    #[serde(default)]
    pub targets: Vec<ProcId>,
    /// Parameter assignments performed by the run. Filled in by run binding.
    #[serde(default)]
    pub inits: Vec<RunInit>,
}

/// A Promela expression. Structural equality is used to share guard labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    Const {
        value: i32,
    },
    Ident(Identifier),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `(cond -> then : otherwise)`
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `len(c)`
    ChanLen {
        chan: Identifier,
    },
    /// `c?[args]` / `c??[args]`: side-effect free receive test.
    ChanPoll {
        chan: Identifier,
        args: Vec<Expr>,
        #[serde(default)]
        random: bool,
    },
    ChanOp {
        op: ChanOp,
        chan: Identifier,
    },
    Mtype {
        name: String,
        value: i32,
    },
    /// `P[pid]@label`: process `process` is at `state`.
    RemoteRef {
        process: ProcId,
        state: StateId,
        label: String,
    },
    Eval {
        expr: Box<Expr>,
    },
    Timeout,
    Run(RunExpr),
}

impl Expr {
    pub fn constant(value: i32) -> Self {
        Expr::Const { value }
    }

    pub fn bool(value: bool) -> Self {
        Expr::Const {
            value: value as i32,
        }
    }

    pub fn var(var: VarId) -> Self {
        Expr::Ident(Identifier::new(var))
    }

    pub fn ident(id: Identifier) -> Self {
        Expr::Ident(id)
    }

    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CmpOp::Eq, left, right)
    }

    pub fn ne(left: Expr, right: Expr) -> Self {
        Self::compare(CmpOp::Ne, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::compare(CmpOp::Lt, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::compare(CmpOp::Gt, left, right)
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::Logic {
            op: LogicOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Logic {
            op: LogicOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    /// Logical negation, pushing into comparisons and double negations.
    pub fn negate(self) -> Self {
        match self {
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => *expr,
            Expr::Compare { op, left, right } => Expr::Compare {
                op: op.negate(),
                left,
                right,
            },
            Expr::Const { value } => Expr::bool(value == 0),
            other => Expr::not(other),
        }
    }

    /// Fold left-to-right with `&&`; `true` for an empty iterator.
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(Expr::and)
            .unwrap_or(Expr::bool(true))
    }

    /// Fold left-to-right with `||`; `false` for an empty iterator.
    pub fn disjunction(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or(Expr::bool(false))
    }

    /// Evaluate the expression when it does not depend on the state.
    pub fn constant_value(&self) -> Option<i32> {
        match self {
            Expr::Const { value } | Expr::Mtype { value, .. } => Some(*value),
            Expr::Unary { op, expr } => {
                let v = expr.constant_value()?;
                Some(match op {
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Not => (v == 0) as i32,
                    UnaryOp::BitNot => !v,
                })
            }
            Expr::Binary { op, left, right } => {
                op.apply(left.constant_value()?, right.constant_value()?)
            }
            Expr::Compare { op, left, right } => {
                Some(op.apply(left.constant_value()?, right.constant_value()?) as i32)
            }
            Expr::Logic { op, left, right } => {
                let l = left.constant_value();
                let r = right.constant_value();
                match (op, l, r) {
                    (LogicOp::And, Some(0), _) | (LogicOp::And, _, Some(0)) => Some(0),
                    (LogicOp::Or, Some(a), _) if a != 0 => Some(1),
                    (LogicOp::Or, _, Some(b)) if b != 0 => Some(1),
                    (_, Some(a), Some(b)) => Some(match op {
                        LogicOp::And => (a != 0 && b != 0) as i32,
                        LogicOp::Or => (a != 0 || b != 0) as i32,
                    }),
                    _ => None,
                }
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                if cond.constant_value()? != 0 {
                    then.constant_value()
                } else {
                    otherwise.constant_value()
                }
            }
            Expr::Eval { expr } => expr.constant_value(),
            Expr::Ident(_)
            | Expr::ChanLen { .. }
            | Expr::ChanPoll { .. }
            | Expr::ChanOp { .. }
            | Expr::RemoteRef { .. }
            | Expr::Timeout
            | Expr::Run(_) => None,
        }
    }

    /// True if the expression is `timeout` or contains it.
    pub fn contains_timeout(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Timeout));
        found
    }

    /// True if the expression contains a `run`.
    pub fn contains_run(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Run(_)));
        found
    }

    /// Pre-order visit of this expression and all sub-expressions,
    /// including index expressions inside identifiers.
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Const { .. }
            | Expr::Mtype { .. }
            | Expr::RemoteRef { .. }
            | Expr::Timeout => {}
            Expr::Ident(id) => id.visit_exprs(f),
            Expr::Unary { expr, .. } | Expr::Eval { expr } => expr.visit(f),
            Expr::Binary { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::Logic { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                cond.visit(f);
                then.visit(f);
                otherwise.visit(f);
            }
            Expr::ChanLen { chan } | Expr::ChanOp { chan, .. } => chan.visit_exprs(f),
            Expr::ChanPoll { chan, args, .. } => {
                chan.visit_exprs(f);
                for a in args {
                    a.visit(f);
                }
            }
            Expr::Run(run) => {
                for a in &run.args {
                    a.visit(f);
                }
            }
        }
    }

    /// Rewrite every identifier bottom-up with `f`.
    pub fn map_identifiers(&mut self, f: &mut dyn FnMut(&mut Identifier)) {
        match self {
            Expr::Const { .. }
            | Expr::Mtype { .. }
            | Expr::RemoteRef { .. }
            | Expr::Timeout => {}
            Expr::Ident(id) => id.map_identifiers(f),
            Expr::Unary { expr, .. } | Expr::Eval { expr } => expr.map_identifiers(f),
            Expr::Binary { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::Logic { left, right, .. } => {
                left.map_identifiers(f);
                right.map_identifiers(f);
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                cond.map_identifiers(f);
                then.map_identifiers(f);
                otherwise.map_identifiers(f);
            }
            Expr::ChanLen { chan } | Expr::ChanOp { chan, .. } => chan.map_identifiers(f),
            Expr::ChanPoll { chan, args, .. } => {
                chan.map_identifiers(f);
                for a in args {
                    a.map_identifiers(f);
                }
            }
            Expr::Run(run) => {
                for a in &mut run.args {
                    a.map_identifiers(f);
                }
                for init in &mut run.inits {
                    init.target.map_identifiers(f);
                    init.value.map_identifiers(f);
                }
            }
        }
    }

    /// Apply `f` to every `run` expression, outermost first.
    pub fn for_each_run_mut(&mut self, f: &mut dyn FnMut(&mut RunExpr)) {
        match self {
            Expr::Run(run) => {
                f(run);
                for a in &mut run.args {
                    a.for_each_run_mut(f);
                }
            }
            Expr::Unary { expr, .. } | Expr::Eval { expr } => expr.for_each_run_mut(f),
            Expr::Binary { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::Logic { left, right, .. } => {
                left.for_each_run_mut(f);
                right.for_each_run_mut(f);
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                cond.for_each_run_mut(f);
                then.for_each_run_mut(f);
                otherwise.for_each_run_mut(f);
            }
            _ => {}
        }
    }
}

impl Identifier {
    fn visit_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        if let Some(index) = &self.index {
            index.visit(f);
        }
        let mut member = self.member.as_deref();
        while let Some(m) = member {
            member = match m {
                Member::Field { index, member, .. } => {
                    if let Some(index) = index {
                        index.visit(f);
                    }
                    member.as_deref()
                }
                Member::Fill => None,
                Member::Buffer { row, .. } => {
                    row.visit(f);
                    None
                }
            };
        }
    }

    /// Rewrite nested identifiers (inside index expressions) first, then
    /// this one.
    pub fn map_identifiers(&mut self, f: &mut dyn FnMut(&mut Identifier)) {
        if let Some(index) = &mut self.index {
            index.map_identifiers(f);
        }
        let mut member = self.member.as_deref_mut();
        while let Some(m) = member {
            member = match m {
                Member::Field { index, member, .. } => {
                    if let Some(index) = index {
                        index.map_identifiers(f);
                    }
                    member.as_deref_mut()
                }
                Member::Fill => None,
                Member::Buffer { row, .. } => {
                    row.map_identifiers(f);
                    None
                }
            };
        }
        f(self);
    }
}

impl From<Identifier> for Expr {
    fn from(id: Identifier) -> Self {
        Expr::Ident(id)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Const { value }
    }
}
