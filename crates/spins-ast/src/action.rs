//! Promela statements as they appear on automaton edges.

use crate::expr::{Expr, Identifier};
use crate::span::Span;
use serde::{Deserialize, Serialize};

/// The three assignment forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    /// `x = e`
    Set,
    /// `x++`
    Incr,
    /// `x--`
    Decr,
}

/// A statement on an automaton edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Action {
    Assign {
        target: Identifier,
        op: AssignOp,
        /// The right-hand side for `Set`; ignored for `Incr` and `Decr`.
        #[serde(default = "default_value")]
        value: Expr,
        #[serde(default)]
        span: Span,
    },
    Assert {
        expr: Expr,
        #[serde(default)]
        span: Span,
    },
    Print {
        format: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
    /// An expression statement: blocks until the expression holds.
    Expr {
        expr: Expr,
        #[serde(default)]
        span: Span,
    },
    /// `c!args` (or `c!!args` when `sorted`).
    Send {
        chan: Identifier,
        args: Vec<Expr>,
        #[serde(default)]
        sorted: bool,
        #[serde(default)]
        span: Span,
    },
    /// `c?args`. Identifier arguments receive a field, other arguments
    /// must match it. `poll` leaves the message in the channel, `random`
    /// matches any buffered message instead of only the head.
    Receive {
        chan: Identifier,
        args: Vec<Expr>,
        #[serde(default)]
        poll: bool,
        #[serde(default)]
        random: bool,
        #[serde(default)]
        span: Span,
    },
    /// `if`/`do`/`d_step` blocks compiled into a single transition.
    Options {
        options: Vec<Vec<Action>>,
        #[serde(default)]
        looping: bool,
        #[serde(default)]
        span: Span,
    },
    Break {
        #[serde(default)]
        span: Span,
    },
    Else {
        #[serde(default)]
        span: Span,
    },
    Goto {
        label: String,
        #[serde(default)]
        span: Span,
    },
    Label {
        name: String,
        #[serde(default)]
        span: Span,
    },
}

fn default_value() -> Expr {
    Expr::constant(0)
}

impl Action {
    pub fn span(&self) -> Span {
        match self {
            Action::Assign { span, .. }
            | Action::Assert { span, .. }
            | Action::Print { span, .. }
            | Action::Expr { span, .. }
            | Action::Send { span, .. }
            | Action::Receive { span, .. }
            | Action::Options { span, .. }
            | Action::Break { span }
            | Action::Else { span }
            | Action::Goto { span, .. }
            | Action::Label { span, .. } => *span,
        }
    }

    pub fn assign(target: Identifier, value: Expr) -> Self {
        Action::Assign {
            target,
            op: AssignOp::Set,
            value,
            span: Span::dummy(),
        }
    }

    pub fn incr(target: Identifier) -> Self {
        Action::Assign {
            target,
            op: AssignOp::Incr,
            value: default_value(),
            span: Span::dummy(),
        }
    }

    pub fn decr(target: Identifier) -> Self {
        Action::Assign {
            target,
            op: AssignOp::Decr,
            value: default_value(),
            span: Span::dummy(),
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Action::Expr {
            expr,
            span: Span::dummy(),
        }
    }

    /// `skip`, which Promela defines as the expression `1`.
    pub fn skip() -> Self {
        Self::expr(Expr::bool(true))
    }

    pub fn send(chan: Identifier, args: Vec<Expr>) -> Self {
        Action::Send {
            chan,
            args,
            sorted: false,
            span: Span::dummy(),
        }
    }

    pub fn receive(chan: Identifier, args: Vec<Expr>) -> Self {
        Action::Receive {
            chan,
            args,
            poll: false,
            random: false,
            span: Span::dummy(),
        }
    }

    pub fn assert(expr: Expr) -> Self {
        Action::Assert {
            expr,
            span: Span::dummy(),
        }
    }

    pub fn print(format: impl Into<String>, args: Vec<Expr>) -> Self {
        Action::Print {
            format: format.into(),
            args,
            span: Span::dummy(),
        }
    }

    pub fn options(options: Vec<Vec<Action>>) -> Self {
        Action::Options {
            options,
            looping: false,
            span: Span::dummy(),
        }
    }

    /// Attach a source position.
    pub fn at(mut self, at: Span) -> Self {
        match &mut self {
            Action::Assign { span, .. }
            | Action::Assert { span, .. }
            | Action::Print { span, .. }
            | Action::Expr { span, .. }
            | Action::Send { span, .. }
            | Action::Receive { span, .. }
            | Action::Options { span, .. }
            | Action::Break { span }
            | Action::Else { span }
            | Action::Goto { span, .. }
            | Action::Label { span, .. } => *span = at,
        }
        self
    }

    /// The channel of a send or receive.
    pub fn channel(&self) -> Option<&Identifier> {
        match self {
            Action::Send { chan, .. } | Action::Receive { chan, .. } => Some(chan),
            _ => None,
        }
    }

    /// Rewrite every identifier (including those nested in sub-actions).
    pub fn map_identifiers(&mut self, f: &mut dyn FnMut(&mut Identifier)) {
        match self {
            Action::Assign { target, value, .. } => {
                target.map_identifiers(f);
                value.map_identifiers(f);
            }
            Action::Assert { expr, .. } | Action::Expr { expr, .. } => expr.map_identifiers(f),
            Action::Print { args, .. } => {
                for a in args {
                    a.map_identifiers(f);
                }
            }
            Action::Send { chan, args, .. } | Action::Receive { chan, args, .. } => {
                chan.map_identifiers(f);
                for a in args {
                    a.map_identifiers(f);
                }
            }
            Action::Options { options, .. } => {
                for seq in options {
                    for a in seq {
                        a.map_identifiers(f);
                    }
                }
            }
            Action::Break { .. }
            | Action::Else { .. }
            | Action::Goto { .. }
            | Action::Label { .. } => {}
        }
    }

    /// Visit every expression this action evaluates, in order.
    pub fn visit_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Action::Assign { target, value, op, .. } => {
                Expr::Ident(target.clone()).visit(f);
                if *op == AssignOp::Set {
                    value.visit(f);
                }
            }
            Action::Assert { expr, .. } | Action::Expr { expr, .. } => expr.visit(f),
            Action::Print { args, .. } => args.iter().for_each(|a| a.visit(f)),
            Action::Send { chan, args, .. } | Action::Receive { chan, args, .. } => {
                Expr::Ident(chan.clone()).visit(f);
                args.iter().for_each(|a| a.visit(f));
            }
            Action::Options { options, .. } => {
                for seq in options {
                    for a in seq {
                        a.visit_exprs(f);
                    }
                }
            }
            Action::Break { .. }
            | Action::Else { .. }
            | Action::Goto { .. }
            | Action::Label { .. } => {}
        }
    }

    /// Apply `f` to every `run` expression in this action.
    pub fn for_each_run_mut(&mut self, f: &mut dyn FnMut(&mut crate::expr::RunExpr)) {
        match self {
            Action::Assign { value, .. } => value.for_each_run_mut(f),
            Action::Expr { expr, .. } => expr.for_each_run_mut(f),
            Action::Options { options, .. } => {
                for seq in options {
                    for a in seq {
                        a.for_each_run_mut(f);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VarId;

    #[test]
    fn test_at_sets_span() {
        let a = Action::skip().at(Span::new(4, 2));
        assert_eq!(a.span(), Span::new(4, 2));
    }

    #[test]
    fn test_map_identifiers_in_options() {
        let mut a = Action::options(vec![
            vec![Action::assign(Identifier::new(VarId(0)), Expr::constant(1))],
            vec![Action::incr(Identifier::new(VarId(0)))],
        ]);
        a.map_identifiers(&mut |id| id.var = VarId(7));
        let mut vars = Vec::new();
        a.visit_exprs(&mut |e| {
            if let Expr::Ident(id) = e {
                vars.push(id.var);
            }
        });
        assert_eq!(vars, vec![VarId(7), VarId(7)]);
    }
}
