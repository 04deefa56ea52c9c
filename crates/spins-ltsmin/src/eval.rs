//! Evaluation of expressions and guards over a concrete state vector.

use crate::error::BuildError;
use crate::model::guard::Guard;
use crate::model::Model;
use spins_ast::{ChanOp, Expr, Identifier, LogicOp, Member, UnaryOp};
use thiserror::Error;

/// Live processes beyond which `run` blocks.
pub const MAX_PROCESSES: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {index} out of bounds for {variable}")]
    IndexOutOfBounds { variable: String, index: i32 },
    #[error("{0} does not denote a single slot")]
    NotScalar(String),
    #[error("state has {found} slots, the model has {expected}")]
    StateSize { expected: usize, found: usize },
}

/// Evaluate `e` in `state`. Booleans are 0 or 1.
pub fn eval_expr(model: &Model, state: &[i32], e: &Expr) -> Result<i32, EvalError> {
    Evaluator::new(model, state)?.expr(e)
}

pub fn eval_guard(model: &Model, state: &[i32], g: &Guard) -> Result<bool, EvalError> {
    Evaluator::new(model, state)?.guard(g)
}

struct Evaluator<'a> {
    model: &'a Model,
    state: &'a [i32],
}

impl<'a> Evaluator<'a> {
    fn new(model: &'a Model, state: &'a [i32]) -> Result<Self, EvalError> {
        let expected = model.state_vector().len();
        if state.len() != expected {
            return Err(EvalError::StateSize {
                expected,
                found: state.len(),
            });
        }
        Ok(Self { model, state })
    }

    fn guard(&self, g: &Guard) -> Result<bool, EvalError> {
        match g {
            Guard::Expr(e) => Ok(self.expr(e)? != 0),
            Guard::And(gs) => {
                for g in gs {
                    if !self.guard(g)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Guard::Or(gs) => {
                for g in gs {
                    if self.guard(g)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Guard::Nand(gs) => {
                for g in gs {
                    if !self.guard(g)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn expr(&self, e: &Expr) -> Result<i32, EvalError> {
        Ok(match e {
            Expr::Const { value } | Expr::Mtype { value, .. } => *value,
            Expr::Ident(id) => self.load(id)?,
            Expr::Unary { op, expr } => {
                let v = self.expr(expr)?;
                match op {
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Not => i32::from(v == 0),
                    UnaryOp::BitNot => !v,
                }
            }
            Expr::Binary { op, left, right } => op
                .apply(self.expr(left)?, self.expr(right)?)
                .ok_or(EvalError::DivisionByZero)?,
            Expr::Compare { op, left, right } => i32::from(op.apply(self.expr(left)?, self.expr(right)?)),
            Expr::Logic { op, left, right } => {
                let l = self.expr(left)? != 0;
                let v = match op {
                    LogicOp::And => l && self.expr(right)? != 0,
                    LogicOp::Or => l || self.expr(right)? != 0,
                };
                i32::from(v)
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                if self.expr(cond)? != 0 {
                    self.expr(then)?
                } else {
                    self.expr(otherwise)?
                }
            }
            Expr::Eval { expr } => self.expr(expr)?,
            Expr::ChanLen { chan } => self.fill(chan)?,
            Expr::ChanOp { op, chan } => {
                let (fill, capacity) = (self.fill(chan)?, self.capacity(chan)?);
                i32::from(match op {
                    ChanOp::Empty => fill == 0,
                    ChanOp::NotEmpty => fill != 0,
                    ChanOp::Full => fill >= capacity,
                    ChanOp::NotFull => fill < capacity,
                })
            }
            Expr::ChanPoll { chan, args, random } => i32::from(self.poll(chan, args, *random)?),
            Expr::RemoteRef { process, state, .. } => {
                let pc = self.load(&Identifier::new(self.model.state_vector().pc(*process)))?;
                i32::from(pc == state.0 as i32)
            }
            Expr::Timeout => i32::from(self.guard(self.model.deadlock())?),
            Expr::Run(run) => {
                let sv = self.model.state_vector();
                let live = match sv.nr_pr() {
                    Some(nr) => self.load(&Identifier::new(nr))?,
                    None => 0,
                };
                let mut free = false;
                for &p in &run.targets {
                    free |= self.load(&Identifier::new(sv.pc(p)))? == -1;
                }
                i32::from(live < MAX_PROCESSES && free)
            }
        })
    }

    /// Replace every index below `id` by its current value.
    fn concrete(&self, id: &Identifier) -> Result<Identifier, EvalError> {
        let index = match &id.index {
            Some(e) => Some(Box::new(Expr::constant(self.expr(e)?))),
            None => None,
        };
        let member = match &id.member {
            Some(m) => Some(Box::new(self.concrete_member(m)?)),
            None => None,
        };
        Ok(Identifier {
            var: id.var,
            index,
            member,
        })
    }

    fn concrete_member(&self, m: &Member) -> Result<Member, EvalError> {
        Ok(match m {
            Member::Field { name, index, member } => Member::Field {
                name: name.clone(),
                index: match index {
                    Some(e) => Some(Box::new(Expr::constant(self.expr(e)?))),
                    None => None,
                },
                member: match member {
                    Some(m) => Some(Box::new(self.concrete_member(m)?)),
                    None => None,
                },
            },
            Member::Fill => Member::Fill,
            Member::Buffer { row, field } => Member::Buffer {
                row: Box::new(Expr::constant(self.expr(row)?)),
                field: *field,
            },
        })
    }

    fn slot(&self, id: &Identifier) -> Result<usize, EvalError> {
        let sv = self.model.state_vector();
        let name = || sv.name(id.var).to_string();
        let r = sv.resolve(&self.concrete(id)?).map_err(|e| match e {
            BuildError::IndexOutOfBounds { index, .. } => EvalError::IndexOutOfBounds {
                variable: name(),
                index,
            },
            _ => EvalError::NotScalar(name()),
        })?;
        match r.slots.as_slice() {
            [s] if r.exact => Ok(*s),
            _ => Err(EvalError::NotScalar(name())),
        }
    }

    fn load(&self, id: &Identifier) -> Result<i32, EvalError> {
        Ok(self.state[self.slot(id)?])
    }

    /// Fill count; a rendezvous channel never buffers.
    fn fill(&self, chan: &Identifier) -> Result<i32, EvalError> {
        if self.capacity(chan)? == 0 {
            return Ok(0);
        }
        self.load(&chan.fill())
    }

    fn capacity(&self, chan: &Identifier) -> Result<i32, EvalError> {
        let sv = self.model.state_vector();
        let rows = sv
            .resolve(&self.concrete(chan)?.buffer(Expr::var(chan.var), 0))
            .map_err(|_| EvalError::NotScalar(sv.name(chan.var).to_string()))?;
        Ok(rows.slots.len() as i32)
    }

    fn poll(&self, chan: &Identifier, args: &[Expr], random: bool) -> Result<bool, EvalError> {
        let fill = self.fill(chan)?;
        let rows = if random { fill } else { fill.min(1) };
        for row in 0..rows {
            let mut matches = true;
            for (m, arg) in args.iter().enumerate() {
                if matches!(arg, Expr::Ident(_)) {
                    continue;
                }
                let cell = self.load(&chan.buffer(Expr::constant(row), m))?;
                if cell != self.expr(arg)? {
                    matches = false;
                    break;
                }
            }
            if matches {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::build_model;
    use spins_ast::{Action, BinOp, ScalarType, SpecBuilder, VarType, Variable};

    #[test]
    fn test_arithmetic_and_indexing() {
        let mut b = SpecBuilder::new();
        let i = b.global(Variable::new("i", VarType::byte()).with_init(Expr::constant(1)));
        let a = b.global(Variable::new("a", VarType::int()).with_array(2));
        b.process("P", |p| {
            p.sequence(vec![Action::skip()]);
        });
        let m = build_model(&b.build(), &Options::default()).unwrap();
        let mut state = m.initial_state();
        let a1 = m.state_vector().element_slot(a, 1).unwrap();
        state[a1] = 7;
        let e = Expr::binary(BinOp::Mul, Expr::ident(Identifier::indexed(a, Expr::var(i))), Expr::constant(2));
        assert_eq!(eval_expr(&m, &state, &e), Ok(14));
        let div = Expr::binary(BinOp::Div, Expr::constant(1), Expr::constant(0));
        assert_eq!(eval_expr(&m, &state, &div), Err(EvalError::DivisionByZero));
        let out = Expr::ident(Identifier::indexed(a, Expr::constant(5)));
        assert!(matches!(eval_expr(&m, &state, &out), Err(EvalError::IndexOutOfBounds { index: 5, .. })));
    }

    #[test]
    fn test_channel_expressions() {
        let mut b = SpecBuilder::new();
        let c = b.global(Variable::new("c", VarType::channel(2, vec![ScalarType::Byte])));
        let r = b.global(Variable::new("r", VarType::channel(0, vec![ScalarType::Byte])));
        b.process("P", |p| {
            p.sequence(vec![Action::send(Identifier::new(c), vec![Expr::constant(3)])]);
        });
        let m = build_model(&b.build(), &Options::default()).unwrap();
        let mut state = m.initial_state();
        let full = |chan| Expr::ChanOp {
            op: ChanOp::Full,
            chan: Identifier::new(chan),
        };
        assert_eq!(eval_expr(&m, &state, &full(r)), Ok(1));
        assert_eq!(eval_expr(&m, &state, &full(c)), Ok(0));

        let sv = m.state_vector();
        let fill = sv.slots().iter().position(|s| s.name == "c.fill").unwrap();
        let head = sv.slots().iter().position(|s| s.name == "c.buf[0].m0").unwrap();
        state[fill] = 1;
        state[head] = 3;
        let poll = |v| Expr::ChanPoll {
            chan: Identifier::new(c),
            args: vec![Expr::constant(v)],
            random: false,
        };
        assert_eq!(eval_expr(&m, &state, &poll(3)), Ok(1));
        assert_eq!(eval_expr(&m, &state, &poll(4)), Ok(0));
        assert_eq!(eval_expr(&m, &state, &Expr::ChanLen { chan: Identifier::new(c) }), Ok(1));
    }

    #[test]
    fn test_guards_hold_in_the_initial_state() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        b.process("P", |p| {
            p.sequence(vec![Action::expr(Expr::eq(Expr::var(x), Expr::constant(0)))]);
        });
        let m = build_model(&b.build(), &Options::default()).unwrap();
        let state = m.initial_state();
        let first = &m.transitions()[0];
        assert!(eval_guard(&m, &state, &Guard::And(first.guards.clone())).unwrap());
        assert!(!eval_guard(&m, &state, m.deadlock()).unwrap());
        assert_eq!(eval_expr(&m, &state, &Expr::Timeout), Ok(0));
        assert!(matches!(eval_expr(&m, &[0], &Expr::Timeout), Err(EvalError::StateSize { .. })));
    }
}
