//! Pretty printer for expressions and actions, in Promela syntax.

use crate::action::{Action, AssignOp};
use crate::expr::{Expr, Identifier, LogicOp, Member, UnaryOp};
use crate::types::Variable;

/// Pretty print an expression, resolving variable names through `vars`.
pub fn pretty_print_expr(expr: &Expr, vars: &[Variable]) -> String {
    let mut printer = PrettyPrinter::new(vars);
    printer.print_expr(expr);
    printer.output
}

/// Pretty print an action on one line.
pub fn pretty_print_action(action: &Action, vars: &[Variable]) -> String {
    let mut printer = PrettyPrinter::new(vars);
    printer.print_action(action);
    printer.output
}

/// Pretty print an identifier.
pub fn pretty_print_identifier(id: &Identifier, vars: &[Variable]) -> String {
    let mut printer = PrettyPrinter::new(vars);
    printer.print_identifier(id);
    printer.output
}

struct PrettyPrinter<'a> {
    output: String,
    vars: &'a [Variable],
}

impl<'a> PrettyPrinter<'a> {
    fn new(vars: &'a [Variable]) -> Self {
        Self {
            output: String::new(),
            vars,
        }
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn print_list(&mut self, exprs: &[Expr]) {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.write(",");
            }
            self.print_expr(e);
        }
    }

    fn print_identifier(&mut self, id: &Identifier) {
        match self.vars.get(id.var.0) {
            Some(var) => {
                let name = var.name.clone();
                self.write(&name);
            }
            None => self.write(&format!("v{}", id.var.0)),
        }
        if let Some(index) = &id.index {
            self.write("[");
            self.print_expr(index);
            self.write("]");
        }
        let mut member = id.member.as_deref();
        while let Some(m) = member {
            member = match m {
                Member::Field {
                    name,
                    index,
                    member,
                } => {
                    self.write(".");
                    self.write(name);
                    if let Some(index) = index {
                        self.write("[");
                        self.print_expr(index);
                        self.write("]");
                    }
                    member.as_deref()
                }
                Member::Fill => {
                    self.write(".fill");
                    None
                }
                Member::Buffer { row, field } => {
                    self.write(".buf[");
                    self.print_expr(row);
                    self.write(&format!("].m{}", field));
                    None
                }
            };
        }
    }

    fn print_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Const { value } => self.write(&value.to_string()),
            Expr::Ident(id) => self.print_identifier(id),
            Expr::Unary { op, expr } => {
                self.write(match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                });
                self.print_operand(expr);
            }
            Expr::Binary { op, left, right } => {
                self.print_operand(left);
                self.write(op.symbol());
                self.print_operand(right);
            }
            Expr::Compare { op, left, right } => {
                self.print_operand(left);
                self.write(op.symbol());
                self.print_operand(right);
            }
            Expr::Logic { op, left, right } => {
                self.print_operand(left);
                self.write(match op {
                    LogicOp::And => " && ",
                    LogicOp::Or => " || ",
                });
                self.print_operand(right);
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                self.write("(");
                self.print_expr(cond);
                self.write(" -> ");
                self.print_expr(then);
                self.write(" : ");
                self.print_expr(otherwise);
                self.write(")");
            }
            Expr::ChanLen { chan } => {
                self.write("len(");
                self.print_identifier(chan);
                self.write(")");
            }
            Expr::ChanPoll { chan, args, random } => {
                self.print_identifier(chan);
                self.write(if *random { "??[" } else { "?[" });
                self.print_list(args);
                self.write("]");
            }
            Expr::ChanOp { op, chan } => {
                self.write(op.name());
                self.write("(");
                self.print_identifier(chan);
                self.write(")");
            }
            Expr::Mtype { name, .. } => self.write(name),
            Expr::RemoteRef { label, process, .. } => {
                self.write(&format!("P{}@{}", process.0, label));
            }
            Expr::Eval { expr } => {
                self.write("eval(");
                self.print_expr(expr);
                self.write(")");
            }
            Expr::Timeout => self.write("timeout"),
            Expr::Run(run) => {
                self.write("run ");
                self.write(&run.proctype);
                self.write("(");
                self.print_list(&run.args);
                self.write(")");
            }
        }
    }

    fn print_operand(&mut self, expr: &Expr) {
        let nested = matches!(
            expr,
            Expr::Binary { .. } | Expr::Compare { .. } | Expr::Logic { .. }
        );
        if nested {
            self.write("(");
        }
        self.print_expr(expr);
        if nested {
            self.write(")");
        }
    }

    fn print_action(&mut self, action: &Action) {
        match action {
            Action::Assign {
                target, op, value, ..
            } => {
                self.print_identifier(target);
                match op {
                    AssignOp::Set => {
                        self.write(" = ");
                        self.print_expr(value);
                    }
                    AssignOp::Incr => self.write("++"),
                    AssignOp::Decr => self.write("--"),
                }
            }
            Action::Assert { expr, .. } => {
                self.write("assert(");
                self.print_expr(expr);
                self.write(")");
            }
            Action::Print { format, args, .. } => {
                self.write(&format!("printf({:?}", format));
                for a in args {
                    self.write(",");
                    self.print_expr(a);
                }
                self.write(")");
            }
            Action::Expr { expr, .. } => self.print_expr(expr),
            Action::Send {
                chan, args, sorted, ..
            } => {
                self.print_identifier(chan);
                self.write(if *sorted { "!!" } else { "!" });
                self.print_list(args);
            }
            Action::Receive {
                chan,
                args,
                poll,
                random,
                ..
            } => {
                self.print_identifier(chan);
                self.write(if *random { "??" } else { "?" });
                if *poll {
                    self.write("<");
                }
                self.print_list(args);
                if *poll {
                    self.write(">");
                }
            }
            Action::Options {
                options, looping, ..
            } => {
                self.write(if *looping { "do" } else { "if" });
                for seq in options {
                    self.write(" :: ");
                    for (i, a) in seq.iter().enumerate() {
                        if i > 0 {
                            self.write("; ");
                        }
                        self.print_action(a);
                    }
                }
                self.write(if *looping { " od" } else { " fi" });
            }
            Action::Break { .. } => self.write("break"),
            Action::Else { .. } => self.write("else"),
            Action::Goto { label, .. } => self.write(&format!("goto {}", label)),
            Action::Label { name, .. } => self.write(&format!("{}:", name)),
        }
    }
}
