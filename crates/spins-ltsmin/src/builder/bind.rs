//! Binding of `run` expressions to process instances.
//!
//! Processes arrive already instantiated. Each run site of a proctype is
//! bound either to exactly one inactive instance (when there are as many
//! sites as instances) or to all of them, in which case the instance that
//! starts is only known at run time. Channel parameters are replaced by the
//! channel passed at the single static site.

use crate::error::{BuildError, BuildResult};
use indexmap::IndexMap;
use spins_ast::{Expr, Identifier, ProcId, RunExpr, RunInit, Span, Specification, VarId, Variable};
use std::collections::HashMap;
use tracing::{debug, warn};

struct FirstSite {
    count: usize,
    process: String,
    span: Span,
}

struct Plan {
    targets: Vec<ProcId>,
    exact: bool,
    next: usize,
}

/// Return a copy of `spec` with every run expression bound and channel
/// parameters substituted.
pub(crate) fn bind_runs(spec: &Specification) -> BuildResult<Specification> {
    let mut spec = spec.clone();

    let mut sites: IndexMap<String, FirstSite> = IndexMap::new();
    for process in &spec.processes {
        for t in &process.automaton.transitions {
            for a in &t.actions {
                a.visit_exprs(&mut |e| {
                    if let Expr::Run(run) = e {
                        sites
                            .entry(run.proctype.clone())
                            .or_insert_with(|| FirstSite {
                                count: 0,
                                process: process.name.clone(),
                                span: run.span,
                            })
                            .count += 1;
                    }
                });
            }
        }
    }

    let mut plans: HashMap<String, Plan> = HashMap::new();
    for (proctype, first) in &sites {
        let targets: Vec<ProcId> = spec
            .instances_of(proctype)
            .filter(|p| !spec.processes[p.0].active)
            .collect();
        if targets.is_empty() {
            return Err(BuildError::UnknownProctype {
                process: first.process.clone(),
                proctype: proctype.clone(),
                span: first.span,
            });
        }
        let exact = targets.len() == first.count;
        debug!(proctype = %proctype, sites = first.count, instances = targets.len(), exact, "binding run sites");
        plans.insert(
            proctype.clone(),
            Plan {
                targets,
                exact,
                next: 0,
            },
        );
    }
    for process in &spec.processes {
        if !process.active && !sites.contains_key(&process.proctype) {
            warn!(process = %process.name, "process is never started");
        }
    }

    let params: Vec<Vec<VarId>> = spec.processes.iter().map(|p| p.params.clone()).collect();
    let mut aliases: HashMap<VarId, Identifier> = HashMap::new();
    let variables = &mut spec.variables;
    let mut failure = None;
    for process in &mut spec.processes {
        let name = process.name.clone();
        for t in &mut process.automaton.transitions {
            for a in &mut t.actions {
                a.for_each_run_mut(&mut |run| {
                    if failure.is_some() {
                        return;
                    }
                    let bound = bind_site(run, &name, &mut plans, &params, variables, &mut aliases);
                    if let Err(e) = bound {
                        failure = Some(e);
                    }
                });
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }

    if !aliases.is_empty() {
        substitute(&mut spec, &aliases);
    }
    Ok(spec)
}

fn bind_site(
    run: &mut RunExpr,
    process: &str,
    plans: &mut HashMap<String, Plan>,
    params: &[Vec<VarId>],
    variables: &mut [Variable],
    aliases: &mut HashMap<VarId, Identifier>,
) -> BuildResult<()> {
    let plan = plans.get_mut(&run.proctype).ok_or_else(|| BuildError::UnknownProctype {
        process: process.to_string(),
        proctype: run.proctype.clone(),
        span: run.span,
    })?;
    let targets = if plan.exact {
        let target = *plan
            .targets
            .get(plan.next)
            .ok_or_else(|| BuildError::internal(format!("more run sites than instances of {}", run.proctype)))?;
        plan.next += 1;
        vec![target]
    } else {
        plan.targets.clone()
    };

    run.inits.clear();
    for &target in &targets {
        let formal = &params[target.0];
        if formal.len() != run.args.len() {
            return Err(BuildError::ArgumentCount {
                process: process.to_string(),
                proctype: run.proctype.clone(),
                expected: formal.len(),
                found: run.args.len(),
                span: run.span,
            });
        }
        for (&param, arg) in formal.iter().zip(&run.args) {
            let var = variables
                .get_mut(param.0)
                .ok_or(BuildError::UnknownVariable { var: param.0, span: run.span })?;
            if var.ty.is_channel() {
                if !plan.exact {
                    return Err(BuildError::AmbiguousChannelBinding {
                        process: process.to_string(),
                        param: var.name.clone(),
                        span: run.span,
                    });
                }
                let Expr::Ident(chan) = arg else {
                    return Err(BuildError::unsupported(
                        process,
                        format!("channel argument {} that is not a channel variable", var.name),
                        run.span,
                    ));
                };
                aliases.insert(param, chan.clone());
            } else if let (true, Some(value)) = (plan.exact, arg.constant_value()) {
                var.init = Some(Expr::constant(value));
            } else {
                run.inits.push(RunInit {
                    target: Identifier::new(param),
                    value: arg.clone(),
                });
            }
        }
    }
    run.targets = targets;
    Ok(())
}

/// Follow aliases until a variable that is not a channel parameter.
fn resolve(aliases: &HashMap<VarId, Identifier>, id: &Identifier) -> Identifier {
    let mut current = id.clone();
    for _ in 0..=aliases.len() {
        let Some(target) = aliases.get(&current.var) else {
            break;
        };
        current = Identifier {
            var: target.var,
            index: target.index.clone().or(current.index),
            member: current.member.or_else(|| target.member.clone()),
        };
    }
    current
}

fn substitute(spec: &mut Specification, aliases: &HashMap<VarId, Identifier>) {
    let mut rewrite = |id: &mut Identifier| {
        if aliases.contains_key(&id.var) {
            *id = resolve(aliases, id);
        }
    };
    for process in &mut spec.processes {
        if let Some(enabler) = &mut process.enabler {
            enabler.map_identifiers(&mut rewrite);
        }
        for t in &mut process.automaton.transitions {
            for a in &mut t.actions {
                a.map_identifiers(&mut rewrite);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spins_ast::{Action, ScalarType, SpecBuilder, VarType};

    fn run(proctype: &str, args: Vec<Expr>) -> Action {
        Action::expr(Expr::Run(RunExpr {
            proctype: proctype.into(),
            args,
            span: Span::new(3, 1),
            targets: vec![],
            inits: vec![],
        }))
    }

    fn first_run(spec: &Specification, p: usize) -> RunExpr {
        let mut found = None;
        for t in &spec.processes[p].automaton.transitions {
            for a in &t.actions {
                a.visit_exprs(&mut |e| {
                    if let Expr::Run(r) = e {
                        found.get_or_insert_with(|| r.clone());
                    }
                });
            }
        }
        found.unwrap()
    }

    #[test]
    fn test_static_binding_sets_constant_init() {
        let mut b = SpecBuilder::new();
        let mut n = VarId(0);
        b.instance("w", "worker", false, |p| {
            n = p.param(Variable::new("n", VarType::byte()));
        });
        b.process("init", |p| {
            p.sequence(vec![run("worker", vec![Expr::constant(4)])]);
        });
        let bound = bind_runs(&b.build()).unwrap();
        let r = first_run(&bound, 1);
        assert_eq!(r.targets, vec![ProcId(0)]);
        assert!(r.inits.is_empty());
        assert_eq!(bound.variables[n.0].init, Some(Expr::constant(4)));
    }

    #[test]
    fn test_dynamic_binding_targets_every_instance() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::byte()));
        for name in ["w0", "w1"] {
            b.instance(name, "worker", false, |p| {
                p.param(Variable::new("n", VarType::byte()));
            });
        }
        b.process("init", |p| {
            p.sequence(vec![run("worker", vec![Expr::var(x)])]);
        });
        let bound = bind_runs(&b.build()).unwrap();
        let r = first_run(&bound, 2);
        assert_eq!(r.targets, vec![ProcId(0), ProcId(1)]);
        assert_eq!(r.inits.len(), 2);
    }

    #[test]
    fn test_dynamic_channel_binding_is_ambiguous() {
        let mut b = SpecBuilder::new();
        let c = b.global(Variable::new("c", VarType::channel(1, vec![ScalarType::Byte])));
        for name in ["w0", "w1"] {
            b.instance(name, "worker", false, |p| {
                p.param(Variable::new("ch", VarType::channel_param(vec![ScalarType::Byte])));
            });
        }
        b.process("init", |p| {
            p.sequence(vec![run("worker", vec![Expr::var(c)])]);
        });
        let err = bind_runs(&b.build()).unwrap_err();
        assert!(matches!(err, BuildError::AmbiguousChannelBinding { .. }));
        assert_eq!(err.span(), Span::new(3, 1));
    }

    #[test]
    fn test_channel_parameter_is_substituted() {
        let mut b = SpecBuilder::new();
        let c = b.global(Variable::new("c", VarType::channel(1, vec![ScalarType::Byte])));
        b.instance("w", "worker", false, |p| {
            let ch = p.param(Variable::new("ch", VarType::channel_param(vec![ScalarType::Byte])));
            p.sequence(vec![Action::send(Identifier::new(ch), vec![Expr::constant(1)])]);
        });
        b.process("init", |p| {
            p.sequence(vec![run("worker", vec![Expr::var(c)])]);
        });
        let bound = bind_runs(&b.build()).unwrap();
        let send = &bound.processes[0].automaton.transitions[0].actions[0];
        assert_eq!(send.channel().map(|id| id.var), Some(c));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let mut b = SpecBuilder::new();
        b.instance("w", "worker", false, |p| {
            p.param(Variable::new("n", VarType::byte()));
        });
        b.process("init", |p| {
            p.sequence(vec![run("worker", vec![])]);
        });
        let err = bind_runs(&b.build()).unwrap_err();
        assert!(matches!(err, BuildError::ArgumentCount { expected: 1, found: 0, .. }));
    }

    #[test]
    fn test_unknown_proctype() {
        let mut b = SpecBuilder::new();
        b.process("init", |p| {
            p.sequence(vec![run("ghost", vec![])]);
        });
        let err = bind_runs(&b.build()).unwrap_err();
        assert!(matches!(err, BuildError::UnknownProctype { .. }));
    }
}
