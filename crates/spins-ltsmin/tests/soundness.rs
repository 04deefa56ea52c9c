//! Properties: the matrices only ever clear a bit that is provably clear.
//!
//! Co-enabledness and the enabling sets are checked against brute force
//! evaluation over the whole domain of a byte variable, dependencies against
//! the shape of a single array assignment.

use proptest::prelude::*;
use spins_ast::{
    Action, AssignOp, CmpOp, Expr, Identifier, ProcId, ScalarType, SpecBuilder, Span, VarId,
    VarType, Variable,
};
use spins_ltsmin::{
    build_model, eval_expr, eval_guard, Aggressiveness, Effect, Guard, Model, Options, Transition,
};

fn cmp_op() -> impl Strategy<Value = CmpOp> {
    prop_oneof![
        Just(CmpOp::Lt),
        Just(CmpOp::Le),
        Just(CmpOp::Eq),
        Just(CmpOp::Ne),
        Just(CmpOp::Gt),
        Just(CmpOp::Ge),
    ]
}

fn level() -> impl Strategy<Value = Aggressiveness> {
    prop_oneof![
        Just(Aggressiveness::Weak),
        Just(Aggressiveness::Normal),
        Just(Aggressiveness::High),
        Just(Aggressiveness::Highest),
    ]
}

fn slot(model: &Model, name: &str) -> usize {
    model
        .state_vector()
        .slots()
        .iter()
        .position(|s| s.name == name)
        .unwrap()
}

fn enabled(model: &Model, state: &[i32], t: &Transition) -> bool {
    eval_guard(model, state, &Guard::And(t.guards.clone())).unwrap()
}

/// Applies the effects of `t` to `state`. Supports assignments to byte and
/// int scalars and constant receives on the buffered channel `c`.
fn apply(model: &Model, state: &[i32], t: &Transition) -> Vec<i32> {
    let sv = model.state_vector();
    let mut next = state.to_vec();
    for effect in &t.effects {
        match effect {
            Effect::Action(Action::Assign { target, op, value, .. }) => {
                let r = sv.resolve_write(target).unwrap();
                assert!(r.exact);
                let s = r.slots[0];
                let v = match op {
                    AssignOp::Set => eval_expr(model, &next, value).unwrap(),
                    AssignOp::Incr => next[s] + 1,
                    AssignOp::Decr => next[s] - 1,
                };
                next[s] = match sv.slot(s).ty {
                    ScalarType::Byte => v.rem_euclid(256),
                    _ => v,
                };
            }
            Effect::Action(Action::Expr { .. }) => {}
            Effect::Action(Action::Send { args, sorted, .. }) => {
                let v = eval_expr(model, &next, &args[0]).unwrap();
                let fill = slot(model, "c.fill");
                let mut buf: Vec<i32> = (0..next[fill] as usize)
                    .map(|r| next[slot(model, &format!("c.buf[{r}].m0"))])
                    .collect();
                let at = if *sorted {
                    buf.iter().position(|&m| m > v).unwrap_or(buf.len())
                } else {
                    buf.len()
                };
                buf.insert(at, v);
                store(model, &mut next, &buf);
            }
            Effect::Action(Action::Receive { .. }) => {
                let fill = slot(model, "c.fill");
                let buf: Vec<i32> = (1..next[fill] as usize)
                    .map(|r| next[slot(model, &format!("c.buf[{r}].m0"))])
                    .collect();
                store(model, &mut next, &buf);
            }
            other => panic!("unsupported effect {other:?}"),
        }
    }
    next
}

fn store(model: &Model, state: &mut [i32], buf: &[i32]) {
    state[slot(model, "c.fill")] = buf.len() as i32;
    for r in 0..2 {
        state[slot(model, &format!("c.buf[{r}].m0"))] = buf.get(r).copied().unwrap_or(0);
    }
}

/// Every state `group` can end in from `state`, following the atomic
/// continuation until no follow-up is enabled.
fn outcomes(model: &Model, state: &[i32], group: usize) -> Vec<Vec<i32>> {
    let entry = &model.transitions()[group];
    if !enabled(model, state, entry) {
        return Vec::new();
    }
    let mut done = Vec::new();
    let mut frontier = vec![(apply(model, state, entry), 0)];
    while let Some((current, depth)) = frontier.pop() {
        let next: Vec<&Transition> = entry
            .follow_ups
            .iter()
            .map(|&f| &model.transitions()[f])
            .filter(|t| enabled(model, &current, t))
            .collect();
        if next.is_empty() || depth == 4 {
            done.push(current);
            continue;
        }
        for t in next {
            frontier.push((apply(model, &current, t), depth + 1));
        }
    }
    done
}

#[derive(Debug, Clone)]
enum Step {
    Set(i32),
    Incr,
    Test(CmpOp, i32),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0i32..6).prop_map(Step::Set),
        Just(Step::Incr),
        (cmp_op(), 0i32..6).prop_map(|(op, c)| Step::Test(op, c)),
    ]
}

fn action(x: VarId, step: &Step) -> Action {
    match *step {
        Step::Set(c) => Action::assign(Identifier::new(x), Expr::constant(c)),
        Step::Incr => Action::incr(Identifier::new(x)),
        Step::Test(op, c) => Action::expr(Expr::compare(op, Expr::var(x), Expr::constant(c))),
    }
}

#[test]
fn sorted_send_never_commutes_with_a_receive() {
    for sorted in [false, true] {
        let mut b = SpecBuilder::new();
        let c = b.global(Variable::new("c", VarType::channel(2, vec![ScalarType::Byte])));
        b.process("P", |p| {
            let s0 = p.start();
            p.edge(
                s0,
                Some(s0),
                vec![Action::Send {
                    chan: Identifier::new(c),
                    args: vec![Expr::constant(3)],
                    sorted,
                    span: Span::dummy(),
                }],
            );
        });
        b.process("Q", |p| {
            let s0 = p.start();
            p.edge(s0, Some(s0), vec![Action::receive(Identifier::new(c), vec![Expr::constant(5)])]);
        });
        let spec = b.build();
        for aggressiveness in [Aggressiveness::Normal, Aggressiveness::Highest] {
            let options = Options { aggressiveness, ..Options::default() };
            let model = build_model(&spec, &options).unwrap();
            let group = |send: bool| {
                model
                    .transitions()
                    .iter()
                    .find(|t| {
                        t.actions().any(|a| match a {
                            Action::Send { .. } => send,
                            Action::Receive { .. } => !send,
                            _ => false,
                        })
                    })
                    .unwrap()
                    .group
            };
            let (send, recv) = (group(true), group(false));
            let info = model.guard_info();

            let mut reorders = false;
            for head in 0..8 {
                let mut state = model.initial_state();
                store(&model, &mut state, &[head]);
                let one = outcomes(&model, &state, send)
                    .iter()
                    .flat_map(|s| outcomes(&model, s, recv))
                    .collect::<Vec<_>>();
                let other = outcomes(&model, &state, recv)
                    .iter()
                    .flat_map(|s| outcomes(&model, s, send))
                    .collect::<Vec<_>>();
                reorders |= !one.is_empty() && !other.is_empty() && one != other;
                reorders |= one.is_empty() != other.is_empty()
                    && enabled(&model, &state, &model.transitions()[send])
                    && enabled(&model, &state, &model.transitions()[recv]);
            }
            assert_eq!(reorders, sorted, "{aggressiveness:?}");
            if reorders {
                assert!(!info.matrix("commutes").unwrap().get(send, recv));
                assert!(info.matrix("dna").unwrap().get(send, recv));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn co_enabled_guards_are_never_cleared(
        guards in prop::collection::vec((cmp_op(), 0i32..6), 2..4),
        aggressiveness in level(),
        must_write in any::<bool>(),
    ) {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::byte()));
        let exprs: Vec<Expr> = guards
            .iter()
            .map(|&(op, c)| Expr::compare(op, Expr::var(x), Expr::constant(c)))
            .collect();
        b.process("P", |p| {
            let s0 = p.start();
            for e in &exprs {
                p.edge(s0, None, vec![Action::expr(e.clone())]);
            }
        });
        let options = Options { aggressiveness, must_write, ..Options::default() };
        let model = build_model(&b.build(), &options).unwrap();
        let labels = model.labels();
        let x_slot = slot(&model, "x");

        let holds: Vec<Vec<bool>> = (0..labels.guard_count())
            .map(|l| {
                (0..=255)
                    .map(|v| {
                        let mut state = model.initial_state();
                        state[x_slot] = v;
                        eval_expr(&model, &state, &labels.label(l).expr).unwrap() != 0
                    })
                    .collect()
            })
            .collect();

        let gi = model.guard_info();
        for a in 0..labels.guard_count() {
            for b in 0..labels.guard_count() {
                let together = (0..256).any(|v| holds[a][v] && holds[b][v]);
                prop_assert!(
                    !together || gi.co_enabled.get(a, b),
                    "{} and {} hold together but MCE is clear",
                    labels.label(a).name,
                    labels.label(b).name
                );
                let both_fail = (0..256).any(|v| !holds[a][v] && !holds[b][v]);
                prop_assert!(!both_fail || gi.co_disabled.get(a, b));
            }
        }
    }

    #[test]
    fn array_writes_match_the_index(index in prop::option::of(0i32..3), value in 0i32..10) {
        let mut b = SpecBuilder::new();
        let i = b.global(Variable::new("i", VarType::byte()));
        let a = b.global(Variable::new("a", VarType::int()).with_array(3));
        let target = match index {
            Some(k) => Identifier::indexed(a, Expr::constant(k)),
            None => Identifier::indexed(a, Expr::var(i)),
        };
        b.process("P", |p| {
            p.sequence(vec![Action::assign(target.clone(), Expr::constant(value))]);
        });
        let model = build_model(&b.build(), &Options::default()).unwrap();
        let group = model
            .transitions()
            .iter()
            .find(|t| t.actions().any(|act| matches!(act, Action::Assign { target, .. } if target.var == a)))
            .unwrap()
            .group;
        let deps = &model.dependencies().full;

        for k in 0..3 {
            let s = slot(&model, &format!("a[{k}]"));
            match index {
                Some(c) => {
                    prop_assert_eq!(deps.may_write.get(group, s), c == k as i32);
                    prop_assert_eq!(deps.must_write.get(group, s), c == k as i32);
                }
                None => {
                    prop_assert!(deps.may_write.get(group, s));
                    prop_assert!(!deps.must_write.get(group, s));
                }
            }
        }
        prop_assert_eq!(deps.read.get(group, slot(&model, "i")), index.is_none());
    }

    #[test]
    fn enabling_sets_cover_every_flip(
        first in step(),
        second in step(),
        guards in prop::collection::vec((cmp_op(), 0i32..6), 1..3),
        highest in any::<bool>(),
    ) {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::byte()));
        b.process("P", |p| {
            let s0 = p.start();
            let s1 = p.state();
            p.set_atomic(s1);
            p.edge(s0, Some(s1), vec![action(x, &first)]);
            p.edge(s1, Some(s0), vec![action(x, &second)]);
        });
        b.process("Q", |p| {
            let s0 = p.start();
            for &(op, c) in &guards {
                p.edge(s0, Some(s0), vec![Action::expr(Expr::compare(op, Expr::var(x), Expr::constant(c)))]);
            }
        });
        let options = if highest {
            Options { aggressiveness: Aggressiveness::Highest, must_write: true, ..Options::default() }
        } else {
            Options { aggressiveness: Aggressiveness::Normal, ..Options::default() }
        };
        let model = build_model(&b.build(), &options).unwrap();
        let sv = model.state_vector();
        let labels = model.labels();
        let info = model.guard_info();
        let x_slot = slot(&model, "x");
        let pc = sv.scalar_slot(sv.pc(ProcId(0))).unwrap();
        let priority = sv.scalar_slot(sv.priority()).unwrap();

        let holds = |state: &[i32], l: usize| eval_expr(&model, state, &labels.label(l).expr).unwrap() != 0;
        for v in 0..=255 {
            for (at, held) in [(0, -1), (1, 0), (1, -1)] {
                let mut pre = model.initial_state();
                pre[x_slot] = v;
                pre[pc] = at;
                pre[priority] = held;
                for group in 0..model.group_count() {
                    for post in outcomes(&model, &pre, group) {
                        for l in 0..labels.guard_count() {
                            match (holds(&pre, l), holds(&post, l)) {
                                (false, true) => {
                                    prop_assert!(
                                        info.nes.get(l, group),
                                        "group {} enables {} from x={} but is not in NES",
                                        group, labels.label(l).name, v
                                    );
                                }
                                (true, false) => {
                                    prop_assert!(
                                        info.nds.get(l, group),
                                        "group {} disables {} from x={} but is not in NDS",
                                        group, labels.label(l).name, v
                                    );
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
        }
    }
}
