//! End-to-end model construction on small hand-built specifications.

use pretty_assertions::assert_eq;
use spins_ast::{
    Action, Expr, Identifier, ProcId, ScalarType, SpecBuilder, StateId, VarType, Variable,
};
use spins_ltsmin::guard_info::VALID_END_LABEL;
use spins_ltsmin::{build_model, eval_expr, Guard, Model, Options, TransitionKind};

fn slot(model: &Model, name: &str) -> usize {
    model
        .state_vector()
        .slots()
        .iter()
        .position(|s| s.name == name)
        .unwrap_or_else(|| panic!("no slot {name}"))
}

fn per_process(model: &Model, p: usize) -> usize {
    model
        .transitions()
        .iter()
        .filter(|t| t.process == Some(ProcId(p)))
        .count()
}

#[test]
fn scenario_a_sequential_assignments() {
    let mut b = SpecBuilder::new();
    let x = b.global(Variable::new("x", VarType::int()));
    b.process("A", |p| {
        p.sequence(vec![
            Action::assign(Identifier::new(x), Expr::constant(1)),
            Action::assign(Identifier::new(x), Expr::constant(2)),
        ]);
    });
    b.process("B", |_| {});
    let model = build_model(&b.build(), &Options::default()).unwrap();

    let names: Vec<&str> = model
        .state_vector()
        .slots()
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(names, vec!["_priority", "x", "A._pc", "A._pid", "B._pc", "B._pid"]);
    assert_eq!(per_process(&model, 0), 3);
    assert_eq!(per_process(&model, 1), 1);

    let end = model.labels().find(VALID_END_LABEL).unwrap();
    let expr = &model.labels().label(end).expr;
    let mut state = model.initial_state();
    assert_eq!(eval_expr(&model, &state, expr), Ok(0));
    state[slot(&model, "A._pc")] = -1;
    assert_eq!(eval_expr(&model, &state, expr), Ok(0));
    state[slot(&model, "B._pc")] = -1;
    assert_eq!(eval_expr(&model, &state, expr), Ok(1));
}

#[test]
fn scenario_b_buffered_channel() {
    let mut b = SpecBuilder::new();
    let c = b.global(Variable::new("c", VarType::channel(1, vec![ScalarType::Byte])));
    b.process("P", |p| {
        p.sequence(vec![Action::send(Identifier::new(c), vec![Expr::constant(5)])]);
    });
    b.process("Q", |p| {
        let v = p.local(Variable::new("v", VarType::byte()));
        p.sequence(vec![Action::receive(Identifier::new(c), vec![Expr::var(v)])]);
    });
    let model = build_model(&b.build(), &Options::default()).unwrap();

    assert!(model
        .transitions()
        .iter()
        .all(|t| !matches!(t.kind, TransitionKind::Rendezvous { .. })));
    let fill = || Expr::ident(Identifier::new(c).fill());
    let send = model
        .transitions()
        .iter()
        .find(|t| t.actions().any(|a| matches!(a, Action::Send { .. })))
        .unwrap();
    assert!(send.guards.contains(&Guard::Expr(Expr::lt(fill(), Expr::constant(1)))));
    let recv = model
        .transitions()
        .iter()
        .find(|t| t.actions().any(|a| matches!(a, Action::Receive { .. })))
        .unwrap();
    assert!(recv.guards.contains(&Guard::Expr(Expr::gt(fill(), Expr::constant(0)))));
    assert_ne!(send.process, recv.process);

    let deps = model.dependencies();
    let fill_slot = slot(&model, "c.fill");
    assert!(deps.full.must_write.get(send.group, fill_slot));
    assert!(deps.full.must_write.get(recv.group, fill_slot));
    assert!(deps.full.may_write.get(recv.group, slot(&model, "Q.v")));
}

#[test]
fn scenario_c_atomic_block() {
    let mut b = SpecBuilder::new();
    let a = b.global(Variable::new("a", VarType::int()));
    let bb = b.global(Variable::new("b", VarType::int()));
    b.process("P", |p| {
        let s0 = p.start();
        let s1 = p.atomic_state();
        let s2 = p.state();
        p.edge(s0, Some(s1), vec![Action::assign(Identifier::new(a), Expr::constant(1))]);
        p.edge(s1, Some(s2), vec![Action::assign(Identifier::new(bb), Expr::constant(2))]);
    });
    let model = build_model(&b.build(), &Options::default()).unwrap();
    let priority = Identifier::new(model.state_vector().priority());
    let sets_priority = |t: &spins_ltsmin::Transition, v: i32| {
        t.actions()
            .any(|act| *act == Action::assign(priority.clone(), Expr::constant(v)))
    };

    let entry = model
        .transitions()
        .iter()
        .find(|t| t.kind == TransitionKind::Plain && t.begin.state == Some(StateId(0)))
        .unwrap();
    assert!(sets_priority(entry, 0));
    let exit = model
        .transitions()
        .iter()
        .find(|t| t.kind == TransitionKind::Plain && t.begin.state == Some(StateId(1)))
        .unwrap();
    assert!(sets_priority(exit, -1));
    assert!(exit.atomic);

    let loss = model
        .transitions()
        .iter()
        .find(|t| t.kind == TransitionKind::LossOfAtomicity)
        .unwrap();
    let held = Guard::Expr(Expr::eq(Expr::ident(priority.clone()), Expr::constant(0)));
    assert!(loss.guards.contains(&held));
    assert!(loss
        .guards
        .contains(&Guard::Nand(vec![Guard::Or(vec![Guard::And(exit.guards.clone())])])));
    assert!(sets_priority(loss, -1));

    // the loss step cannot fire while the block can continue
    let mut state = model.initial_state();
    state[slot(&model, "_priority")] = 0;
    state[slot(&model, "P._pc")] = 1;
    let loss_guard = Guard::And(loss.guards.clone());
    assert_eq!(spins_ltsmin::eval_guard(&model, &state, &loss_guard), Ok(false));
    assert!(!model.has_atomic_cycles());
}
