#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(spec) = serde_json::from_slice::<spins_ast::Specification>(data) {
        if spec.processes.len() <= 8 {
            if let Ok(model) = spins_ltsmin::build_model(&spec, &spins_ltsmin::Options::default()) {
                let state = model.initial_state();
                for t in model.transitions() {
                    let guard = spins_ltsmin::Guard::And(t.guards.clone());
                    let _ = spins_ltsmin::eval_guard(&model, &state, &guard);
                }
                for label in model.labels().labels() {
                    let _ = spins_ltsmin::eval_expr(&model, &state, &label.expr);
                }
            }
        }
    }
});
