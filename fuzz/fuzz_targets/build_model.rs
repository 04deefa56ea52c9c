#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(spec) = serde_json::from_slice::<spins_ast::Specification>(data) {
        if spec.processes.len() <= 8 {
            let options = spins_ltsmin::Options {
                aggressiveness: spins_ltsmin::Aggressiveness::Highest,
                ..spins_ltsmin::Options::default()
            };
            let _ = spins_ltsmin::build_model(&spec, &options);
        }
    }
});
