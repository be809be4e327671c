use std::fs;
use std::process;

pub fn settings_export() {
    print!("{}", compound_core::settings::default_toml());
}

pub fn settings_validate(file: &str) {
    let content = die!(fs::read_to_string(file), "Error reading {file}: {}");
    let s = die!(
        compound_core::settings::parse_settings_toml(&content),
        "Error: {}"
    );
    println!(
        "OK: training.objective={:?}, training.update={:?}, training.iterations={}, noise.samples={}, decoder.kbest={}",
        s.training.objective, s.training.update, s.training.iterations, s.noise.samples, s.decoder.kbest
    );
}
