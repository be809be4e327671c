use std::fs;
use std::path::Path;
use std::process;

use compound_core::table::LexicalTable;

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

pub mod analyze_ops;
pub mod config_ops;
pub mod partition_ops;
pub mod predict_ops;
pub mod table_ops;
pub mod train_ops;

/// Install a custom settings file before anything reads the settings.
pub fn init_settings(file: &str) {
    let content = die!(fs::read_to_string(file), "Error reading {file}: {}");
    die!(
        compound_core::settings::init_custom(content),
        "Error in {file}: {}"
    );
}

/// Forward and reverse tables, compiled or text.
pub fn load_tables(fwd_file: &str, rev_file: &str) -> (LexicalTable, LexicalTable) {
    let fwd = die!(
        LexicalTable::open_any(Path::new(fwd_file)),
        "Error loading forward table {fwd_file}: {}"
    );
    let rev = die!(
        LexicalTable::open_any(Path::new(rev_file)),
        "Error loading reverse table {rev_file}: {}"
    );
    (fwd, rev)
}
