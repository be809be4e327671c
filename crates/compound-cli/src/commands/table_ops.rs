use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::process;

use compound_core::table::LexicalTable;

pub fn compile_table(input_file: &str, output_file: &str) {
    eprintln!("Parsing {input_file}...");
    let table = die!(
        LexicalTable::load_text(Path::new(input_file)),
        "Error parsing table: {}"
    );
    let (sources, pairs) = table.stats();
    die!(table.save(Path::new(output_file)), "Error writing table: {}");

    let file_size = fs::metadata(output_file).map(|m| m.len()).unwrap_or(0);
    eprintln!(
        "Wrote {output_file} ({sources} source words, {pairs} pairs, {:.1} KB)",
        file_size as f64 / 1024.0
    );
}

pub fn table_info(file: &str) {
    let compiled = die!(is_compiled(file), "Error reading {file}: {}");
    let table = if compiled {
        die!(LexicalTable::open(Path::new(file)), "Error opening table: {}")
    } else {
        die!(
            LexicalTable::load_text(Path::new(file)),
            "Error parsing table: {}"
        )
    };
    let file_size = fs::metadata(file).map(|m| m.len()).unwrap_or(0);
    let (sources, pairs) = table.stats();

    println!("Table:      {file}");
    println!("Format:     {}", if compiled { "compiled" } else { "text" });
    println!("File size:  {:.1} KB", file_size as f64 / 1024.0);
    println!("Sources:    {sources}");
    println!("Pairs:      {pairs}");

    println!();
    println!("Sample entries:");
    for (source, target, score) in table.iter().take(8) {
        println!("  {source} → {target} ({score:.3})");
    }
}

fn is_compiled(file: &str) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    match File::open(file)?.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == b"CPTT"),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
