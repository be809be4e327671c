use std::path::Path;

use clap::{Parser, Subcommand};

use compound_cli::commands::{
    analyze_ops, config_ops, init_settings, partition_ops, predict_ops, table_ops, train_ops,
};
use compound_cli::trace_init::init_tracing;

#[derive(Parser)]
#[command(name = "compoundtool", about = "Compound decomposition model tool")]
struct Cli {
    /// Settings TOML replacing the built-in defaults
    #[arg(long, global = true)]
    settings: Option<String>,
    /// Directory for JSON trace logs (optional)
    #[arg(long, global = true)]
    log_dir: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every derivation of `source... compound` lines with their features
    Analyze {
        /// Forward lexical table (source -> target)
        fwd_table: String,
        /// Reverse lexical table (target -> source)
        rev_table: String,
        /// Input file (stdin when omitted)
        input: Option<String>,
    },
    /// Train a model on a `source... compound` corpus
    Train {
        /// Training corpus, one pair per line
        corpus_file: String,
        /// Forward lexical table
        fwd_table: String,
        /// Reverse lexical table
        rev_table: String,
        /// Output model file
        #[arg(short, long)]
        output: String,
        /// Override training.iterations
        #[arg(long)]
        iterations: Option<usize>,
    },
    /// Decode k-best compounds for source sentences
    Predict {
        /// Trained model file
        model_file: String,
        /// Forward lexical table
        fwd_table: String,
        /// Reverse lexical table
        rev_table: String,
        /// Input file (stdin when omitted)
        input: Option<String>,
        /// Hypotheses per sentence (default: decoder.kbest)
        #[arg(short)]
        k: Option<usize>,
        /// Output JSON lines instead of text
        #[arg(long)]
        json: bool,
        /// Input lines end with the reference compound; report top-1 accuracy
        #[arg(long)]
        with_target: bool,
    },
    /// Compare the exact and brute-force partition functions of one sentence
    CheckPartition {
        /// Forward lexical table
        fwd_table: String,
        /// Reverse lexical table
        rev_table: String,
        /// Source words
        #[arg(required = true)]
        words: Vec<String>,
        /// Known suffix (repeatable; the empty suffix is always known)
        #[arg(long = "suffix", default_values_t = vec!["n".to_string()])]
        suffixes: Vec<String>,
    },
    /// Compile a text lexical table into the binary format
    CompileTable {
        /// Input text table (`source target score` per line)
        input_file: String,
        /// Output compiled table
        output_file: String,
    },
    /// Show statistics of a lexical table (compiled or text)
    TableInfo {
        /// Table file
        file: String,
    },
    /// Print the built-in settings TOML
    SettingsExport,
    /// Validate a settings TOML file
    SettingsValidate {
        /// Settings file
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Some(file) = &cli.settings {
        init_settings(file);
    }
    let _guard = init_tracing(cli.log_dir.as_deref().map(Path::new));

    match cli.command {
        Command::Analyze {
            fwd_table,
            rev_table,
            input,
        } => analyze_ops::analyze(&fwd_table, &rev_table, input.as_deref()),
        Command::Train {
            corpus_file,
            fwd_table,
            rev_table,
            output,
            iterations,
        } => train_ops::train(&corpus_file, &fwd_table, &rev_table, &output, iterations),
        Command::Predict {
            model_file,
            fwd_table,
            rev_table,
            input,
            k,
            json,
            with_target,
        } => {
            let opts = predict_ops::PredictOptions {
                k,
                json,
                with_target,
            };
            predict_ops::predict(&model_file, &fwd_table, &rev_table, input.as_deref(), &opts);
        }
        Command::CheckPartition {
            fwd_table,
            rev_table,
            words,
            suffixes,
        } => partition_ops::check_partition(&fwd_table, &rev_table, &words, &suffixes),
        Command::CompileTable {
            input_file,
            output_file,
        } => table_ops::compile_table(&input_file, &output_file),
        Command::TableInfo { file } => table_ops::table_info(&file),
        Command::SettingsExport => config_ops::settings_export(),
        Command::SettingsValidate { file } => config_ops::settings_validate(&file),
    }
}
