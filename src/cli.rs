use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Inspect unknown tabular files and run sandboxed table transformations",
    long_about = None
)]
pub struct Cli {
    /// YAML file overriding the built-in configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Write the JSON response to this file instead of stdout
    #[arg(short = 'o', long, global = true)]
    pub output: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Profile a sample of a CSV or spreadsheet file
    Metadata(MetadataArgs),
    /// Full value/frequency distribution for selected columns
    Interpret(InterpretArgs),
    /// Run a transformation program against the full table
    Run(RunArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Args)]
pub struct MetadataArgs {
    /// File to profile
    pub file: PathBuf,
    /// Worksheet name or zero-based index (workbooks only)
    #[arg(short, long)]
    pub sheet: Option<String>,
    /// Print an aligned text table instead of JSON
    #[arg(long)]
    pub table: bool,
}

#[derive(Debug, Args)]
pub struct InterpretArgs {
    /// File holding the columns
    pub file: PathBuf,
    /// Comma-separated column names
    #[arg(short = 'C', long = "columns", value_delimiter = ',', required = true)]
    pub columns: Vec<String>,
    /// Worksheet name or zero-based index (workbooks only)
    #[arg(short, long)]
    pub sheet: Option<String>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["code", "script"])))]
pub struct RunArgs {
    /// File whose table is bound as `table` and `df`
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,
    /// Program text; must assign `result`
    #[arg(short = 'c', long)]
    pub code: Option<String>,
    /// Read the program from this file
    #[arg(long)]
    pub script: Option<PathBuf>,
    /// Worksheet name or zero-based index (workbooks only)
    #[arg(short, long)]
    pub sheet: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_requires_code_or_script() {
        let parsed = Cli::try_parse_from(["table-scout", "run", "--file", "a.csv"]);
        assert!(parsed.is_err());
        let parsed = Cli::try_parse_from(["table-scout", "run", "-f", "a.csv", "-c", "result = 1"])
            .expect("parse");
        let Commands::Run(args) = parsed.command else {
            panic!("expected run");
        };
        assert_eq!(args.code.as_deref(), Some("result = 1"));
    }

    #[test]
    fn interpret_splits_column_list() {
        let parsed = Cli::try_parse_from([
            "table-scout",
            "interpret",
            "data.csv",
            "--columns",
            "Region,Sales",
            "--output",
            "out.json",
        ])
        .expect("parse");
        assert_eq!(parsed.output, Some(PathBuf::from("out.json")));
        let Commands::Interpret(args) = parsed.command else {
            panic!("expected interpret");
        };
        assert_eq!(args.columns, vec!["Region", "Sales"]);
    }
}
