use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Compile a Pascal program into Jasmin assembler for the JVM.
#[derive(Debug, Parser)]
#[command(name = "pascalc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pascal to JVM (Jasmin) compiler", long_about = None)]
pub struct Cli {
    /// Source file; standard input when omitted
    pub input: Option<PathBuf>,

    /// Write one `<Class>.j` file per class into this directory
    #[arg(short = 'o', long = "out-dir")]
    pub out_dir: Option<PathBuf>,

    /// Program class name (defaults to the Pascal program name)
    #[arg(long = "class-name")]
    pub class_name: Option<String>,

    /// What to do when two case branches share a constant
    #[arg(long = "case-duplicates", value_enum, default_value_t = DuplicatePolicy::Reject)]
    pub case_duplicates: DuplicatePolicy,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DuplicatePolicy {
    /// Fail with a "duplicate case constant" error
    #[default]
    Reject,
    /// The branch listed last takes the constant
    LastWins,
}

/// Settings the generator consults.
#[derive(Debug, Clone, Default)]
pub struct CodegenConfig {
    pub case_duplicates: DuplicatePolicy,
}

impl Cli {
    pub fn codegen(&self) -> CodegenConfig {
        CodegenConfig {
            case_duplicates: self.case_duplicates,
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        }
    }
}
