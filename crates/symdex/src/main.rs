//! symdex - resolve type and variable names from DWARF debug info
//!
//! Usage:
//!   symdex <objects...> find <name>             Resolve a name
//!   symdex <objects...> find <name> -t typedef  Restrict to one tag
//!   symdex <objects...> files                   List indexed files

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use symdex_formats::dwarf::constants::{
    DW_TAG_BASE_TYPE, DW_TAG_CLASS_TYPE, DW_TAG_ENUMERATION_TYPE, DW_TAG_ENUMERATOR,
    DW_TAG_STRUCTURE_TYPE, DW_TAG_TYPEDEF, DW_TAG_UNION_TYPE, DW_TAG_VARIABLE,
};
use symdex_index::{DwarfIndex, Error, HandleFactory};

#[derive(Parser)]
#[command(name = "symdex")]
#[command(about = "Resolve type and variable names from DWARF debug info", long_about = None)]
struct Cli {
    /// Object files to index
    #[arg(required = true)]
    objects: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the DIEs defining a name
    Find {
        /// The type or variable name to resolve
        name: String,
        /// Restrict matches to one DWARF tag, by name (e.g.
        /// "structure_type") or number
        #[arg(short, long, value_parser = parse_tag)]
        tag: Option<u64>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List the files that carried debug info
    Files,
}

fn parse_tag(s: &str) -> Result<u64, String> {
    let named = match s {
        "base_type" => Some(DW_TAG_BASE_TYPE),
        "class_type" => Some(DW_TAG_CLASS_TYPE),
        "enumeration_type" => Some(DW_TAG_ENUMERATION_TYPE),
        "enumerator" => Some(DW_TAG_ENUMERATOR),
        "structure_type" => Some(DW_TAG_STRUCTURE_TYPE),
        "typedef" => Some(DW_TAG_TYPEDEF),
        "union_type" => Some(DW_TAG_UNION_TYPE),
        "variable" => Some(DW_TAG_VARIABLE),
        _ => None,
    };
    if let Some(tag) = named {
        return Ok(u64::from(tag));
    }
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let radix = if digits.len() < s.len() { 16 } else { 10 };
    u64::from_str_radix(digits, radix).map_err(|e| format!("unknown tag {s:?}: {e}"))
}

/// One resolved DIE, as printed.
#[derive(Serialize)]
struct Match {
    path: PathBuf,
    cu_offset: u64,
    die_offset: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut index = DwarfIndex::with_paths(HandleFactory, &cli.objects)
        .context("failed to index debug info")?;

    match cli.command {
        Commands::Find { name, tag, json } => {
            let dies = match index.find(&name, tag.unwrap_or(0)) {
                Ok(dies) => dies,
                Err(Error::NotFound(name)) => bail!("{name:?} not found"),
                Err(error) => return Err(error.into()),
            };
            let matches: Vec<Match> = dies
                .into_iter()
                .map(|die| Match {
                    path: die.path,
                    cu_offset: die.cu_offset,
                    die_offset: die.die_offset,
                })
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else {
                for m in &matches {
                    println!(
                        "{}: CU {:#x}, DIE {:#x}",
                        m.path.display(),
                        m.cu_offset,
                        m.die_offset
                    );
                }
            }
        }
        Commands::Files => {
            for path in index.files() {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
