//! `detect` command: show how a local file would be read without loading it.

use anyhow::{Context, Result};
use log::info;

use crate::{cli::DetectArgs, io_utils, loader, schema::CanonicalField};

pub fn execute(args: &DetectArgs) -> Result<()> {
    let source = io_utils::open_file(&args.input)?;
    let (profile, binding) = loader::inspect(source, args.sample_bytes)
        .with_context(|| format!("Inspecting {:?}", args.input))?;

    println!("encoding: {}", profile.encoding.name());
    println!("delimiter: {}", io_utils::printable_delimiter(profile.delimiter));
    println!("bound columns:");
    for column in binding.columns() {
        println!("  {} <- {}", column.field.column_name(), column.source);
    }
    let unbound = CanonicalField::ALL
        .iter()
        .filter(|field| binding.source_for(**field).is_none())
        .map(|field| field.column_name())
        .collect::<Vec<_>>();
    if !unbound.is_empty() {
        println!("unbound: {}", unbound.join(", "));
    }
    info!(
        "{} of {} canonical column(s) bound for {:?}",
        binding.len(),
        CanonicalField::ALL.len(),
        args.input
    );
    Ok(())
}
