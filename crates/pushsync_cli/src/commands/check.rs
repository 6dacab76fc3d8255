//! Check command implementation.

use crate::fixture::Fixture;
use std::path::Path;
use tracing::{info, warn};

/// Validates the fixture at `path` and prints a summary.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Checking fixture {:?}", path);

    let fixture = Fixture::load(path)?;

    println!("Fixture");
    println!("=======");
    match &fixture.identity {
        Some(identity) => println!("  Identity: {}", identity.label()),
        None => println!("  Identity: (none)"),
    }
    println!("  Targets: {}", fixture.nodes.len());
    println!("  Channels: {}", fixture.channels.len());
    println!(
        "  Scripted cycles: {}",
        fixture.cycles.values().map(Vec::len).sum::<usize>()
    );

    let warnings = fixture.warnings();
    if warnings.is_empty() {
        println!("\n✓ Fixture looks consistent");
    } else {
        println!("\nWarnings:");
        for warning in &warnings {
            warn!("{}", warning);
            println!("  - {}", warning);
        }
    }

    Ok(())
}
