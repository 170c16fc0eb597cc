//! Admin Boundaries Example
//!
//! Builds (or reuses) the offset index of an OSM PBF file, then loads every
//! `boundary=administrative` relation together with the relations it contains.
//!
//! Run with:
//! ```bash
//! cargo run --release --package nightwatch-pbf --example admin_boundaries -- planet.osm.pbf
//! ```

use nightwatch_core::{ElementFilter, ElementKind};
use nightwatch_pbf::{IndexBuilder, IndexConfig, RelationLoader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: admin_boundaries <file.osm.pbf>")?;

    let config = IndexConfig::default();
    let index = IndexBuilder::new(config.clone()).build(&path).await?;
    for kind in ElementKind::ALL {
        println!("{}: {} blobs", kind, index.table(kind).len());
    }

    let filters = [ElementFilter::new(ElementKind::Relation)
        .with_values("boundary", ["administrative"])];
    let relations = RelationLoader::new(&index, config).load(&filters).await?;

    let members: usize = relations.values().map(|r| r.members.len()).sum();
    println!(
        "{} relations loaded ({} members)",
        relations.len(),
        members
    );
    Ok(())
}
