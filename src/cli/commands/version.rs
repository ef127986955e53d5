//! Version command implementation.

use crate::error::Result;
use crate::storage::schema::CURRENT_SCHEMA_VERSION;
use crate::sync::SUPPORTED_ENTITIES;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    schema: i32,
    entities: &'a [&'a str],
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let output = VersionOutput {
        version: env!("CARGO_PKG_VERSION"),
        build: if cfg!(debug_assertions) { "dev" } else { "release" },
        schema: CURRENT_SCHEMA_VERSION,
        entities: SUPPORTED_ENTITIES,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "ordersync version {} ({}, schema {}, entities: {})",
            output.version,
            output.build,
            output.schema,
            output.entities.join(", ")
        );
    }
    Ok(())
}
