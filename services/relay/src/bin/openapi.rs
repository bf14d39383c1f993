//! services/relay/src/bin/openapi.rs
//!
//! Writes the relay's OpenAPI document (message feed and transcript routes) so
//! client code can be generated without starting the relay. The output path
//! defaults to `openapi.json` and can be given as the first argument.

use relay_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    let document = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(&path, document)?;
    println!("Relay API document written to {}", path);
    Ok(())
}
