pub mod board;
pub mod fixture;

use std::sync::Arc;

use jobhound_core::traits::Source;

pub use board::{BoardProfile, BoardSource, GLASSDOOR, INDEED, LINKEDIN};
pub use fixture::FixtureSource;

/// Names accepted by [`source_by_name`], in registration order.
pub const BUILTIN_SOURCES: &[&str] = &["indeed", "linkedin", "glassdoor"];

/// Look up a built-in board by name (case-insensitive).
pub fn source_by_name(name: &str) -> Option<Arc<dyn Source>> {
    let board = match name.trim().to_lowercase().as_str() {
        "indeed" => BoardSource::indeed(),
        "linkedin" => BoardSource::linkedin(),
        "glassdoor" => BoardSource::glassdoor(),
        _ => return None,
    };
    Some(Arc::new(board))
}

/// Every built-in board.
pub fn builtin_sources() -> Vec<Arc<dyn Source>> {
    BUILTIN_SOURCES
        .iter()
        .filter_map(|name| source_by_name(name))
        .collect()
}
