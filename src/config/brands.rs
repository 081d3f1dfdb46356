//! Brand allow-list loading
//!
//! The allow-list is a plain text file with one brand id per line. Lines
//! starting with `#` are comments, inline `#` comments are stripped, and a
//! single line may carry several ids separated by `;` or `,`.

use crate::ConfigError;
use std::collections::BTreeSet;
use std::path::Path;

/// Loads brand ids from the allow-list file
///
/// Returns the ids sorted and de-duplicated. Tokens that are not numeric are
/// skipped with a warning rather than failing the whole file.
pub fn load_brand_ids(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Brands {
        path: path.display().to_string(),
        source,
    })?;

    Ok(parse_brand_ids(&content))
}

/// Parses allow-list content into sorted, unique brand ids
pub fn parse_brand_ids(content: &str) -> Vec<String> {
    let mut ids = BTreeSet::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.split('#').next().unwrap_or_default();

        for token in line.split([';', ',']) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            match token.parse::<u64>() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(_) => tracing::warn!("Ignoring invalid brand id: {}", token),
            }
        }
    }

    ids.into_iter().map(|id| id.to_string()).collect()
}
