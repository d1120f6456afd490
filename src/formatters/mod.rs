//! Output formatters for search results: `terse` (default), `verbose`, `mcp`.
mod mcp;
mod terse;
mod verbose;

use crate::error::{ConfigurationError, GitCtxError};
use crate::store::SearchHit;

/// Formats a batch of search hits into the string printed to stdout.
pub trait Formatter {
    fn name(&self) -> &'static str;
    fn format(&self, hits: &[SearchHit]) -> String;
}

/// Looks up a formatter by name, listing the available names on a miss.
pub fn get_formatter(name: &str) -> Result<Box<dyn Formatter>, GitCtxError> {
    match name {
        "terse" => Ok(Box::new(terse::TerseFormatter)),
        "verbose" => Ok(Box::new(verbose::VerboseFormatter)),
        "mcp" => Ok(Box::new(mcp::McpFormatter)),
        other => Err(ConfigurationError::InvalidValue {
            key: "format".to_string(),
            reason: format!(
                "unknown formatter \"{other}\". Available: mcp, terse, verbose"
            ),
        }
        .into()),
    }
}

/// Whether the current terminal is assumed capable of rendering the filled
/// bullet `●` HEAD marker. Mirrors `rich.console.Console.legacy_windows`:
/// anything that isn't explicitly UTF-8 locale falls back to ASCII.
fn unicode_capable() -> bool {
    std::env::var("LANG")
        .or_else(|_| std::env::var("LC_ALL"))
        .map(|v| v.to_uppercase().contains("UTF-8") || v.to_uppercase().contains("UTF8"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_formatter_lists_available_names() {
        let err = get_formatter("yaml").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("terse"));
        assert!(message.contains("verbose"));
        assert!(message.contains("mcp"));
    }

    #[test]
    fn known_formatters_resolve() {
        assert_eq!(get_formatter("terse").unwrap().name(), "terse");
        assert_eq!(get_formatter("verbose").unwrap().name(), "verbose");
        assert_eq!(get_formatter("mcp").unwrap().name(), "mcp");
    }
}
