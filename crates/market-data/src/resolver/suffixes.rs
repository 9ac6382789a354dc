//! Canadian exchange suffix whitelist.

/// Exchange suffixes that mark a symbol as Canadian-listed:
/// TSX, TSX Venture, CSE, and NEO.
pub const CANADIAN_SUFFIXES: [&str; 4] = [".TO", ".V", ".CN", ".NE"];

/// Returns the Canadian exchange suffix of `symbol`, if it carries one.
///
/// Only the whitelisted suffixes count; a dot elsewhere in the symbol
/// (share classes like `BRK.B`) is not a market suffix.
pub fn canadian_suffix(symbol: &str) -> Option<&'static str> {
    CANADIAN_SUFFIXES
        .iter()
        .find(|suffix| symbol.len() > suffix.len() && symbol.ends_with(*suffix))
        .copied()
}

/// Splits `symbol` into base and suffix when a whitelisted suffix is present.
pub fn canonical_split(symbol: &str) -> Option<(&str, &'static str)> {
    let suffix = canadian_suffix(symbol)?;
    Some((&symbol[..symbol.len() - suffix.len()], suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelisted_suffixes_detected() {
        assert_eq!(canadian_suffix("SHOP.TO"), Some(".TO"));
        assert_eq!(canadian_suffix("WEED.V"), Some(".V"));
        assert_eq!(canadian_suffix("TRUL.CN"), Some(".CN"));
        assert_eq!(canadian_suffix("CTS.NE"), Some(".NE"));
    }

    #[test]
    fn test_share_class_dot_is_not_a_suffix() {
        assert_eq!(canadian_suffix("BRK.B"), None);
        assert_eq!(canonical_split("BRK.B"), None);
    }

    #[test]
    fn test_bare_and_degenerate_symbols() {
        assert_eq!(canadian_suffix("AAPL"), None);
        // A suffix with no base is not a suffixed symbol.
        assert_eq!(canadian_suffix(".TO"), None);
    }

    #[test]
    fn test_split_returns_base_and_suffix() {
        assert_eq!(canonical_split("SHOP.TO"), Some(("SHOP", ".TO")));
        assert_eq!(canonical_split("WEED.V"), Some(("WEED", ".V")));
    }
}
