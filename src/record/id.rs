/// Renders a numeric ID as a fixed-width zero-padded string
///
/// IDs wider than `width` are rendered in full rather than truncated.
pub fn format_id(id: u64, width: usize) -> String {
    format!("{:0width$}", id, width = width)
}

/// Parses a zero-padded ID back into its numeric value
///
/// Returns None for anything that is not a plain run of ASCII digits.
pub fn parse_id(id: &str) -> Option<u64> {
    let id = id.trim();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}
