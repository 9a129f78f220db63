//! Turning captured output lines into one turn snapshot.

/// Marker preceding the score token in interpreter output.
pub const SCORE_MARKER: &str = "Score: ";

/// Join captured lines into one snapshot, trimming each line and preserving order.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|line| line.as_ref().trim())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the score from the first `Score: ` marker in `text`.
///
/// Only the first marker is considered: if the token after it is missing or
/// not an integer, the result is `None` even when a later marker is well formed.
pub fn extract_score(text: &str) -> Option<i64> {
    let (_, rest) = text.split_once(SCORE_MARKER)?;
    rest.split_whitespace().next()?.parse().ok()
}
