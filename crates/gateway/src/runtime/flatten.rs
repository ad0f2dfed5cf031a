//! Reduce a backend response to the single string shown to the user.

use ww_domain::content::{GenerateResponse, Part};

/// Reply used when the backend produced no candidate, or a first candidate
/// with no content at all.
pub const EMPTY_REPLY: &str = "<empty>";

const SEPARATOR: &str = ". ";

/// Join the text segments of `parts` in order with `". "`, skipping
/// everything that is not text.  No text segments yields `""`.
pub fn flatten(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(Part::as_text)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// The user-facing reply for `response`, and whether it is the
/// [`EMPTY_REPLY`] sentinel.
///
/// Only the first candidate is considered.  A candidate whose content holds
/// no text segments flattens to `""`, which is a real (if blank) reply and
/// not the sentinel.
pub fn reply_text(response: &GenerateResponse) -> (String, bool) {
    match response.first_candidate().and_then(|c| c.content.as_ref()) {
        Some(content) => (flatten(&content.parts), false),
        None => (EMPTY_REPLY.to_string(), true),
    }
}
