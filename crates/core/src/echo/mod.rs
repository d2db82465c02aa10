//! Rejects transcript fragments that are the avatar's own speech picked up
//! again by the microphone.

use strsim::normalized_levenshtein;

/// `(max_len - edit_distance) / max_len` over the trimmed, lowercased inputs.
///
/// Lengths count chars, not bytes. Two empty strings are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    normalized_levenshtein(&a, &b) as f32
}

/// True when `fragment` is more than `threshold` similar to any recent avatar line.
pub fn is_echo<'a, I>(fragment: &str, recent_avatar_lines: I, threshold: f32) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    recent_avatar_lines.into_iter().any(|line| {
        let score = similarity(fragment, line);
        if score > threshold {
            tracing::debug!(score, line, "fragment matches recent avatar speech");
            true
        } else {
            false
        }
    })
}
