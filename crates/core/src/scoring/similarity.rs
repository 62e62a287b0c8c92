use std::collections::HashSet;

/// Jaccard overlap of padded character trigrams, including the ones spanning
/// word boundaries.
pub fn trigram_similarity(left: &str, right: &str) -> f64 {
    if left == right {
        return 1.0;
    }
    let left = trigrams(left);
    let right = trigrams(right);
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        return HashSet::new();
    }
    let padded: Vec<char> = format!("  {trimmed} ").chars().collect();
    padded.windows(3).map(|window| [window[0], window[1], window[2]]).collect()
}
