// Lexicon-weighted emotional intensity heuristic
//
// score = 3 × (distress/urgency hits) + 1.5 × (medium hits)
//       + 2 × (('!' + '?') / word count), clamped to [0, 10]

/// Upper bound of the intensity scale
pub const MAX_INTENSITY: f32 = 10.0;

const HIGH_WEIGHT: f32 = 3.0;
const MEDIUM_WEIGHT: f32 = 1.5;
const PUNCTUATION_WEIGHT: f32 = 2.0;

/// Distress and urgency terms
const HIGH_TERMS: &[&str] = &[
    "hate",
    "help",
    "panic",
    "panicking",
    "hopeless",
    "worthless",
    "suicide",
    "suicidal",
    "die",
    "dying",
    "kill",
    "terrified",
    "desperate",
    "emergency",
    "crisis",
    "unbearable",
    "can't take",
    "give up",
    "end it",
];

/// Negative-affect terms
const MEDIUM_TERMS: &[&str] = &[
    "sad",
    "angry",
    "anxious",
    "anxiety",
    "stressed",
    "stress",
    "worried",
    "upset",
    "lonely",
    "alone",
    "tired",
    "exhausted",
    "scared",
    "afraid",
    "frustrated",
    "hurt",
    "overwhelmed",
    "cry",
    "crying",
    "please",
];

/// Deterministic emotional intensity score in [0, 10]
pub fn score_intensity(text: &str) -> f32 {
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let high = count_terms(&words, HIGH_TERMS) as f32;
    let medium = count_terms(&words, MEDIUM_TERMS) as f32;

    let marks = text.chars().filter(|c| matches!(c, '!' | '?')).count() as f32;
    let punctuation = marks / words.len() as f32 * PUNCTUATION_WEIGHT;

    (high * HIGH_WEIGHT + medium * MEDIUM_WEIGHT + punctuation).clamp(0.0, MAX_INTENSITY)
}

/// Lowercase, keep letters/digits/apostrophes, everything else becomes a space
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            let c = if c == '\u{2019}' { '\'' } else { c };
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect()
}

/// Whole-word (or whole-phrase) occurrences of any term
fn count_terms(words: &[&str], terms: &[&str]) -> usize {
    terms
        .iter()
        .map(|term| {
            let parts: Vec<&str> = term.split(' ').collect();
            words
                .windows(parts.len())
                .filter(|window| *window == parts.as_slice())
                .count()
        })
        .sum()
}
