//! Browser-free team-name matching: normalize → score → threshold.

use strsim::jaro_winkler;

/// Jaro-Winkler score at which two listing names are considered the same team.
pub const SEARCH_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Minimum combined score for a standings row to be accepted.
pub const STANDINGS_MIN_SCORE: f64 = 0.5;

/// Added to the LCS ratio when one name contains the other.
pub const SUBSTRING_BONUS: f64 = 0.2;

/// Substring checks below this length produce too many false positives ("fc", "ac").
const MIN_SUBSTRING_LEN: usize = 3;

/// Lowercase, fold Latin diacritics, collapse whitespace. Punctuation is kept.
pub fn normalize_name(name: &str) -> String {
    let mut folded = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        fold_char(c, &mut folded);
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `normalize_name` with punctuation replaced by spaces; used for comparisons only.
pub fn comparable(name: &str) -> String {
    let normalized: String = normalize_name(name)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_char(c: char, out: &mut String) {
    // Combining marks left behind by to_lowercase (e.g. 'İ' → "i\u{307}").
    if ('\u{0300}'..='\u{036f}').contains(&c) {
        return;
    }
    let replacement = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' | 'ĉ' | 'ċ' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' | 'ģ' | 'ĝ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ı' | 'ī' | 'į' => "i",
        'ķ' => "k",
        'ł' | 'ľ' | 'ļ' => "l",
        'ñ' | 'ń' | 'ň' | 'ņ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' | 'ŕ' => "r",
        'ś' | 'š' | 'ş' | 'ș' => "s",
        'ß' => "ss",
        'ť' | 'ţ' | 'ț' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => {
            out.push(c);
            return;
        }
    };
    out.push_str(replacement);
}

fn contains_either(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_SUBSTRING_LEN && long.contains(short)
}

/// Listing-row test: exact, substring either way, or Jaro-Winkler above threshold.
pub fn names_match(query: &str, candidate: &str) -> bool {
    let q = comparable(query);
    let c = comparable(candidate);
    if q.is_empty() || c.is_empty() {
        return false;
    }
    q == c || contains_either(&q, &c) || jaro_winkler(&q, &c) >= SEARCH_SIMILARITY_THRESHOLD
}

/// Length of the longest common subsequence of two char sequences.
pub fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// LCS ratio in [0, 1] plus `SUBSTRING_BONUS` when one name contains the other.
pub fn standings_similarity(target: &str, candidate: &str) -> f64 {
    let t = comparable(target);
    let c = comparable(candidate);
    if t.is_empty() || c.is_empty() {
        return 0.0;
    }
    let tc: Vec<char> = t.chars().collect();
    let cc: Vec<char> = c.chars().collect();
    let ratio = 2.0 * lcs_len(&tc, &cc) as f64 / (tc.len() + cc.len()) as f64;
    if contains_either(&t, &c) {
        ratio + SUBSTRING_BONUS
    } else {
        ratio
    }
}

/// Index and score of the best-scoring candidate at or above `STANDINGS_MIN_SCORE`.
/// Exact ties keep the first-listed candidate.
pub fn best_match<'a, I>(target: &str, candidates: I) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        let score = standings_similarity(target, candidate);
        if score < STANDINGS_MIN_SCORE {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}
