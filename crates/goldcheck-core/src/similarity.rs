//! String similarity used to pair models with data files.

/// Scores how alike two strings are, from `0.0` (nothing shared) to `1.0`.
pub trait SimilarityStrategy: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// `2 * lcs(a, b) / (|a| + |b|)` over chars, where `lcs` is the length of
/// the longest common subsequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct LcsRatio;

impl SimilarityStrategy for LcsRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * lcs_len(&a, &b) as f64 / total as f64
    }
}

/// Length of the longest common subsequence, two rolling DP rows.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
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
