//! Longest common subsequence of two byte strings.
//!
//! Reference: <https://en.wikipedia.org/wiki/Longest_common_subsequence>

/// `lcs(a, b)` returns the longest common subsequence between `a` and `b`. Matching bytes do not
/// need to be contiguous.
pub fn lcs(a: &[u8], b: &[u8]) -> Vec<u8> {
    let (na, nb) = (a.len(), b.len());

    // table[i][j] is the length of the longest common subsequence of a[..i] and b[..j].
    let mut table = vec![vec![0usize; nb + 1]; na + 1];

    for i in 1..=na {
        for j in 1..=nb {
            table[i][j] = if a[i - 1] == b[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    // Walk back from the bottom right corner.
    let mut result = Vec::with_capacity(table[na][nb]);
    let (mut i, mut j) = (na, nb);
    while i > 0 && j > 0 {
        if a[i - 1] == b[j - 1] {
            result.push(a[i - 1]);
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] >= table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    result.reverse();
    result
}
