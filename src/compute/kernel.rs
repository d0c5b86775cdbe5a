//! Elementwise arithmetic on float columns, four lanes at a time.

use wide::f64x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Max,
    Min,
}

#[inline(always)]
fn lanes(op: Op, a: f64x4, b: f64x4) -> f64x4 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Max => a.max(b),
        Op::Min => a.min(b),
    }
}

#[inline(always)]
fn single(op: Op, a: f64, b: f64) -> f64 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Max => a.max(b),
        Op::Min => a.min(b),
    }
}

#[inline(always)]
fn load(chunk: &[f64]) -> f64x4 {
    f64x4::from([chunk[0], chunk[1], chunk[2], chunk[3]])
}

/// `a[i] op b[i]`. Both columns belong to the same entity, so their lengths
/// agree; only the common prefix is computed otherwise.
pub fn apply(op: Op, a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len(), "Columns of one entity must have equal length");
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);
    let mut out = Vec::with_capacity(len);

    let mut ca = a.chunks_exact(4);
    let mut cb = b.chunks_exact(4);
    for (x, y) in ca.by_ref().zip(cb.by_ref()) {
        out.extend_from_slice(&lanes(op, load(x), load(y)).to_array());
    }
    out.extend(ca.remainder().iter().zip(cb.remainder()).map(|(&x, &y)| single(op, x, y)));
    out
}

/// `a[i] op s`.
pub fn apply_scalar(op: Op, a: &[f64], s: f64) -> Vec<f64> {
    let splat = f64x4::splat(s);
    let mut out = Vec::with_capacity(a.len());

    let mut chunks = a.chunks_exact(4);
    for x in chunks.by_ref() {
        out.extend_from_slice(&lanes(op, load(x), splat).to_array());
    }
    out.extend(chunks.remainder().iter().map(|&x| single(op, x, s)));
    out
}

/// Sum of several aligned columns. An empty list yields an empty column.
pub fn sum(columns: &[&[f64]]) -> Vec<f64> {
    match columns.split_first() {
        None => Vec::new(),
        Some((first, rest)) => rest.iter().fold(first.to_vec(), |acc, c| apply(Op::Add, &acc, c)),
    }
}

/// `max(a[i], 0)`.
#[inline]
pub fn positive_part(a: &[f64]) -> Vec<f64> { apply_scalar(Op::Max, a, 0.0) }

/// 1.0 where the flag is set, 0.0 elsewhere.
pub fn indicator(flags: &[bool]) -> Vec<f64> {
    flags.iter().map(|&f| if f { 1.0 } else { 0.0 }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // Seven elements: one full lane group plus a remainder of three.
    const A: [f64; 7] = [1.0, -2.0, 3.0, -4.0, 5.0, -6.0, 7.0];
    const B: [f64; 7] = [0.5; 7];

    #[rstest]
    #[case(Op::Add)]
    #[case(Op::Sub)]
    #[case(Op::Mul)]
    #[case(Op::Max)]
    #[case(Op::Min)]
    fn test_lanes_match_scalar_path(#[case] op: Op) {
        let expected: Vec<f64> = A.iter().zip(&B).map(|(&x, &y)| single(op, x, y)).collect();
        assert_eq!(apply(op, &A, &B), expected);
        assert_eq!(apply_scalar(op, &A, 0.5), expected);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(positive_part(&A), vec![1.0, 0.0, 3.0, 0.0, 5.0, 0.0, 7.0]);
        assert_eq!(sum(&[&A, &B, &B]), A.iter().map(|x| x + 1.0).collect::<Vec<_>>());
        assert!(sum(&[]).is_empty());
        assert_eq!(indicator(&[true, false]), vec![1.0, 0.0]);
    }
}
