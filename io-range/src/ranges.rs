use std::collections::BTreeMap;

use crate::{Length, Offset};

/// Reorders a parallel range list by ascending offset.
///
/// The list is rebuilt through an ordered map, so duplicate offsets
/// collapse to the last length written for them and the vectors may
/// shrink.
///
/// Panics if the two vectors have different sizes.
pub fn sort(offsets: &mut Vec<Offset>, lengths: &mut Vec<Length>) {
    assert_eq!(
        offsets.len(),
        lengths.len(),
        "range lists must be parallel"
    );

    let mut ordered = BTreeMap::new();
    for (offset, length) in offsets.iter().zip(lengths.iter()) {
        ordered.insert(*offset, *length);
    }

    offsets.clear();
    lengths.clear();
    for (offset, length) in ordered {
        offsets.push(offset);
        lengths.push(length);
    }
}

/// Merges neighbouring ranges that touch exactly, in place.
///
/// Range `i` is folded into the accumulator `j` only when
/// `offsets[j] + lengths[j] == offsets[i]`; ranges separated by a gap are
/// never combined and the list is never reordered. Returns whether
/// anything was merged.
///
/// Panics if the two vectors have different sizes.
pub fn compress(offsets: &mut Vec<Offset>, lengths: &mut Vec<Length>) -> bool {
    assert_eq!(
        offsets.len(),
        lengths.len(),
        "range lists must be parallel"
    );

    if offsets.is_empty() {
        return false;
    }

    let mut tail = 0;
    for i in 1..offsets.len() {
        if offsets[tail] + lengths[tail] == offsets[i] {
            let grown = lengths[i];
            lengths[tail] += grown;
        } else {
            tail += 1;
            let offset = offsets[i];
            let length = lengths[i];
            offsets[tail] = offset;
            lengths[tail] = length;
        }
    }

    let compressed = tail + 1 < offsets.len();
    offsets.truncate(tail + 1);
    lengths.truncate(tail + 1);
    compressed
}

/// Running prefix sum of `lengths` starting at `from`.
///
/// The i-th output is `from` plus the sum of the first i lengths, i.e. the
/// position at which the i-th range begins when the ranges are laid out
/// back to back.
pub fn accumulate(lengths: &[Length], from: Offset) -> Vec<Offset> {
    let mut offsets = Vec::with_capacity(lengths.len());
    let mut at = from;
    for length in lengths {
        offsets.push(at);
        at += *length;
    }
    offsets
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;

    use super::*;

    fn lists(pairs: &[(i64, i64)]) -> (Vec<Offset>, Vec<Length>) {
        let offsets = pairs.iter().map(|(o, _)| Offset(*o)).collect();
        let lengths = pairs.iter().map(|(_, l)| Length(*l)).collect();
        (offsets, lengths)
    }

    #[test]
    fn sort_orders_by_offset() {
        let (mut offsets, mut lengths) = lists(&[(23, 8), (0, 1), (13, 6), (2, 2), (6, 4)]);
        sort(&mut offsets, &mut lengths);

        assert_eq!(
            offsets,
            vec![Offset(0), Offset(2), Offset(6), Offset(13), Offset(23)]
        );
        assert_eq!(
            lengths,
            vec![Length(1), Length(2), Length(4), Length(6), Length(8)]
        );
    }

    #[test]
    fn sort_collapses_duplicate_offsets() {
        let (mut offsets, mut lengths) = lists(&[(5, 10), (0, 1), (5, 3)]);
        sort(&mut offsets, &mut lengths);

        assert_eq!(offsets, vec![Offset(0), Offset(5)]);
        assert_eq!(lengths, vec![Length(1), Length(3)]);
    }

    #[test]
    fn compress_merges_touching_ranges_only() {
        let (mut offsets, mut lengths) = lists(&[(0, 2), (2, 3), (6, 1), (7, 2), (20, 5)]);

        assert!(compress(&mut offsets, &mut lengths));
        assert_eq!(offsets, vec![Offset(0), Offset(6), Offset(20)]);
        assert_eq!(lengths, vec![Length(5), Length(3), Length(5)]);
    }

    #[test]
    fn compress_never_bridges_gaps() {
        let (mut offsets, mut lengths) = lists(&[(0, 1), (2, 2), (6, 4)]);

        assert!(!compress(&mut offsets, &mut lengths));
        assert_eq!(offsets, vec![Offset(0), Offset(2), Offset(6)]);
        assert_eq!(lengths, vec![Length(1), Length(2), Length(4)]);
    }

    #[test]
    fn compress_chains_through_runs() {
        let (mut offsets, mut lengths) = lists(&[(0, 1), (1, 1), (2, 1), (3, 1)]);

        assert!(compress(&mut offsets, &mut lengths));
        assert_eq!(offsets, vec![Offset(0)]);
        assert_eq!(lengths, vec![Length(4)]);
    }

    #[test]
    fn compress_accepts_empty_lists() {
        let mut offsets = Vec::new();
        let mut lengths = Vec::new();
        assert!(!compress(&mut offsets, &mut lengths));
        assert!(offsets.is_empty());
    }

    #[test]
    fn accumulate_prefix_sums() {
        let lengths = vec![Length(1), Length(2), Length(4), Length(6), Length(8)];

        let offsets = accumulate(&lengths, Offset(0));
        assert_eq!(
            offsets,
            vec![Offset(0), Offset(1), Offset(3), Offset(7), Offset(13)]
        );

        let shifted = accumulate(&lengths, Offset(100));
        assert_eq!(shifted[0], Offset(100));
        assert_eq!(shifted[4], Offset(113));
    }

    #[quickcheck]
    fn sorted_compressed_lists_are_fixed_points(pairs: Vec<(u32, u16)>) -> bool {
        let (mut offsets, mut lengths) = lists(
            &pairs
                .iter()
                .map(|(o, l)| (*o as i64, *l as i64))
                .collect::<Vec<_>>(),
        );

        sort(&mut offsets, &mut lengths);
        compress(&mut offsets, &mut lengths);

        let again_offsets = offsets.clone();
        let again_lengths = lengths.clone();
        let mut offsets2 = offsets.clone();
        let mut lengths2 = lengths.clone();
        sort(&mut offsets2, &mut lengths2);
        let merged_again = compress(&mut offsets2, &mut lengths2);

        !merged_again && offsets2 == again_offsets && lengths2 == again_lengths
    }

    #[quickcheck]
    fn compress_preserves_total_length(pairs: Vec<(u32, u16)>) -> bool {
        let (mut offsets, mut lengths) = lists(
            &pairs
                .iter()
                .map(|(o, l)| (*o as i64, *l as i64))
                .collect::<Vec<_>>(),
        );
        sort(&mut offsets, &mut lengths);

        let before: Length = lengths.iter().sum();
        compress(&mut offsets, &mut lengths);
        let after: Length = lengths.iter().sum();

        before == after
    }

    #[quickcheck]
    fn sort_emits_ascending_offsets(pairs: Vec<(u32, u16)>) -> bool {
        let (mut offsets, mut lengths) = lists(
            &pairs
                .iter()
                .map(|(o, l)| (*o as i64, *l as i64))
                .collect::<Vec<_>>(),
        );
        sort(&mut offsets, &mut lengths);

        offsets.windows(2).all(|pair| pair[0] < pair[1])
    }
}
