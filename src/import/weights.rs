//! Bone weight quantization and write-status assignment.

use crate::models::vertex_chunk::WeightStatus;
use crate::scene::BoneWeight;

/// Quantize weights to bytes that sum to exactly 255, using largest
/// remainders. Duplicate bones are merged, zero weights dropped, and the
/// result is sorted by bone. Returns an empty list when there is no positive
/// weight at all.
pub fn quantize_weights(weights: &[BoneWeight]) -> Vec<(u32, u8)> {
    let mut merged: Vec<(u32, f32)> = Vec::with_capacity(weights.len());
    for weight in weights {
        let value = weight.weight.max(0.0);
        match merged.iter_mut().find(|(bone, _)| *bone == weight.bone) {
            Some((_, existing)) => *existing += value,
            None => merged.push((weight.bone, value)),
        }
    }
    merged.sort_by_key(|(bone, _)| *bone);

    let total: f32 = merged.iter().map(|(_, w)| w).sum();
    if total.is_nan() || total <= 0.0 {
        return Vec::new();
    }

    let scaled: Vec<f32> = merged.iter().map(|(_, w)| w / total * 255.0).collect();
    let mut bytes: Vec<u32> = scaled.iter().map(|s| s.floor() as u32).collect();
    let assigned: u32 = bytes.iter().sum();

    let mut order: Vec<usize> = (0..scaled.len()).collect();
    // Stable, so ties go to the lower bone.
    order.sort_by(|&a, &b| {
        let fa = scaled[a] - scaled[a].floor();
        let fb = scaled[b] - scaled[b].floor();
        fb.total_cmp(&fa)
    });
    for &i in order.iter().take(255u32.saturating_sub(assigned) as usize) {
        bytes[i] += 1;
    }

    merged
        .iter()
        .zip(bytes)
        .filter(|(_, byte)| *byte > 0)
        .map(|((bone, _), byte)| (*bone, byte.min(255) as u8))
        .collect()
}

/// Status for the `position`-th of `count` contributors, in visit order.
pub fn weight_status(position: usize, count: usize) -> WeightStatus {
    if position == 0 {
        WeightStatus::Start
    } else if position + 1 == count {
        WeightStatus::End
    } else {
        WeightStatus::Middle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(u32, f32)]) -> Vec<BoneWeight> {
        pairs
            .iter()
            .map(|&(bone, weight)| BoneWeight { bone, weight })
            .collect()
    }

    #[test]
    fn bytes_sum_to_255() {
        let quantized = quantize_weights(&weights(&[(2, 1.0 / 3.0), (0, 1.0 / 3.0), (1, 1.0 / 3.0)]));
        assert_eq!(quantized, vec![(0, 85), (1, 85), (2, 85)]);

        let quantized = quantize_weights(&weights(&[(0, 0.5), (1, 0.5)]));
        assert_eq!(quantized.iter().map(|(_, b)| *b as u32).sum::<u32>(), 255);
        assert_eq!(quantized, vec![(0, 128), (1, 127)]);
    }

    #[test]
    fn unnormalized_and_duplicate_weights() {
        let quantized = quantize_weights(&weights(&[(4, 1.0), (4, 1.0), (9, 2.0)]));
        assert_eq!(quantized, vec![(4, 128), (9, 127)]);
    }

    #[test]
    fn tiny_weights_are_dropped() {
        let quantized = quantize_weights(&weights(&[(0, 1.0), (1, 0.0001)]));
        assert_eq!(quantized, vec![(0, 255)]);
        assert!(quantize_weights(&weights(&[(0, 0.0)])).is_empty());
        assert!(quantize_weights(&[]).is_empty());
    }

    #[test]
    fn statuses() {
        assert_eq!(weight_status(0, 1), WeightStatus::Start);
        assert_eq!(weight_status(0, 2), WeightStatus::Start);
        assert_eq!(weight_status(1, 2), WeightStatus::End);
        assert_eq!(weight_status(1, 3), WeightStatus::Middle);
        assert_eq!(weight_status(2, 4), WeightStatus::Middle);
        assert_eq!(weight_status(3, 4), WeightStatus::End);
    }
}
