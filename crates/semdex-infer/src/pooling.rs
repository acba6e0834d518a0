//! Attention-masked mean pooling and output dequantization.

use half::f16;
use ndarray::Array1;

/// Mean-pool one sequence of per-token hidden states.
///
/// `hidden` is row-major `[seq_len, dim]`; positions where `mask` is 0 are
/// excluded from both the sum and the divisor. An all-zero mask yields the
/// zero vector.
pub fn mean_pool(hidden: &[f32], mask: &[i64], dim: usize) -> Array1<f32> {
    let mut pooled = Array1::zeros(dim);
    let mut count = 0f32;

    for (i, &m) in mask.iter().enumerate() {
        if m == 0 {
            continue;
        }
        let offset = i * dim;
        for d in 0..dim {
            pooled[d] += hidden[offset + d];
        }
        count += 1.0;
    }

    if count > 0.0 {
        pooled /= count;
    }
    pooled
}

/// Mean-pool a batch laid out `[batch, seq_len, dim]`.
pub fn mean_pool_batch(
    hidden: &[f32],
    masks: &[Vec<i64>],
    seq_len: usize,
    dim: usize,
) -> Vec<Array1<f32>> {
    masks
        .iter()
        .enumerate()
        .map(|(b, mask)| {
            let row = &hidden[b * seq_len * dim..(b + 1) * seq_len * dim];
            mean_pool(row, mask, dim)
        })
        .collect()
}

/// Widen half-precision hidden states before pooling.
pub fn widen_f16(data: &[f16]) -> Vec<f32> {
    data.iter().map(|&v| v.to_f32()).collect()
}

/// Dequantize uint8 hidden states as `(q − zero_point) · scale` using the
/// per-model quantization parameters.
pub fn dequantize_u8(data: &[u8], scale: f32, zero_point: i32) -> Vec<f32> {
    data.iter()
        .map(|&q| (q as i32 - zero_point) as f32 * scale)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_masked_average() {
        // Two real positions, one padded: [1,2], [3,4] real, [100,100] pad.
        let hidden = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let mask = [1, 1, 0];
        let pooled = mean_pool(&hidden, &mask, 2);
        assert_eq!(pooled.to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_mean_pool_zero_mask_is_zero_vector() {
        let hidden = [5.0, 5.0, 5.0, 5.0];
        let mask = [0, 0];
        let pooled = mean_pool(&hidden, &mask, 2);
        assert_eq!(pooled.to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pool_matches_definition() {
        let hidden = [1.0, 10.0, 2.0, 20.0, 6.0, 60.0];
        let mask = [1, 0, 1];
        let pooled = mean_pool(&hidden, &mask, 2);
        // sum_i mask[i]*hidden[i,d] / sum_i mask[i]
        assert_eq!(pooled.to_vec(), vec![3.5, 35.0]);
    }

    #[test]
    fn test_mean_pool_batch_splits_rows() {
        let hidden = [
            1.0, 1.0, 3.0, 3.0, // item 0
            2.0, 2.0, 9.0, 9.0, // item 1 (second position masked)
        ];
        let masks = vec![vec![1, 1], vec![1, 0]];
        let pooled = mean_pool_batch(&hidden, &masks, 2, 2);
        assert_eq!(pooled[0].to_vec(), vec![2.0, 2.0]);
        assert_eq!(pooled[1].to_vec(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_widen_f16() {
        let data = [f16::from_f32(0.5), f16::from_f32(-2.0)];
        assert_eq!(widen_f16(&data), vec![0.5, -2.0]);
    }

    #[test]
    fn test_dequantize_u8() {
        let data = [128u8, 130, 126];
        let out = dequantize_u8(&data, 0.5, 128);
        assert_eq!(out, vec![0.0, 1.0, -1.0]);
    }
}
