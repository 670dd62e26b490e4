//! Differentiable losses and the read-time normalization they share.
//!
//! All functions build candle graph nodes, so gradients flow back to
//! whatever `Var`s produced their inputs.

use candle_core::{DType, Device, Tensor};

use crate::Result;

// Floor on row norms so zero rows do not divide by zero.
const NORM_EPS: f64 = 1e-12;

/// Rows of `x` (shape `[n, d]`) rescaled to unit L2 norm.
pub fn unit_rows(x: &Tensor) -> Result<Tensor> {
    let norms = x.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(NORM_EPS)?;
    Ok(x.broadcast_div(&norms)?)
}

/// Column indices `[n, n-1]` that skip the diagonal of an `n x n` matrix.
pub fn off_diagonal_indices(n: usize, device: &Device) -> Result<Tensor> {
    let mut idx = Vec::with_capacity(n * n.saturating_sub(1));
    for row in 0..n {
        idx.extend((0..n).filter(|&col| col != row).map(|col| col as u32));
    }
    Ok(Tensor::from_vec(idx, (n, n.saturating_sub(1)), device)?)
}

/// Target column for each of the `2b` rows once the diagonal is dropped.
///
/// Anchor `i` pairs with column `b + i`, which sits past the removed
/// self-column and so shifts left to `b + i - 1`. Positive `b + i` pairs with
/// column `i`, which precedes its self-column and keeps its index.
pub fn contrastive_labels(b: usize) -> Vec<u32> {
    (0..b)
        .map(|i| (b + i - 1) as u32)
        .chain((0..b).map(|i| i as u32))
        .collect()
}

/// In-batch InfoNCE over `b` anchor/positive pairs.
///
/// Both inputs are `[b, d]`. Rows are L2-normalized, stacked into `[2b, d]`,
/// compared pairwise, the self-similarity diagonal is removed, logits are
/// divided by `temperature`, and cross-entropy picks each row's partner.
pub fn info_nce_loss(anchors: &Tensor, positives: &Tensor, temperature: f64) -> Result<Tensor> {
    let b = anchors.dim(0)?;
    if positives.dim(0)? != b {
        return Err(spherix_core::Error::shape("positive batch", b, positives.dim(0)?).into());
    }
    if b == 0 {
        return Err(spherix_core::Error::shape("contrastive batch", 1, 0).into());
    }
    let device = anchors.device();

    let z = Tensor::cat(&[&unit_rows(anchors)?, &unit_rows(positives)?], 0)?;
    let sim = z.matmul(&z.t()?)?;

    let keep = off_diagonal_indices(2 * b, device)?;
    let logits = sim.gather(&keep, 1)?.affine(1.0 / temperature, 0.0)?;

    let labels = Tensor::from_vec(contrastive_labels(b), 2 * b, device)?;
    Ok(candle_nn::loss::cross_entropy(&logits, &labels)?)
}

/// Mean binary cross-entropy on raw logits.
///
/// Uses `max(x, 0) - x * y + ln(1 + e^{-|x|})`, which stays finite for large
/// `|x|`.
pub fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let targets = targets.to_dtype(logits.dtype())?;
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let loss = ((logits.relu()? - (logits * &targets)?)? + softplus)?;
    Ok(loss.mean_all()?)
}

/// Scalar value of a rank-0 loss tensor.
pub fn scalar(loss: &Tensor) -> Result<f32> {
    Ok(loss.to_dtype(DType::F32)?.to_scalar::<f32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_info_nce(a: &[Vec<f32>], p: &[Vec<f32>], tau: f32) -> f32 {
        let unit = |v: &Vec<f32>| {
            let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.iter().map(|x| x / n).collect::<Vec<f32>>()
        };
        let z: Vec<Vec<f32>> = a.iter().chain(p.iter()).map(unit).collect();
        let b = a.len();
        let mut total = 0.0;
        for i in 0..2 * b {
            let partner = if i < b { i + b } else { i - b };
            let logits: Vec<(usize, f32)> = (0..2 * b)
                .filter(|&j| j != i)
                .map(|j| (j, z[i].iter().zip(&z[j]).map(|(x, y)| x * y).sum::<f32>() / tau))
                .collect();
            let lse = logits.iter().map(|(_, l)| l.exp()).sum::<f32>().ln();
            let target = logits.iter().find(|(j, _)| *j == partner).unwrap().1;
            total += lse - target;
        }
        total / (2 * b) as f32
    }

    #[test]
    fn test_contrastive_labels() {
        assert_eq!(contrastive_labels(3), vec![2, 3, 4, 0, 1, 2]);
        assert_eq!(contrastive_labels(1), vec![0, 0]);
    }

    #[test]
    fn test_off_diagonal_indices() {
        let idx = off_diagonal_indices(3, &Device::Cpu).unwrap();
        assert_eq!(
            idx.to_vec2::<u32>().unwrap(),
            vec![vec![1, 2], vec![0, 2], vec![0, 1]]
        );
    }

    #[test]
    fn test_unit_rows() {
        let x = Tensor::new(&[[3f32, 4.0], [0.0, 0.5]], &Device::Cpu).unwrap();
        let u = unit_rows(&x).unwrap().to_vec2::<f32>().unwrap();
        assert!((u[0][0] - 0.6).abs() < 1e-6);
        assert!((u[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_info_nce_matches_reference() {
        let a = vec![vec![1.0f32, 0.2, -0.3], vec![-0.5, 1.0, 0.1], vec![0.3, -0.2, 0.9]];
        let p = vec![vec![0.9f32, 0.1, -0.2], vec![-0.4, 0.8, 0.3], vec![0.1, 0.0, 1.0]];
        let dev = Device::Cpu;
        let at = Tensor::from_vec(a.concat(), (3, 3), &dev).unwrap();
        let pt = Tensor::from_vec(p.concat(), (3, 3), &dev).unwrap();
        let loss = scalar(&info_nce_loss(&at, &pt, 0.07).unwrap()).unwrap();
        let expected = reference_info_nce(&a, &p, 0.07);
        assert!((loss - expected).abs() < 1e-3, "{} vs {}", loss, expected);
        assert!(loss >= 0.0);
    }

    #[test]
    fn test_info_nce_single_pair_is_zero() {
        let dev = Device::Cpu;
        let a = Tensor::new(&[[1f32, 2.0]], &dev).unwrap();
        let p = Tensor::new(&[[-3f32, 0.5]], &dev).unwrap();
        let loss = scalar(&info_nce_loss(&a, &p, 0.07).unwrap()).unwrap();
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn test_bce_with_logits() {
        let dev = Device::Cpu;
        let logits = Tensor::new(&[0f32, 10.0, -10.0, 40.0], &dev).unwrap();
        let targets = Tensor::new(&[1f32, 1.0, 0.0, 0.0], &dev).unwrap();
        let loss = scalar(&bce_with_logits(&logits, &targets).unwrap()).unwrap();
        // ln2, ~4.5e-5, ~4.5e-5, 40
        let expected = (std::f32::consts::LN_2 + 2.0 * 4.54e-5 + 40.0) / 4.0;
        assert!((loss - expected).abs() < 1e-3, "{}", loss);
    }
}
