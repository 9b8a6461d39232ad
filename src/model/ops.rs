use ndarray::{Array, Axis, Dimension, RemoveAxis};

/// Non-linéarité squash: ramène chaque vecteur le long de `axis` à une
/// norme ||v||^2 / (1 + ||v||^2), direction inchangée.
///
/// La norme de sortie est strictement dans [0, 1). Le vecteur nul reste
/// le vecteur nul (limite de la formule, la division étant sinon indéfinie).
pub fn squash<D: Dimension>(input: &Array<f32, D>, axis: Axis) -> Array<f32, D> {
    let mut output = input.to_owned();

    for mut lane in output.lanes_mut(axis) {
        // Accumulation en f64: en f32, 1.0 + ||v||^2 sature dès ||v||^2 ~ 1e8
        // et la norme de sortie atteindrait exactement 1
        let squared_norm: f64 = lane.iter().map(|&v| v as f64 * v as f64).sum();

        if squared_norm == 0.0 {
            continue;
        }

        // Plafond strictement sous 1 avec assez de marge pour que l'arrondi
        // f32 du produit ne remonte pas à 1
        let scale = (squared_norm / (1.0 + squared_norm)).min(1.0 - 1e-6);
        let factor = (scale / squared_norm.sqrt()) as f32;
        lane.mapv_inplace(|v| v * factor);
    }

    output
}

/// Softmax le long d'un axe arbitraire, les autres axes restant indépendants.
/// Stabilisé numériquement par soustraction du max de chaque ligne.
pub fn softmax_axis<D: Dimension>(input: &Array<f32, D>, axis: Axis) -> Array<f32, D> {
    let mut output = input.to_owned();

    for mut lane in output.lanes_mut(axis) {
        let max = lane.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0;
        for v in lane.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in lane.iter_mut() {
            *v /= sum;
        }
    }

    output
}

/// Norme euclidienne de chaque vecteur le long de `axis` (l'axe est retiré).
pub fn vector_norm<D>(input: &Array<f32, D>, axis: Axis) -> Array<f32, D::Smaller>
where
    D: Dimension + RemoveAxis,
{
    input.map_axis(axis, |lane| {
        lane.iter().map(|v| v * v).sum::<f32>().sqrt()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2, Array3};

    #[test]
    fn test_squash_norm_below_one() {
        let input = Array2::from_shape_fn((4, 8), |(i, j)| (i * 8 + j) as f32 * 10.0);
        let output = squash(&input, Axis(1));
        let norms = vector_norm(&output, Axis(1));

        for &n in norms.iter() {
            assert!(n < 1.0, "norme {} >= 1", n);
            assert!(n >= 0.0);
        }
    }

    #[test]
    fn test_squash_zero_vector() {
        let input = Array2::<f32>::zeros((2, 8));
        let output = squash(&input, Axis(1));

        for &v in output.iter() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_squash_preserves_direction() {
        let input = arr2(&[[3.0_f32, 4.0]]);
        let output = squash(&input, Axis(1));

        // Même direction: multiple scalaire positif
        let ratio = output[[0, 0]] / input[[0, 0]];
        assert!(ratio > 0.0);
        assert!((output[[0, 1]] / input[[0, 1]] - ratio).abs() < 1e-6);

        // ||v||^2 = 25 -> norme attendue 25/26
        let norm = (output[[0, 0]].powi(2) + output[[0, 1]].powi(2)).sqrt();
        assert!((norm - 25.0 / 26.0).abs() < 1e-5);
    }

    #[test]
    fn test_squash_norm_limits() {
        let small = arr2(&[[1e-4_f32, 0.0]]);
        // ||v||^2 = 1e4 -> norme attendue 1e4/(1e4 + 1), représentable en f32
        let big = arr2(&[[1e2_f32, 0.0]]);

        let n_small = vector_norm(&squash(&small, Axis(1)), Axis(1))[0];
        let n_big = vector_norm(&squash(&big, Axis(1)), Axis(1))[0];

        assert!(n_small < 1e-3);
        assert!(n_big > 0.999 && n_big < 1.0);
    }

    #[test]
    fn test_squash_huge_magnitude_stays_below_one() {
        // Au-delà de la précision f32 du rapport ||v||^2 / (1 + ||v||^2),
        // la norme doit rester strictement sous 1
        for magnitude in [1e4_f32, 1e8, 1e18] {
            let input = arr2(&[[magnitude, 0.0], [magnitude, magnitude]]);
            let norms = vector_norm(&squash(&input, Axis(1)), Axis(1));

            for &n in norms.iter() {
                assert!(n < 1.0, "norme {} >= 1 pour une entrée de {}", n, magnitude);
                assert!(n > 0.99);
            }
        }
    }

    #[test]
    fn test_softmax_sums_to_one_any_axis() {
        let input = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i + 2 * j + 3 * k) as f32);

        for axis in 0..3 {
            let output = softmax_axis(&input, Axis(axis));
            let sums = output.sum_axis(Axis(axis));

            for &s in sums.iter() {
                assert!((s - 1.0).abs() < 1e-5);
            }
            for &v in output.iter() {
                assert!(v > 0.0 && v < 1.0);
            }
        }
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let input = arr2(&[[1000.0_f32, 1001.0, 1002.0]]);
        let output = softmax_axis(&input, Axis(1));

        let sum: f32 = output.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(output.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_vector_norm() {
        let input = arr2(&[[3.0_f32, 4.0], [0.0, 0.0]]);
        let norms = vector_norm(&input, Axis(1));

        assert!((norms[0] - 5.0).abs() < 1e-6);
        assert_eq!(norms[1], 0.0);
    }
}
