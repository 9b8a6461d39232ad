use ndarray::{Array3, ArrayView3, ArrayView4, Axis};
use rayon::prelude::*;

use super::ops::{softmax_axis, squash};

/// Routage dynamique par accord (routing-by-agreement).
///
/// Les logits de routage sont un accumulateur local à chaque appel,
/// remis à zéro à l'entrée: ce ne sont pas des paramètres appris.
pub struct DynamicRouting {
    pub num_iterations: usize,
}

impl DynamicRouting {
    pub fn new(num_iterations: usize) -> Self {
        assert!(num_iterations >= 1, "le routage exige au moins une itération");
        Self { num_iterations }
    }

    /// Route les prédictions [batch, M, N, D] vers les capsules de sortie
    /// [batch, M, D]. M capsules de sortie, N noeuds de routage.
    pub fn route(&self, priors: &ArrayView4<f32>) -> Array3<f32> {
        self.route_with_coeffs(priors).0
    }

    /// Variante retournant aussi les coefficients de couplage finaux
    /// [batch, M, N].
    pub fn route_with_coeffs(&self, priors: &ArrayView4<f32>) -> (Array3<f32>, Array3<f32>) {
        let (batch_size, num_capsules, num_nodes, _dim) = priors.dim();

        let mut logits = Array3::<f32>::zeros((batch_size, num_capsules, num_nodes));

        // Logits nuls -> couplage uniforme sur les noeuds de routage
        let mut coupling = softmax_axis(&logits, Axis(2));
        let mut outputs = self.weighted_squash(priors, &coupling.view());

        for _ in 1..self.num_iterations {
            self.accumulate_agreement(priors, &outputs.view(), &mut logits);

            // Normalisation le long de l'axe des noeuds de routage, par
            // capsule de sortie: distribution sur les noeuds, pas sur les
            // capsules. C'est le comportement de référence, à ne pas
            // inverser.
            coupling = softmax_axis(&logits, Axis(2));
            outputs = self.weighted_squash(priors, &coupling.view());
        }

        (outputs, coupling)
    }

    /// s_j = somme_n c_jn * u_jn, puis v_j = squash(s_j).
    fn weighted_squash(
        &self,
        priors: &ArrayView4<f32>,
        coupling: &ArrayView3<f32>,
    ) -> Array3<f32> {
        let (batch_size, num_capsules, num_nodes, dim) = priors.dim();
        let mut weighted = Array3::zeros((batch_size, num_capsules, dim));

        weighted
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut weighted_batch)| {
                for m in 0..num_capsules {
                    for d in 0..dim {
                        let mut sum = 0.0;
                        for n in 0..num_nodes {
                            sum += coupling[[b, m, n]] * priors[[b, m, n, d]];
                        }
                        weighted_batch[[m, d]] = sum;
                    }
                }
            });

        squash(&weighted, Axis(2))
    }

    /// b_jn += u_jn . v_j — accord cumulé, jamais écrasé.
    fn accumulate_agreement(
        &self,
        priors: &ArrayView4<f32>,
        outputs: &ArrayView3<f32>,
        logits: &mut Array3<f32>,
    ) {
        let (_, num_capsules, num_nodes, dim) = priors.dim();

        logits
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut logits_batch)| {
                for m in 0..num_capsules {
                    for n in 0..num_nodes {
                        let mut agreement = 0.0;
                        for d in 0..dim {
                            agreement += priors[[b, m, n, d]] * outputs[[b, m, d]];
                        }
                        logits_batch[[m, n]] += agreement;
                    }
                }
            });
    }
}
