use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rayon::prelude::*;

use super::config::Activation;
use super::layers::ConvLayer;
use super::ops::squash;
use super::routing::DynamicRouting;

/// Couche de capsules primaires (variante convolutive, sans routage).
///
/// K convolutions indépendantes produisent K cartes; chaque carte aplatie
/// donne une coordonnée des vecteurs de capsules, concaténées sur un axe
/// terminal puis écrasées par squash. Sortie [batch, N, K] avec
/// N = canaux x hauteur x largeur de la carte.
pub struct PrimaryCapsLayer {
    pub conv_layers: Vec<ConvLayer>,
    pub num_capsules: usize,
}

impl PrimaryCapsLayer {
    pub fn new(
        in_channels: usize,
        num_capsules: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        let conv_layers = (0..num_capsules)
            .map(|_| {
                ConvLayer::new(
                    in_channels,
                    out_channels,
                    kernel_size,
                    stride,
                    padding,
                    Activation::None,
                )
            })
            .collect();

        Self {
            conv_layers,
            num_capsules,
        }
    }

    pub fn forward(&self, input: &ArrayView4<f32>) -> Array3<f32> {
        let batch_size = input.dim().0;

        // Les K convolutions sont indépendantes
        let maps: Vec<Array4<f32>> = self
            .conv_layers
            .par_iter()
            .map(|conv| conv.forward(input))
            .collect();

        let (_, channels, height, width) = maps[0].dim();
        let num_nodes = channels * height * width;

        let mut capsules = Array3::zeros((batch_size, num_nodes, self.num_capsules));
        for (k, map) in maps.iter().enumerate() {
            for b in 0..batch_size {
                let mut node = 0;
                for c in 0..channels {
                    for h in 0..height {
                        for w in 0..width {
                            capsules[[b, node, k]] = map[[b, c, h, w]];
                            node += 1;
                        }
                    }
                }
            }
        }

        squash(&capsules, Axis(2))
    }
}

/// Couche de capsules avec routage (capsules de classe).
///
/// Chaque noeud d'entrée n prédit chaque capsule de sortie m au travers
/// d'une transformation apprise [D_in x D_out]; le routage dynamique
/// arbitre ensuite entre les prédictions.
pub struct DigitCapsLayer {
    pub routing: DynamicRouting,
    pub num_capsules: usize,
    pub num_route_nodes: usize,
    pub in_dim: usize,
    pub out_dim: usize,
    /// [M, N, D_in, D_out]
    pub route_weights: Array4<f32>,
}

impl DigitCapsLayer {
    pub fn new(
        num_capsules: usize,
        num_route_nodes: usize,
        in_dim: usize,
        out_dim: usize,
        routing_iterations: usize,
    ) -> Self {
        let route_weights = Array4::random(
            (num_capsules, num_route_nodes, in_dim, out_dim),
            Normal::new(0.0, 1.0).expect("écart-type invalide"),
        );

        Self {
            routing: DynamicRouting::new(routing_iterations),
            num_capsules,
            num_route_nodes,
            in_dim,
            out_dim,
            route_weights,
        }
    }

    /// [batch, N, D_in] -> [batch, M, D_out]
    pub fn forward(&self, input: &ArrayView3<f32>) -> Array3<f32> {
        let (batch_size, num_nodes, in_dim) = input.dim();

        assert_eq!(
            num_nodes, self.num_route_nodes,
            "{} noeuds de routage reçus, {} attendus",
            num_nodes, self.num_route_nodes
        );
        assert_eq!(
            in_dim, self.in_dim,
            "dimension de capsule {} reçue, {} attendue",
            in_dim, self.in_dim
        );

        // Prédictions u_mn = x_n . W_mn, recalculées à chaque appel
        let mut priors = Array4::zeros((batch_size, self.num_capsules, num_nodes, self.out_dim));

        priors
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut priors_batch)| {
                for m in 0..self.num_capsules {
                    for n in 0..num_nodes {
                        for k in 0..self.out_dim {
                            let mut sum = 0.0;
                            for j in 0..self.in_dim {
                                sum += input[[b, n, j]] * self.route_weights[[m, n, j, k]];
                            }
                            priors_batch[[m, n, k]] = sum;
                        }
                    }
                }
            });

        self.routing.route(&priors.view())
    }
}
