use ndarray::{Array2, ArrayView2};

use super::config::Activation;
use super::layers::DenseLayer;

/// Décodeur de reconstruction: perceptron multicouche ramenant le vecteur
/// de la capsule la plus active vers une image aplatie dans [0, 1].
pub struct Decoder {
    pub layers: Vec<DenseLayer>,
}

impl Decoder {
    pub fn new(in_dim: usize, hidden: &[usize], out_dim: usize) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut prev = in_dim;

        for &h in hidden {
            layers.push(DenseLayer::new(prev, h, Activation::ReLU));
            prev = h;
        }
        // Sortie sigmoïde: valeurs de pixels bornées
        layers.push(DenseLayer::new(prev, out_dim, Activation::Sigmoid));

        Self { layers }
    }

    pub fn forward(&self, input: &ArrayView2<f32>) -> Array2<f32> {
        let mut output = input.to_owned();
        for layer in &self.layers {
            output = layer.forward(&output.view());
        }
        output
    }
}
