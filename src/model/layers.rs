use ndarray::{s, Array1, Array2, Array4, ArrayView2, ArrayView4, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rayon::prelude::*;

use super::config::Activation;

/// Couche de convolution 2D, passe avant uniquement.
/// Les paramètres appartiennent à la couche et ne sont mutés que par
/// l'optimiseur externe, jamais pendant un forward.
pub struct ConvLayer {
    pub weights: Array4<f32>,
    pub biases: Array1<f32>,
    pub stride: usize,
    pub padding: usize,
    pub activation: Activation,
}

impl ConvLayer {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        activation: Activation,
    ) -> Self {
        // Initialisation He
        let scale = (2.0 / (in_channels * kernel_size * kernel_size) as f32).sqrt();
        let weights = Array4::random(
            (out_channels, in_channels, kernel_size, kernel_size),
            Uniform::new(-scale, scale),
        );

        Self {
            weights,
            biases: Array1::zeros(out_channels),
            stride,
            padding,
            activation,
        }
    }

    pub fn forward(&self, input: &ArrayView4<f32>) -> Array4<f32> {
        let (batch_size, in_channels, in_height, in_width) = input.dim();
        let (out_channels, weight_in, kernel_size, _) = self.weights.dim();

        assert_eq!(
            in_channels, weight_in,
            "canaux d'entrée {} incompatibles avec la couche ({})",
            in_channels, weight_in
        );

        let padded_h = in_height + 2 * self.padding;
        let padded_w = in_width + 2 * self.padding;
        assert!(
            kernel_size <= padded_h && kernel_size <= padded_w,
            "noyau {} plus grand que l'entrée {}x{}",
            kernel_size,
            padded_h,
            padded_w
        );

        let out_height = (padded_h - kernel_size) / self.stride + 1;
        let out_width = (padded_w - kernel_size) / self.stride + 1;

        let padded = if self.padding > 0 {
            self.pad_input(input)
        } else {
            input.to_owned()
        };

        let mut output = Array4::zeros((batch_size, out_channels, out_height, out_width));

        // Convolution parallélisée par élément du batch
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut out_batch)| {
                let input_batch = padded.index_axis(Axis(0), b);

                for oc in 0..out_channels {
                    for oh in 0..out_height {
                        for ow in 0..out_width {
                            let ih_start = oh * self.stride;
                            let iw_start = ow * self.stride;

                            let mut sum = 0.0;
                            for ic in 0..in_channels {
                                for kh in 0..kernel_size {
                                    for kw in 0..kernel_size {
                                        sum += input_batch[[ic, ih_start + kh, iw_start + kw]]
                                            * self.weights[[oc, ic, kh, kw]];
                                    }
                                }
                            }

                            out_batch[[oc, oh, ow]] =
                                self.activation.apply(sum + self.biases[oc]);
                        }
                    }
                }
            });

        output
    }

    fn pad_input(&self, input: &ArrayView4<f32>) -> Array4<f32> {
        let (batch_size, channels, height, width) = input.dim();
        let p = self.padding;

        let mut padded = Array4::zeros((batch_size, channels, height + 2 * p, width + 2 * p));
        padded
            .slice_mut(s![.., .., p..height + p, p..width + p])
            .assign(input);

        padded
    }
}

/// Couche dense x.W + b avec activation.
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    pub fn new(in_features: usize, out_features: usize, activation: Activation) -> Self {
        let scale = (2.0 / in_features as f32).sqrt();
        let weights = Array2::random((in_features, out_features), Uniform::new(-scale, scale));

        Self {
            weights,
            biases: Array1::zeros(out_features),
            activation,
        }
    }

    pub fn forward(&self, input: &ArrayView2<f32>) -> Array2<f32> {
        assert_eq!(
            input.dim().1,
            self.weights.dim().0,
            "dimension d'entrée {} incompatible avec la couche dense ({})",
            input.dim().1,
            self.weights.dim().0
        );

        let mut output = input.dot(&self.weights) + &self.biases;
        output.mapv_inplace(|v| self.activation.apply(v));
        output
    }
}
