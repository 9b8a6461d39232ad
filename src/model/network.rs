use ndarray::{s, Array2, Array4, ArrayView4, ArrayViewMutD, Axis};

use super::capsule::{DigitCapsLayer, PrimaryCapsLayer};
use super::config::NetworkConfig;
use super::decoder::Decoder;
use super::layers::ConvLayer;
use super::ops::{softmax_axis, vector_norm};

/// Réseau de capsules complet: extracteur convolutif, capsules primaires,
/// capsules de classe routées, puis décodeur de reconstruction conditionné
/// par la capsule la plus active.
///
/// Le forward est une fonction pure des entrées et des paramètres; seuls
/// l'optimiseur externe mute les poids, entre deux appels.
pub struct CapsuleNet {
    pub config: NetworkConfig,
    pub conv1: ConvLayer,
    pub primary_capsules: PrimaryCapsLayer,
    pub digit_capsules: DigitCapsLayer,
    pub decoder: Decoder,
}

impl CapsuleNet {
    pub fn new(config: NetworkConfig) -> Result<Self, String> {
        config.validate()?;

        let (in_channels, height, width) = config.input_shape;
        let num_route_nodes = config.num_route_nodes()?;

        let conv1 = ConvLayer::new(
            in_channels,
            config.conv.out_channels,
            config.conv.kernel_size,
            config.conv.stride,
            config.conv.padding,
            config.conv.activation,
        );

        let primary_capsules = PrimaryCapsLayer::new(
            config.conv.out_channels,
            config.primary.num_capsules,
            config.primary.out_channels,
            config.primary.kernel_size,
            config.primary.stride,
            config.primary.padding,
        );

        let digit_capsules = DigitCapsLayer::new(
            config.num_classes,
            num_route_nodes,
            config.primary.num_capsules,
            config.digit.capsule_dim,
            config.routing_iterations,
        );

        let decoder = Decoder::new(
            config.digit.capsule_dim,
            &config.decoder_hidden,
            height * width,
        );

        Ok(Self {
            config,
            conv1,
            primary_capsules,
            digit_capsules,
            decoder,
        })
    }

    /// Passe avant complète.
    ///
    /// Entrée [batch, canaux, H, W]; retourne les activations de classe
    /// [batch, classes] (softmax des normes des capsules de sortie) et les
    /// reconstructions [batch, H*W].
    pub fn forward(&self, input: &ArrayView4<f32>) -> (Array2<f32>, Array2<f32>) {
        let (batch_size, channels, height, width) = input.dim();
        let (c, h, w) = self.config.input_shape;

        assert!(batch_size > 0, "batch vide");
        assert_eq!(
            (channels, height, width),
            (c, h, w),
            "entrée {:?} incompatible avec la configuration {:?}",
            (channels, height, width),
            (c, h, w)
        );

        let features = self.conv1.forward(input);
        let primary = self.primary_capsules.forward(&features.view());
        let digits = self.digit_capsules.forward(&primary.view());

        // Norme de chaque capsule de classe, puis softmax sur les classes
        let norms = vector_norm(&digits, Axis(2));
        let classes = softmax_axis(&norms, Axis(1));

        // Masquage: la capsule la plus active du premier élément du batch
        // est appliquée au batch entier (pas de sélection par échantillon).
        let best = Self::argmax_row(&classes, 0);
        let selected = digits.slice(s![.., best, ..]).to_owned();

        let reconstructions = self.decoder.forward(&selected.view());

        (classes, reconstructions)
    }

    fn argmax_row(classes: &Array2<f32>, row: usize) -> usize {
        let mut best = 0;
        let mut best_val = f32::NEG_INFINITY;
        for (i, &v) in classes.row(row).iter().enumerate() {
            if v > best_val {
                best_val = v;
                best = i;
            }
        }
        best
    }

    /// Classe prédite de chaque élément du batch (norme maximale).
    pub fn predict(&self, input: &ArrayView4<f32>) -> Vec<usize> {
        let (classes, _) = self.forward(input);
        (0..classes.dim().0)
            .map(|b| Self::argmax_row(&classes, b))
            .collect()
    }

    /// Paramètres appris, exposés pour l'optimiseur externe.
    /// Aucune autre voie de mutation n'existe.
    pub fn named_parameters_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut params = Vec::new();

        params.push(("conv1.weights".to_string(), self.conv1.weights.view_mut().into_dyn()));
        params.push(("conv1.biases".to_string(), self.conv1.biases.view_mut().into_dyn()));

        for (i, conv) in self.primary_capsules.conv_layers.iter_mut().enumerate() {
            params.push((format!("primary.{}.weights", i), conv.weights.view_mut().into_dyn()));
            params.push((format!("primary.{}.biases", i), conv.biases.view_mut().into_dyn()));
        }

        params.push((
            "digit.route_weights".to_string(),
            self.digit_capsules.route_weights.view_mut().into_dyn(),
        ));

        for (i, dense) in self.decoder.layers.iter_mut().enumerate() {
            params.push((format!("decoder.{}.weights", i), dense.weights.view_mut().into_dyn()));
            params.push((format!("decoder.{}.biases", i), dense.biases.view_mut().into_dyn()));
        }

        params
    }

    pub fn num_parameters(&mut self) -> usize {
        self.named_parameters_mut().iter().map(|(_, p)| p.len()).sum()
    }

    /// Passe avant de contrôle sur une entrée nulle, avec affichage des formes.
    pub fn diagnostic(&self) {
        let (c, h, w) = self.config.input_shape;
        let input = Array4::zeros((1, c, h, w));

        println!("🔍 DIAGNOSTIC");
        println!("   Entrée: {:?}", (1, c, h, w));

        let (classes, reconstructions) = self.forward(&input.view());
        println!("   Activations de classe: {:?}", classes.dim());
        println!("   Reconstruction: {:?}", reconstructions.dim());
        println!("✅ Modèle opérationnel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::NetworkConfig;
    use crate::model::loss::CapsuleLoss;
    use ndarray::Array4;

    /// Topologie réduite pour des tests rapides: 12x12, 4 classes.
    fn small_config() -> NetworkConfig {
        let mut config = NetworkConfig::default();
        config.input_shape = (1, 12, 12);
        config.num_classes = 4;
        config.conv.out_channels = 8;
        config.conv.kernel_size = 5;
        config.primary.num_capsules = 4;
        config.primary.out_channels = 2;
        config.primary.kernel_size = 5;
        config.digit.capsule_dim = 6;
        config.decoder_hidden = vec![32, 64];
        config
    }

    #[test]
    fn test_forward_shapes_small() {
        let net = CapsuleNet::new(small_config()).unwrap();
        let input = Array4::from_elem((3, 1, 12, 12), 0.5);

        let (classes, reconstructions) = net.forward(&input.view());
        assert_eq!(classes.dim(), (3, 4));
        assert_eq!(reconstructions.dim(), (3, 144));
    }

    #[test]
    fn test_class_activations_are_probabilities() {
        let net = CapsuleNet::new(small_config()).unwrap();
        let input = Array4::from_elem((2, 1, 12, 12), 0.3);

        let (classes, _) = net.forward(&input.view());
        for b in 0..2 {
            let sum: f32 = classes.row(b).iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        for &v in classes.iter() {
            assert!(v > 0.0 && v < 1.0);
        }
    }

    #[test]
    fn test_end_to_end_zero_image() {
        // Scénario de bout en bout sur la topologie de référence:
        // image nulle 28x28, batch 1, étiquette one-hot [1, 0, ..., 0]
        let net = CapsuleNet::new(NetworkConfig::default()).unwrap();
        let input = Array4::<f32>::zeros((1, 1, 28, 28));

        let (classes, reconstructions) = net.forward(&input.view());

        assert_eq!(classes.dim(), (1, 10));
        let sum: f32 = classes.row(0).iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        assert_eq!(reconstructions.dim(), (1, 784));
        for &v in reconstructions.iter() {
            assert!((0.0..=1.0).contains(&v));
        }

        let mut labels = ndarray::Array2::<f32>::zeros((1, 10));
        labels[[0, 0]] = 1.0;

        let loss = CapsuleLoss::default().forward(
            &input.view(),
            &labels.view(),
            &classes.view(),
            &reconstructions.view(),
        );
        assert!(loss.is_finite());
        assert!(loss >= 0.0);
    }

    #[test]
    fn test_reference_primary_capsules_route_node_contract() {
        // Contrat de forme: 32 canaux x 6 x 6 = 1152 noeuds de routage
        let net = CapsuleNet::new(NetworkConfig::default()).unwrap();
        let input = Array4::<f32>::zeros((1, 1, 28, 28));

        let features = net.conv1.forward(&input.view());
        assert_eq!(features.dim(), (1, 256, 20, 20));

        let primary = net.primary_capsules.forward(&features.view());
        assert_eq!(primary.dim(), (1, 1152, 8));

        assert_eq!(net.digit_capsules.num_route_nodes, 1152);
    }

    #[test]
    fn test_predict_returns_one_class_per_sample() {
        let net = CapsuleNet::new(small_config()).unwrap();
        let input = Array4::from_elem((5, 1, 12, 12), 0.7);

        let predictions = net.predict(&input.view());
        assert_eq!(predictions.len(), 5);
        for &p in &predictions {
            assert!(p < 4);
        }
    }

    #[test]
    fn test_parameter_interface() {
        let mut net = CapsuleNet::new(small_config()).unwrap();
        let count = net.named_parameters_mut().len();

        // conv1 (2) + 4 convs primaires (8) + routage (1) + 3 denses (6)
        assert_eq!(count, 17);
        assert!(net.num_parameters() > 0);

        // L'optimiseur externe peut écrire au travers de l'interface
        for (_, mut param) in net.named_parameters_mut() {
            param.fill(0.0);
        }
        assert_eq!(net.digit_capsules.route_weights.sum(), 0.0);
    }

    #[test]
    fn test_forward_rejects_wrong_input_shape() {
        let net = CapsuleNet::new(small_config()).unwrap();
        let input = Array4::<f32>::zeros((1, 1, 28, 28));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            net.forward(&input.view())
        }));
        assert!(result.is_err());
    }
}
