use serde::{Deserialize, Serialize};

/// Fonctions d'activation disponibles pour les couches conv et denses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Sigmoid,
    None,
}

impl Activation {
    pub fn apply(self, v: f32) -> f32 {
        match self {
            Activation::ReLU => v.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
            Activation::None => v,
        }
    }
}

/// Configuration complète du réseau de capsules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// (canaux, hauteur, largeur) de l'image d'entrée
    pub input_shape: (usize, usize, usize),
    pub num_classes: usize,
    pub conv: ConvConfig,
    pub primary: PrimaryCapsConfig,
    pub digit: DigitCapsConfig,
    pub routing_iterations: usize,
    pub decoder_hidden: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvConfig {
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub activation: Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryCapsConfig {
    /// Nombre de convolutions indépendantes; c'est aussi la dimension
    /// des vecteurs de capsules primaires produits.
    pub num_capsules: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitCapsConfig {
    pub capsule_dim: usize,
}

/// Paramètres de la perte combinée marge + reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossConfig {
    pub positive_margin: f32,
    pub negative_margin: f32,
    pub down_weighting: f32,
    pub reconstruction_weight: f32,
}

/// Extent spatial d'une convolution: division entière (plancher),
/// comme la convolution standard.
pub fn conv_output_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Result<usize, String> {
    if stride == 0 {
        return Err("stride nul".to_string());
    }
    let padded = input + 2 * padding;
    if kernel == 0 || kernel > padded {
        return Err(format!(
            "noyau {} incompatible avec une entrée de {} (padding {})",
            kernel, input, padding
        ));
    }
    Ok((padded - kernel) / stride + 1)
}

impl NetworkConfig {
    /// Nombre de noeuds de routage produits par la couche de capsules
    /// primaires: canaux x hauteur x largeur de sa carte de sortie.
    pub fn num_route_nodes(&self) -> Result<usize, String> {
        let (_, h, w) = self.input_shape;

        let h1 = conv_output_extent(h, self.conv.kernel_size, self.conv.stride, self.conv.padding)?;
        let w1 = conv_output_extent(w, self.conv.kernel_size, self.conv.stride, self.conv.padding)?;

        let h2 = conv_output_extent(
            h1,
            self.primary.kernel_size,
            self.primary.stride,
            self.primary.padding,
        )?;
        let w2 = conv_output_extent(
            w1,
            self.primary.kernel_size,
            self.primary.stride,
            self.primary.padding,
        )?;

        Ok(self.primary.out_channels * h2 * w2)
    }

    pub fn validate(&self) -> Result<(), String> {
        let (c, h, w) = self.input_shape;
        if c == 0 || h == 0 || w == 0 {
            return Err("dimensions d'entrée nulles".to_string());
        }
        if self.num_classes == 0 {
            return Err("le réseau doit avoir au moins une classe".to_string());
        }
        if self.conv.out_channels == 0
            || self.primary.out_channels == 0
            || self.primary.num_capsules == 0
            || self.digit.capsule_dim == 0
        {
            return Err("nombre de canaux ou de capsules nul".to_string());
        }
        if self.routing_iterations == 0 {
            return Err("le routage exige au moins une itération".to_string());
        }

        // Vérifie que la chaîne de convolutions est réalisable
        self.num_route_nodes()?;

        Ok(())
    }
}

impl Default for NetworkConfig {
    /// Topologie de référence: chiffres 28x28 en niveaux de gris, 10 classes.
    fn default() -> Self {
        Self {
            input_shape: (1, 28, 28),
            num_classes: 10,
            conv: ConvConfig {
                out_channels: 256,
                kernel_size: 9,
                stride: 1,
                padding: 0,
                activation: Activation::ReLU,
            },
            primary: PrimaryCapsConfig {
                num_capsules: 8,
                out_channels: 32,
                kernel_size: 9,
                stride: 2,
                padding: 0,
            },
            digit: DigitCapsConfig { capsule_dim: 16 },
            routing_iterations: 3,
            decoder_hidden: vec![512, 1024],
        }
    }
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            positive_margin: 0.9,
            negative_margin: 0.1,
            down_weighting: 0.5,
            reconstruction_weight: 0.0005,
        }
    }
}
