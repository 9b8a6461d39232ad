use super::config::{LossConfig, NetworkConfig};
use super::loss::CapsuleLoss;
use super::network::CapsuleNet;

/// Constructeur de modèle: valide la configuration puis assemble le réseau.
pub struct ModelBuilder {
    network_config: Option<NetworkConfig>,
    loss_config: Option<LossConfig>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            network_config: None,
            loss_config: None,
        }
    }

    pub fn with_network_config(mut self, config: NetworkConfig) -> Self {
        self.network_config = Some(config);
        self
    }

    pub fn with_loss_config(mut self, config: LossConfig) -> Self {
        self.loss_config = Some(config);
        self
    }

    pub fn build(self) -> Result<(CapsuleNet, CapsuleLoss), String> {
        let network_config = self.network_config.unwrap_or_default();
        let loss_config = self.loss_config.unwrap_or_default();

        let network = CapsuleNet::new(network_config)?;
        let loss = CapsuleLoss::new(&loss_config);

        Ok((network, loss))
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let result = ModelBuilder::new().build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = NetworkConfig::default();
        config.routing_iterations = 0;

        let result = ModelBuilder::new().with_network_config(config).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_loss_config_is_carried() {
        let loss_config = LossConfig {
            reconstruction_weight: 0.01,
            ..LossConfig::default()
        };

        let (_, loss) = ModelBuilder::new()
            .with_loss_config(loss_config)
            .build()
            .unwrap();

        assert!((loss.reconstruction_weight - 0.01).abs() < 1e-9);
    }
}
