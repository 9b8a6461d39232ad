pub mod builder;
pub mod capsule;
pub mod config;
pub mod decoder;
pub mod layers;
pub mod loss;
pub mod network;
pub mod ops;
pub mod routing;

// Réexportations principales
pub use builder::ModelBuilder;
pub use config::{Activation, LossConfig, NetworkConfig};
pub use loss::{CapsuleLoss, Metrics};
pub use network::CapsuleNet;
pub use ops::{softmax_axis, squash, vector_norm};
pub use routing::DynamicRouting;
