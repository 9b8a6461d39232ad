//! Réseau de capsules avec routage dynamique (Sabour et al., 2017)
//! pour la classification de chiffres manuscrits 28x28.

pub mod data;
pub mod model;

pub use model::{CapsuleLoss, CapsuleNet, ModelBuilder, NetworkConfig};
