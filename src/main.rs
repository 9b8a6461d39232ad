use std::fs;
use std::path::Path;

use ndarray::s;

use capsnet_mnist::data::{synthetic_batch, DigitDataLoader};
use capsnet_mnist::model::{Metrics, ModelBuilder, NetworkConfig};

const CONFIG_PATH: &str = "config.json";
const DATA_PATH: &str = "digit_data";

fn main() {
    println!("🧠 CAPSNET - CLASSIFICATION DE CHIFFRES MANUSCRITS");
    println!("==================================================\n");

    // Configuration: fichier json si présent, sinon topologie de référence
    let network_config = load_config();

    println!("🏗️  Construction du modèle...");
    let (network, loss) = match ModelBuilder::new()
        .with_network_config(network_config.clone())
        .build()
    {
        Ok(built) => built,
        Err(e) => {
            eprintln!("❌ Configuration invalide: {}", e);
            std::process::exit(1);
        }
    };
    println!("✅ Modèle construit\n");

    network.diagnostic();
    println!();

    // Évaluation sur le jeu de données s'il existe, sinon batch synthétique
    if Path::new(DATA_PATH).is_dir() {
        let loader = DigitDataLoader::new(
            DATA_PATH,
            network_config.num_classes,
            (network_config.input_shape.1, network_config.input_shape.2),
        );

        match loader.load_dataset(0.2, 1000) {
            Ok(dataset) => {
                println!("📁 Données chargées:");
                println!("   Train: {} échantillons", dataset.train_images.dim().0);
                println!("   Test: {} échantillons\n", dataset.test_images.dim().0);

                evaluate(&network, &loss, &dataset.test_images, &dataset.test_labels);
            }
            Err(e) => eprintln!("❌ Chargement impossible: {}", e),
        }
    } else {
        println!("📁 Pas de répertoire {:?}, batch synthétique", DATA_PATH);
        let (images, labels) = synthetic_batch(
            8,
            network_config.input_shape,
            network_config.num_classes,
        );
        evaluate(&network, &loss, &images, &labels);
    }
}

fn load_config() -> NetworkConfig {
    if let Ok(contents) = fs::read_to_string(CONFIG_PATH) {
        match serde_json::from_str(&contents) {
            Ok(config) => {
                println!("📄 Configuration lue depuis {}", CONFIG_PATH);
                return config;
            }
            Err(e) => eprintln!("⚠️  {} illisible ({}), défauts utilisés", CONFIG_PATH, e),
        }
    }
    NetworkConfig::default()
}

fn evaluate(
    network: &capsnet_mnist::CapsuleNet,
    loss: &capsnet_mnist::CapsuleLoss,
    images: &ndarray::Array4<f32>,
    labels: &ndarray::Array2<f32>,
) {
    let num_samples = images.dim().0;
    if num_samples == 0 {
        println!("⚠️  Aucun échantillon à évaluer");
        return;
    }

    let batch_size = 8;
    let num_batches = num_samples.div_ceil(batch_size);

    let mut total_loss = 0.0;
    let mut all_classes = Vec::with_capacity(num_batches);

    println!("🎯 Évaluation sur {} échantillons...", num_samples);

    for batch_idx in 0..num_batches {
        let start = batch_idx * batch_size;
        let end = (start + batch_size).min(num_samples);

        let batch_images = images.slice(s![start..end, .., .., ..]);
        let batch_labels = labels.slice(s![start..end, ..]);

        let (classes, reconstructions) = network.forward(&batch_images);
        let batch_loss = loss.forward(
            &batch_images,
            &batch_labels,
            &classes.view(),
            &reconstructions.view(),
        );

        total_loss += batch_loss;
        all_classes.push(classes);

        println!(
            "   Batch {}/{} - Loss: {:.4}",
            batch_idx + 1,
            num_batches,
            batch_loss
        );
    }

    let views: Vec<_> = all_classes.iter().map(|c| c.view()).collect();
    let classes = ndarray::concatenate(ndarray::Axis(0), &views)
        .expect("lots d'activations de formes homogènes");

    println!("\n📊 Loss moyenne: {:.4}", total_loss / num_batches as f32);
    let metrics = Metrics::compute(&classes.view(), &labels.view());
    metrics.print();
}
