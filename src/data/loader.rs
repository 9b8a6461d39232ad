use std::fs;
use std::path::{Path, PathBuf};

use image::ImageReader;
use ndarray::{s, Array2, Array3, Array4};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::seq::SliceRandom;

/// Jeu de données prêt pour le réseau: images [n, 1, h, w] dans [0, 1]
/// et étiquettes one-hot [n, classes].
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train_images: Array4<f32>,
    pub train_labels: Array2<f32>,
    pub test_images: Array4<f32>,
    pub test_labels: Array2<f32>,
}

/// Chargeur d'images de chiffres rangées par classe: un sous-répertoire
/// par chiffre (`0/` à `9/`), fichiers png/jpg redimensionnés en niveaux
/// de gris.
pub struct DigitDataLoader {
    root: PathBuf,
    num_classes: usize,
    image_size: (usize, usize),
}

impl DigitDataLoader {
    pub fn new(root: &str, num_classes: usize, image_size: (usize, usize)) -> Self {
        Self {
            root: PathBuf::from(root),
            num_classes,
            image_size,
        }
    }

    pub fn load_dataset(&self, test_split: f32, max_per_class: usize) -> Result<Dataset, String> {
        let mut samples: Vec<(Array3<f32>, usize)> = Vec::new();

        for class in 0..self.num_classes {
            let dir = self.root.join(class.to_string());
            let loaded = self.load_class_dir(&dir, class, max_per_class)?;
            samples.extend(loaded);
        }

        if samples.is_empty() {
            return Err(format!("aucune image trouvée sous {:?}", self.root));
        }

        samples.shuffle(&mut rand::thread_rng());

        let split_index = (samples.len() as f32 * (1.0 - test_split)) as usize;
        let (train, test) = samples.split_at(split_index);

        Ok(Dataset {
            train_images: self.pack_images(train),
            train_labels: self.pack_labels(train),
            test_images: self.pack_images(test),
            test_labels: self.pack_labels(test),
        })
    }

    fn load_class_dir(
        &self,
        dir: &Path,
        class: usize,
        max_samples: usize,
    ) -> Result<Vec<(Array3<f32>, usize)>, String> {
        let entries = fs::read_dir(dir)
            .map_err(|e| format!("lecture de {:?} impossible: {}", dir, e))?;

        // Le plafond ne compte que les images effectivement chargées,
        // pas les autres entrées du répertoire
        let mut images = Vec::new();
        for entry in entries.flatten() {
            if images.len() >= max_samples {
                break;
            }

            let path = entry.path();
            let is_image = path
                .extension()
                .map(|ext| ext == "png" || ext == "jpg" || ext == "jpeg")
                .unwrap_or(false);

            if is_image {
                if let Some(array) = self.load_image(&path) {
                    images.push((array, class));
                }
            }
        }

        Ok(images)
    }

    fn load_image(&self, path: &Path) -> Option<Array3<f32>> {
        let img = ImageReader::open(path).ok()?.decode().ok()?;

        let resized = img.resize_exact(
            self.image_size.1 as u32,
            self.image_size.0 as u32,
            image::imageops::FilterType::Triangle,
        );

        let gray = resized.to_luma32f();
        let (width, height) = gray.dimensions();

        let mut array = Array3::zeros((1, height as usize, width as usize));
        for (x, y, pixel) in gray.enumerate_pixels() {
            array[[0, y as usize, x as usize]] = pixel.0[0].clamp(0.0, 1.0);
        }

        Some(array)
    }

    fn pack_images(&self, samples: &[(Array3<f32>, usize)]) -> Array4<f32> {
        let (h, w) = self.image_size;
        let mut images = Array4::zeros((samples.len(), 1, h, w));

        for (i, (image, _)) in samples.iter().enumerate() {
            images.slice_mut(s![i, .., .., ..]).assign(image);
        }

        images
    }

    fn pack_labels(&self, samples: &[(Array3<f32>, usize)]) -> Array2<f32> {
        let mut labels = Array2::zeros((samples.len(), self.num_classes));

        for (i, (_, class)) in samples.iter().enumerate() {
            labels[[i, *class]] = 1.0;
        }

        labels
    }
}

/// Batch synthétique pour les démonstrations et les tests: images
/// aléatoires dans [0, 1] et étiquettes one-hot réparties en rotation.
pub fn synthetic_batch(
    batch_size: usize,
    input_shape: (usize, usize, usize),
    num_classes: usize,
) -> (Array4<f32>, Array2<f32>) {
    let (c, h, w) = input_shape;
    let images = Array4::random((batch_size, c, h, w), Uniform::new(0.0, 1.0));

    let mut labels = Array2::zeros((batch_size, num_classes));
    for b in 0..batch_size {
        labels[[b, b % num_classes]] = 1.0;
    }

    (images, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_batch_shapes() {
        let (images, labels) = synthetic_batch(4, (1, 28, 28), 10);

        assert_eq!(images.dim(), (4, 1, 28, 28));
        assert_eq!(labels.dim(), (4, 10));

        for &v in images.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_synthetic_labels_are_one_hot() {
        let (_, labels) = synthetic_batch(6, (1, 8, 8), 4);

        for b in 0..6 {
            let sum: f32 = labels.row(b).iter().sum();
            assert_eq!(sum, 1.0);
        }
        assert_eq!(labels[[0, 0]], 1.0);
        assert_eq!(labels[[5, 1]], 1.0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let loader = DigitDataLoader::new("/nonexistent/digits", 10, (28, 28));
        assert!(loader.load_dataset(0.2, 100).is_err());
    }

    #[test]
    fn test_per_class_cap_ignores_non_image_files() {
        let root = std::env::temp_dir().join("capsnet_loader_cap_test");
        let class_dir = root.join("0");
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&class_dir).unwrap();

        // Des fichiers non-image qui ne doivent pas consommer le plafond
        for i in 0..5 {
            fs::write(class_dir.join(format!("notes_{}.txt", i)), b"x").unwrap();
        }
        for i in 0..2 {
            let img = image::GrayImage::new(8, 8);
            img.save(class_dir.join(format!("digit_{}.png", i))).unwrap();
        }

        let loader = DigitDataLoader::new(root.to_str().unwrap(), 1, (28, 28));
        let dataset = loader.load_dataset(0.0, 2).unwrap();

        // Les deux images sont chargées, quel que soit l'ordre du répertoire
        assert_eq!(dataset.train_images.dim(), (2, 1, 28, 28));
        assert_eq!(dataset.train_labels.dim(), (2, 1));

        let _ = fs::remove_dir_all(&root);
    }
}
