use ndarray::{ArrayView2, ArrayView4};

use super::config::LossConfig;

/// Perte combinée marge + reconstruction (Sabour et al., 2017).
///
/// L_c = T_c * max(0, m+ - a_c)^2 + lambda * (1 - T_c) * max(0, a_c - m-)^2,
/// sommée sur les classes et moyennée sur le batch, plus l'erreur
/// quadratique moyenne de reconstruction pondérée.
pub struct CapsuleLoss {
    pub positive_margin: f32,
    pub negative_margin: f32,
    pub down_weighting: f32,
    pub reconstruction_weight: f32,
}

impl CapsuleLoss {
    pub fn new(config: &LossConfig) -> Self {
        Self {
            positive_margin: config.positive_margin,
            negative_margin: config.negative_margin,
            down_weighting: config.down_weighting,
            reconstruction_weight: config.reconstruction_weight,
        }
    }

    /// Perte scalaire pour un batch.
    ///
    /// `images` [batch, c, h, w], `labels` one-hot [batch, classes],
    /// `classes` [batch, classes], `reconstructions` [batch, h*w].
    pub fn forward(
        &self,
        images: &ArrayView4<f32>,
        labels: &ArrayView2<f32>,
        classes: &ArrayView2<f32>,
        reconstructions: &ArrayView2<f32>,
    ) -> f32 {
        let (batch_size, num_classes) = classes.dim();

        assert_eq!(
            labels.dim(),
            (batch_size, num_classes),
            "étiquettes {:?} incompatibles avec les activations {:?}",
            labels.dim(),
            classes.dim()
        );
        assert_eq!(
            reconstructions.len(),
            images.len(),
            "reconstruction de {} valeurs pour {} pixels",
            reconstructions.len(),
            images.len()
        );

        self.margin_loss(labels, classes)
            + self.reconstruction_weight * reconstruction_mse(images, reconstructions)
    }

    /// Somme sur les classes, moyenne sur le batch.
    pub fn margin_loss(&self, labels: &ArrayView2<f32>, classes: &ArrayView2<f32>) -> f32 {
        let (batch_size, num_classes) = classes.dim();
        let mut total = 0.0;

        for b in 0..batch_size {
            for c in 0..num_classes {
                let t = labels[[b, c]];
                let a = classes[[b, c]];

                let present = (self.positive_margin - a).max(0.0).powi(2);
                let absent = (a - self.negative_margin).max(0.0).powi(2);

                total += t * present + self.down_weighting * (1.0 - t) * absent;
            }
        }

        total / batch_size as f32
    }
}

impl Default for CapsuleLoss {
    fn default() -> Self {
        Self::new(&LossConfig::default())
    }
}

/// Erreur quadratique moyenne entre la reconstruction et l'image aplatie.
pub fn reconstruction_mse(images: &ArrayView4<f32>, reconstructions: &ArrayView2<f32>) -> f32 {
    let sum: f32 = images
        .iter()
        .zip(reconstructions.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();

    sum / images.len() as f32
}

/// Métriques d'évaluation calculées à partir des activations de classe.
pub struct Metrics {
    pub accuracy: f32,
    pub precision: Vec<f32>,
    pub recall: Vec<f32>,
    pub f1_score: Vec<f32>,
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl Metrics {
    pub fn compute(classes: &ArrayView2<f32>, labels: &ArrayView2<f32>) -> Self {
        let (batch_size, num_classes) = classes.dim();
        assert_eq!(labels.dim(), (batch_size, num_classes));

        let mut confusion = vec![vec![0; num_classes]; num_classes];
        let mut correct = 0;

        for b in 0..batch_size {
            let predicted = argmax(classes, b);
            let truth = argmax(labels, b);

            confusion[truth][predicted] += 1;
            if predicted == truth {
                correct += 1;
            }
        }

        let accuracy = correct as f32 / batch_size as f32;

        let mut precision = Vec::with_capacity(num_classes);
        let mut recall = Vec::with_capacity(num_classes);
        let mut f1_score = Vec::with_capacity(num_classes);

        for c in 0..num_classes {
            let tp = confusion[c][c] as f32;
            let fp: f32 = (0..num_classes)
                .filter(|&i| i != c)
                .map(|i| confusion[i][c] as f32)
                .sum();
            let fn_: f32 = (0..num_classes)
                .filter(|&i| i != c)
                .map(|i| confusion[c][i] as f32)
                .sum();

            let prec = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
            let rec = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
            let f1 = if prec + rec > 0.0 {
                2.0 * prec * rec / (prec + rec)
            } else {
                0.0
            };

            precision.push(prec);
            recall.push(rec);
            f1_score.push(f1);
        }

        Self {
            accuracy,
            precision,
            recall,
            f1_score,
            confusion_matrix: confusion,
        }
    }

    pub fn print(&self) {
        println!("📊 MÉTRIQUES");
        println!("   Accuracy: {:.4}", self.accuracy);

        for (i, ((p, r), f1)) in self
            .precision
            .iter()
            .zip(&self.recall)
            .zip(&self.f1_score)
            .enumerate()
        {
            println!(
                "   Classe {}: Precision={:.4}, Recall={:.4}, F1={:.4}",
                i, p, r, f1
            );
        }

        println!("   Matrice de confusion:");
        for row in &self.confusion_matrix {
            println!("     {:?}", row);
        }
    }
}

fn argmax(values: &ArrayView2<f32>, row: usize) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in values.row(row).iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}
