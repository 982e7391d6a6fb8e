use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::VolumetricClassifier;

/// A batch of labelled clips.
#[derive(new, Clone, Debug)]
pub struct VolumeBatch<B: Backend> {
    /// Volumes of shape `[batch_size, 1, depth, height, width]`.
    pub volumes: Tensor<B, 5>,
    /// Class indices of shape `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> VolumetricClassifier<B> {
    /// Score the volumes and compute the cross-entropy loss against the targets.
    ///
    /// # Panics
    ///
    /// If the volume shape does not match the configuration.
    pub fn forward_classification(
        &self,
        volumes: Tensor<B, 5>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(volumes);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput {
            loss,
            output,
            targets,
        }
    }
}

impl<B: AutodiffBackend> TrainStep<VolumeBatch<B>, ClassificationOutput<B>>
    for VolumetricClassifier<B>
{
    fn step(&self, batch: VolumeBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.volumes, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<VolumeBatch<B>, ClassificationOutput<B>> for VolumetricClassifier<B> {
    fn step(&self, batch: VolumeBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.volumes, batch.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeatureStageConfig, TestAutodiffBackend, TestBackend, VolumetricClassifierConfig};
    use burn::tensor::{Distribution, TensorData};

    fn config() -> VolumetricClassifierConfig {
        VolumetricClassifierConfig::new()
            .with_input_depth(6)
            .with_input_height(8)
            .with_input_width(8)
            .with_num_classes(3)
            .with_stage1(FeatureStageConfig::new(2, [3, 3, 3]))
            .with_stage2(FeatureStageConfig::new(2, [3, 3, 3]).with_stride([2, 2, 2]))
            .with_hidden1(8)
            .with_hidden2(4)
    }

    fn batch<B: Backend>(device: &B::Device) -> VolumeBatch<B> {
        VolumeBatch::new(
            Tensor::random([2, 1, 6, 8, 8], Distribution::Default, device),
            Tensor::from_data(TensorData::from([0, 2]), device),
        )
    }

    #[test]
    fn train_step_produces_gradients_for_the_batch() {
        TestAutodiffBackend::seed(0);
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();

        let output = TrainStep::step(&model, batch(&device));

        assert_eq!(output.item.output.dims(), [2, 3]);
        assert!(output.item.loss.into_scalar().is_finite());
    }

    #[test]
    fn valid_step_scores_the_batch() {
        let device = Default::default();
        let model = config().init::<TestBackend>(&device).unwrap();

        let output = ValidStep::step(&model, batch(&device));

        assert_eq!(output.output.dims(), [2, 3]);
        assert_eq!(output.targets.dims(), [2]);
    }
}
