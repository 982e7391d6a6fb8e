use burn::{
    config::Config,
    module::{Ignored, Module},
    nn::{
        conv::{Conv3d, Conv3dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig3d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::nn::{ChannelDropout, ChannelDropoutConfig};
use crate::shape::{ClassifierGeometry, ConvGeometry3d};
use crate::Error;

/// Whether regularization and normalization layers run with training behavior.
///
/// The mode follows the backend of a classifier instance: a classifier on an autodiff backend
/// trains, and [valid](burn::module::AutodiffModule::valid) returns the same parameters and
/// running statistics ready for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Dropout layers are active and batch normalization uses batch statistics while updating
    /// its running statistics.
    Training,
    /// Dropout layers are the identity and batch normalization uses its running statistics.
    Evaluation,
}

impl Mode {
    /// The mode of modules running on backend `B`.
    pub fn of<B: Backend>() -> Self {
        match B::ad_enabled() {
            true => Mode::Training,
            false => Mode::Evaluation,
        }
    }
}

/// Configuration of one [feature stage](FeatureStage).
#[derive(Config, Debug)]
pub struct FeatureStageConfig {
    /// Number of output channels of the convolution.
    pub channels: usize,
    /// Size of the kernel, ordered `[depth, height, width]`.
    pub kernel_size: [usize; 3],
    /// Stride of the convolution.
    #[config(default = "[1, 1, 1]")]
    pub stride: [usize; 3],
    /// Zero padding added on both sides of each axis.
    #[config(default = "[0, 0, 0]")]
    pub padding: [usize; 3],
    /// Spacing between kernel elements.
    #[config(default = "[1, 1, 1]")]
    pub dilation: [usize; 3],
}

impl FeatureStageConfig {
    /// The convolution parameters of the stage.
    pub fn geometry(&self) -> ConvGeometry3d {
        ConvGeometry3d::new(self.kernel_size, self.stride, self.padding, self.dilation)
    }

    fn init<B: Backend>(
        &self,
        channels_in: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Result<FeatureStage<B>, Error> {
        let [pad_d, pad_h, pad_w] = self.padding;
        let conv = Conv3dConfig::new([channels_in, self.channels], self.kernel_size)
            .with_stride(self.stride)
            .with_dilation(self.dilation)
            .with_padding(PaddingConfig3d::Explicit(pad_d, pad_h, pad_w))
            .init(device);

        Ok(FeatureStage {
            conv,
            norm: BatchNormConfig::new(self.channels).init(device),
            activation: Relu::new(),
            dropout: ChannelDropoutConfig::new(dropout).init()?,
        })
    }
}

/// Volumetric convolution followed by batch normalization, ReLU and channel dropout.
#[derive(Module, Debug)]
pub struct FeatureStage<B: Backend> {
    conv: Conv3d<B>,
    norm: BatchNorm<B, 3>,
    activation: Relu,
    dropout: ChannelDropout,
}

impl<B: Backend> FeatureStage<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, channels_in, depth_in, height_in, width_in]`
    /// - output: `[batch_size, channels_out, depth_out, height_out, width_out]`
    pub fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);
        let x = self.activation.forward(x);

        self.dropout.forward(x)
    }
}

/// The two feature stages of the classifier.
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    stage1: FeatureStage<B>,
    stage2: FeatureStage<B>,
}

impl<B: Backend> FeatureExtractor<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, 1, depth, height, width]`
    /// - output: `[batch_size, stage2_channels, depth_2, height_2, width_2]`
    pub fn forward(&self, volume: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.stage1.forward(volume);

        self.stage2.forward(x)
    }
}

/// Fully-connected layers mapping flattened features to class scores.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    activation: Relu,
    dropout: Dropout,
}

impl<B: Backend> ClassifierHead<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, flattened_features]`
    /// - output: `[batch_size, num_classes]`
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.fc1.forward(features));
        let x = self.activation.forward(self.fc2.forward(x));
        let x = self.dropout.forward(x);

        self.fc3.forward(x)
    }
}

/// Configuration to create a [volumetric classifier](VolumetricClassifier) using the
/// [init function](VolumetricClassifierConfig::init).
///
/// The defaults describe clips of 50 frames of 90x120 pixels sorted into 500 gestures.
#[derive(Config, Debug)]
pub struct VolumetricClassifierConfig {
    /// Number of frames of an input clip.
    #[config(default = 50)]
    pub input_depth: usize,
    /// Frame height in pixels.
    #[config(default = 90)]
    pub input_height: usize,
    /// Frame width in pixels.
    #[config(default = 120)]
    pub input_width: usize,
    /// Number of gesture classes.
    #[config(default = 500)]
    pub num_classes: usize,
    /// First feature stage, fed by the single input channel.
    #[config(default = "FeatureStageConfig::new(32, [5, 5, 5]).with_stride([2, 2, 2])")]
    pub stage1: FeatureStageConfig,
    /// Second feature stage.
    #[config(default = "FeatureStageConfig::new(48, [3, 3, 3]).with_stride([2, 2, 2])")]
    pub stage2: FeatureStageConfig,
    /// Width of the first hidden layer of the head.
    #[config(default = 256)]
    pub hidden1: usize,
    /// Width of the second hidden layer of the head.
    #[config(default = 128)]
    pub hidden2: usize,
    /// Dropout probability shared by every regularization layer.
    #[config(default = 0.2)]
    pub dropout: f64,
    /// Max pooling kernel size. Validated but not applied in the forward pass.
    #[config(default = 2)]
    pub pool_kernel: usize,
}

impl VolumetricClassifierConfig {
    /// Compute the tensor extents flowing through the classifier without allocating it.
    pub fn geometry(&self) -> Result<ClassifierGeometry, Error> {
        self.resolve_geometry().map(|(geometry, _)| geometry)
    }

    /// The geometry along with the width of the flattened features.
    fn resolve_geometry(&self) -> Result<(ClassifierGeometry, usize), Error> {
        let input = [self.input_depth, self.input_height, self.input_width];
        let stage1 = self.stage1.geometry().output_extents("conv1", input)?;
        let stage2 = self.stage2.geometry().output_extents("conv2", stage1)?;
        let geometry = ClassifierGeometry::new(input, stage1, stage2, self.stage2.channels);

        let features = geometry.flattened_features().ok_or_else(|| {
            Error::InvalidParameter(format!(
                "Flattened width of {} channels of {:?} overflows",
                self.stage2.channels, stage2
            ))
        })?;

        Ok((geometry, features))
    }

    /// Initialize a new [volumetric classifier](VolumetricClassifier).
    ///
    /// Fails when a size is zero, when the dropout probability is outside `[0, 1)` or when a
    /// convolution stage would produce an empty output.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<VolumetricClassifier<B>, Error> {
        self.validate()?;
        let (geometry, features_in) = self.resolve_geometry()?;

        log::debug!(
            "Volumetric classifier geometry: input {:?} -> conv1 {:?} -> conv2 {:?}, {} features",
            geometry.input,
            geometry.stage1,
            geometry.stage2,
            features_in
        );
        log::debug!(
            "Pooling kernel {} is configured but not part of the forward pass",
            self.pool_kernel
        );

        let features = FeatureExtractor {
            stage1: self.stage1.init(1, self.dropout, device)?,
            stage2: self
                .stage2
                .init(self.stage1.channels, self.dropout, device)?,
        };
        let head = ClassifierHead {
            fc1: LinearConfig::new(features_in, self.hidden1).init(device),
            fc2: LinearConfig::new(self.hidden1, self.hidden2).init(device),
            fc3: LinearConfig::new(self.hidden2, self.num_classes).init(device),
            activation: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
        };

        Ok(VolumetricClassifier {
            features,
            head,
            geometry: Ignored(geometry),
            num_classes: self.num_classes,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        let sizes = [
            ("input depth", self.input_depth),
            ("input height", self.input_height),
            ("input width", self.input_width),
            ("num_classes", self.num_classes),
            ("stage1 channels", self.stage1.channels),
            ("stage2 channels", self.stage2.channels),
            ("hidden1", self.hidden1),
            ("hidden2", self.hidden2),
            ("pool_kernel", self.pool_kernel),
        ];

        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(Error::InvalidParameter(format!("{name} must be positive")));
        }

        // A probability of one would scale the surviving head activations by infinity.
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidParameter(format!(
                "Dropout probability should be in [0, 1), but got {}",
                self.dropout
            )));
        }

        Ok(())
    }
}

/// 3D convolutional network scoring single-channel volumes against gesture classes.
///
/// Should be created with [VolumetricClassifierConfig].
#[derive(Module, Debug)]
pub struct VolumetricClassifier<B: Backend> {
    features: FeatureExtractor<B>,
    head: ClassifierHead<B>,
    geometry: Ignored<ClassifierGeometry>,
    num_classes: usize,
}

impl<B: Backend> VolumetricClassifier<B> {
    /// Score a batch of volumes, validating its shape first.
    ///
    /// Returns raw, unnormalized class scores.
    ///
    /// # Shapes
    ///
    /// - volume: `[batch_size, 1, depth, height, width]`
    /// - output: `[batch_size, num_classes]`
    pub fn evaluate(&self, volume: Tensor<B, 5>) -> Result<Tensor<B, 2>, Error> {
        self.check_input(volume.dims())?;

        let features = self.features.forward(volume);
        let features: Tensor<B, 2> = features.flatten(1, 4);

        Ok(self.head.forward(features))
    }

    /// Applies the forward pass on the input tensor.
    ///
    /// See [evaluate](VolumetricClassifier::evaluate) for more information.
    ///
    /// # Panics
    ///
    /// If the volume shape does not match the configuration.
    pub fn forward(&self, volume: Tensor<B, 5>) -> Tensor<B, 2> {
        match self.evaluate(volume) {
            Ok(scores) => scores,
            Err(err) => panic!("{err}"),
        }
    }

    /// Shapes derived from the configuration.
    pub fn geometry(&self) -> &ClassifierGeometry {
        &self.geometry.0
    }

    /// Number of scores produced per volume.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// The current [mode](Mode) of the classifier.
    pub fn mode(&self) -> Mode {
        Mode::of::<B>()
    }

    fn check_input(&self, dims: [usize; 5]) -> Result<(), Error> {
        let [batch_size, channels, depth, height, width] = dims;
        let [expected_depth, expected_height, expected_width] = self.geometry.0.input;

        if batch_size == 0 {
            return Err(Error::EmptyBatch);
        }

        let checks = [
            ("channels", 1, channels),
            ("depth", expected_depth, depth),
            ("height", expected_height, height),
            ("width", expected_width, width),
        ];

        match checks.into_iter().find(|(_, expected, found)| expected != found) {
            Some((dim, expected, found)) => Err(Error::DimensionMismatch {
                dim,
                expected,
                found,
            }),
            None => Ok(()),
        }
    }
}
