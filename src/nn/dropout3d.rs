use burn::config::Config;
use burn::module::{Content, DisplaySettings, Module, ModuleDisplay};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

use crate::Error;

/// Configuration to create a [channel dropout](ChannelDropout) layer using the [init function](ChannelDropoutConfig::init).
#[derive(Config, Debug)]
pub struct ChannelDropoutConfig {
    /// The probability of zeroing a whole channel volume during training.
    pub prob: f64,
}

/// Set at random entire channels of a volume to zero during training.
///
/// Adjacent voxels inside a feature map are strongly correlated, so dropping single elements
/// barely regularizes a volumetric convolution. This layer draws one Bernoulli sample per
/// `(batch, channel)` pair and zeroes the complete `[depth, height, width]` volume instead, as
/// described in [Efficient Object Localization Using Convolutional Networks](https://arxiv.org/abs/1411.4280).
///
/// Surviving channels are scaled by `1 / (1 - p)` during training. The layer is the identity
/// when the backend has autodiff disabled.
///
/// Should be created with [ChannelDropoutConfig].
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct ChannelDropout {
    /// The probability of zeroing a channel volume.
    pub prob: f64,
}

impl ChannelDropoutConfig {
    /// Initialize a new [channel dropout](ChannelDropout) module.
    pub fn init(&self) -> Result<ChannelDropout, Error> {
        if !(0.0..=1.0).contains(&self.prob) {
            return Err(Error::InvalidParameter(format!(
                "Dropout probability should be between 0 and 1, but got {}",
                self.prob
            )));
        }

        Ok(ChannelDropout { prob: self.prob })
    }
}

impl ChannelDropout {
    /// Applies the forward pass on the input tensor.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, channels, depth, height, width]`
    /// - output: `[batch_size, channels, depth, height, width]`
    pub fn forward<B: Backend>(&self, input: Tensor<B, 5>) -> Tensor<B, 5> {
        if !B::ad_enabled() || self.prob == 0.0 {
            return input;
        }

        if self.prob >= 1.0 {
            return input.zeros_like();
        }

        let [batch_size, channels, _, _, _] = input.dims();
        let prob_keep = 1.0 - self.prob;
        let mask = Tensor::<B, 5>::random(
            [batch_size, channels, 1, 1, 1],
            Distribution::Bernoulli(prob_keep),
            &input.device(),
        );

        input.mul(mask).mul_scalar(1.0 / prob_keep)
    }
}

impl ModuleDisplay for ChannelDropout {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content.add("prob", &self.prob).optional()
    }
}
