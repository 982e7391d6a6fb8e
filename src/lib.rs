#![warn(missing_docs)]

//! A 3D convolutional network classifying grayscale sign-language clips.
//!
//! The network is a statically declared pipeline: two volumetric feature stages
//! followed by a fully-connected classifier head. Every intermediate shape is
//! derived from the [configuration](VolumetricClassifierConfig) and checked when
//! the classifier is initialized.

#[macro_use]
extern crate derive_new;

mod error;

/// Convolution output shape arithmetic.
pub mod shape;

/// Layers not provided by burn.
pub mod nn;

/// The volumetric classifier.
pub mod model;

/// Adapter for burn's training loop.
#[cfg(feature = "train")]
pub mod training;

pub use error::Error;
pub use model::{
    ClassifierHead, FeatureExtractor, FeatureStage, FeatureStageConfig, Mode,
    VolumetricClassifier, VolumetricClassifierConfig,
};
pub use shape::{Axis, ClassifierGeometry, ConvGeometry3d};

/// Backend for test cases
#[cfg(test)]
pub type TestBackend = burn::backend::NdArray<f32>;

/// Backend for autodiff test cases
#[cfg(test)]
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
