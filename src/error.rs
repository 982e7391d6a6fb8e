use crate::shape::Axis;

/// Errors raised while building or evaluating a [classifier](crate::VolumetricClassifier).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A convolution stage would produce an empty output along one axis.
    #[error(
        "Invalid configuration: {stage} output {axis} would be {extent} \
         (input {size_in}, kernel {kernel_size}, stride {stride}, padding {padding}, dilation {dilation})"
    )]
    InvalidExtent {
        /// Name of the convolution stage.
        stage: &'static str,
        /// Spatial axis with the non-positive extent.
        axis: Axis,
        /// The extent given by the convolution formula.
        extent: i64,
        /// Input extent along the axis.
        size_in: usize,
        /// Kernel size along the axis.
        kernel_size: usize,
        /// Stride along the axis.
        stride: usize,
        /// Padding along the axis.
        padding: usize,
        /// Dilation along the axis.
        dilation: usize,
    },

    /// A configuration value is outside of its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidParameter(String),

    /// The input batch holds no volume.
    #[error("Empty batch: at least one volume is required")]
    EmptyBatch,

    /// The input volume does not match the configured shape.
    #[error("Dimension mismatch on {dim}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Name of the mismatched dimension.
        dim: &'static str,
        /// Size required by the configuration.
        expected: usize,
        /// Size of the provided tensor.
        found: usize,
    },
}
