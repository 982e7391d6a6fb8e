use core::fmt;

use crate::Error;

/// Spatial axis of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Temporal axis, one slice per frame.
    Depth,
    /// Frame height.
    Height,
    /// Frame width.
    Width,
}

impl Axis {
    /// The spatial axes in tensor order.
    pub const ALL: [Axis; 3] = [Axis::Depth, Axis::Height, Axis::Width];

    /// Lowercase name of the axis.
    pub fn name(&self) -> &'static str {
        match self {
            Axis::Depth => "depth",
            Axis::Height => "height",
            Axis::Width => "width",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Calculate the output extent of a convolution along one axis.
///
/// `floor((size_in + 2 * padding - dilation * (kernel_size - 1) - 1) / stride + 1)`
///
/// The arithmetic is signed so that a kernel larger than its (padded) input shows up as a
/// non-positive extent instead of an underflow. Returns `None` when an operand or an
/// intermediate value does not fit in an `i64`.
///
/// # Panics
///
/// If `stride` is zero.
pub fn conv_output_extent(
    size_in: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<i64> {
    assert!(stride > 0, "Convolution stride must be positive");

    let size_in = i64::try_from(size_in).ok()?;
    let kernel_size = i64::try_from(kernel_size).ok()?;
    let stride = i64::try_from(stride).ok()?;
    let padding = i64::try_from(padding).ok()?;
    let dilation = i64::try_from(dilation).ok()?;

    let span = dilation.checked_mul(kernel_size - 1)?;
    let numerator = padding
        .checked_mul(2)?
        .checked_add(size_in)?
        .checked_sub(span)?
        .checked_sub(1)?;

    numerator.div_euclid(stride).checked_add(1)
}

/// Kernel, stride, padding and dilation of a 3D convolution, ordered `[depth, height, width]`.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry3d {
    /// Size of the kernel.
    pub kernel_size: [usize; 3],
    /// Stride of the convolution.
    pub stride: [usize; 3],
    /// Zero padding added on both sides of each axis.
    pub padding: [usize; 3],
    /// Spacing between kernel elements.
    pub dilation: [usize; 3],
}

impl ConvGeometry3d {
    /// Check that kernel, stride and dilation are positive on every axis.
    pub fn validate(&self, stage: &'static str) -> Result<(), Error> {
        for (name, values) in [
            ("kernel size", self.kernel_size),
            ("stride", self.stride),
            ("dilation", self.dilation),
        ] {
            if let Some(axis) = Axis::ALL.iter().zip(values).find(|(_, v)| *v == 0) {
                return Err(Error::InvalidParameter(format!(
                    "{stage} {name} must be positive, got 0 on the {} axis",
                    axis.0
                )));
            }
        }

        Ok(())
    }

    /// Compute the output extents for the given input extents.
    ///
    /// Fails if any parameter is zero or if any axis would produce a non-positive extent.
    pub fn output_extents(
        &self,
        stage: &'static str,
        input: [usize; 3],
    ) -> Result<[usize; 3], Error> {
        self.validate(stage)?;

        let mut output = [0; 3];

        for (i, axis) in Axis::ALL.into_iter().enumerate() {
            let extent = conv_output_extent(
                input[i],
                self.kernel_size[i],
                self.stride[i],
                self.padding[i],
                self.dilation[i],
            )
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "{stage} output {axis} overflows for input {}, kernel {}, stride {}, padding {}, dilation {}",
                    input[i],
                    self.kernel_size[i],
                    self.stride[i],
                    self.padding[i],
                    self.dilation[i]
                ))
            })?;

            if extent <= 0 {
                return Err(Error::InvalidExtent {
                    stage,
                    axis,
                    extent,
                    size_in: input[i],
                    kernel_size: self.kernel_size[i],
                    stride: self.stride[i],
                    padding: self.padding[i],
                    dilation: self.dilation[i],
                });
            }

            output[i] = usize::try_from(extent).map_err(|_| {
                Error::InvalidParameter(format!("{stage} output {axis} of {extent} is too large"))
            })?;
        }

        Ok(output)
    }
}

/// Tensor extents flowing through the classifier, derived from its configuration.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierGeometry {
    /// Extents of the input volume.
    pub input: [usize; 3],
    /// Extents after the first feature stage.
    pub stage1: [usize; 3],
    /// Extents after the second feature stage.
    pub stage2: [usize; 3],
    /// Channels produced by the second feature stage.
    pub channels: usize,
}

impl ClassifierGeometry {
    /// Width of the flattened feature vector fed to the classifier head, `None` on overflow.
    pub fn flattened_features(&self) -> Option<usize> {
        self.stage2
            .iter()
            .try_fold(self.channels, |width, extent| width.checked_mul(*extent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_extent_matches_formula() {
        assert_eq!(conv_output_extent(50, 5, 2, 0, 1), Some(23));
        assert_eq!(conv_output_extent(90, 5, 2, 0, 1), Some(43));
        assert_eq!(conv_output_extent(120, 5, 2, 0, 1), Some(58));
        assert_eq!(conv_output_extent(23, 3, 2, 0, 1), Some(11));
    }

    #[test]
    fn output_extent_with_padding_and_dilation() {
        // (10 + 2 - 2 * 2 - 1) / 1 + 1
        assert_eq!(conv_output_extent(10, 3, 1, 1, 2), Some(8));
        // (7 + 6 - 3 * 2 - 1) / 3 + 1 = floor(6 / 3) + 1
        assert_eq!(conv_output_extent(7, 3, 3, 3, 3), Some(3));
        // 'same' padding keeps the extent
        assert_eq!(conv_output_extent(16, 3, 1, 1, 1), Some(16));
    }

    #[test]
    fn output_extent_floors_negative_values() {
        // (3 - 4 - 1) / 2 + 1 = -1 + 1
        assert_eq!(conv_output_extent(3, 5, 2, 0, 1), Some(0));
        // (1 - 8 - 1) / 3 + 1 = floor(-8 / 3) + 1
        assert_eq!(conv_output_extent(1, 9, 3, 0, 1), Some(-2));
    }

    #[test]
    fn output_extent_outside_i64_is_none() {
        assert_eq!(conv_output_extent(usize::MAX, 1, 1, 0, 1), None);
        assert_eq!(conv_output_extent(10, 3, 1, i64::MAX as usize, 1), None);
        assert_eq!(conv_output_extent(10, usize::MAX, 1, 0, 1), None);
        assert_eq!(conv_output_extent(10, 3, 1, 0, i64::MAX as usize), None);
    }

    #[test]
    fn overflowing_extent_is_rejected() {
        let conv = ConvGeometry3d::new([1, 1, 1], [1, 1, 1], [0, 0, 0], [1, 1, 1]);

        let error = conv
            .output_extents("conv1", [8, usize::MAX, 8])
            .unwrap_err();

        assert!(matches!(
            error,
            Error::InvalidParameter(message) if message.contains("conv1 output height")
        ));
    }

    #[test]
    fn flattened_width_overflow_is_none() {
        let geometry = ClassifierGeometry::new([1, 1, 1], [1, 1, 1], [usize::MAX, 2, 1], 1);

        assert_eq!(geometry.flattened_features(), None);
    }

    #[test]
    fn geometry_chains_two_stages() {
        let conv1 = ConvGeometry3d::new([5, 5, 5], [2, 2, 2], [0, 0, 0], [1, 1, 1]);
        let conv2 = ConvGeometry3d::new([3, 3, 3], [2, 2, 2], [0, 0, 0], [1, 1, 1]);

        let stage1 = conv1.output_extents("conv1", [50, 90, 120]).unwrap();
        let stage2 = conv2.output_extents("conv2", stage1).unwrap();
        let geometry = ClassifierGeometry::new([50, 90, 120], stage1, stage2, 48);

        assert_eq!(stage1, [23, 43, 58]);
        assert_eq!(stage2, [11, 21, 28]);
        assert_eq!(geometry.flattened_features(), Some(48 * 11 * 21 * 28));
    }

    #[test]
    fn too_small_input_reports_stage_and_axis() {
        let conv = ConvGeometry3d::new([5, 5, 5], [2, 2, 2], [0, 0, 0], [1, 1, 1]);

        let error = conv.output_extents("conv1", [3, 90, 120]).unwrap_err();

        match error {
            Error::InvalidExtent {
                stage,
                axis,
                extent,
                ..
            } => {
                assert_eq!(stage, "conv1");
                assert_eq!(axis, Axis::Depth);
                assert_eq!(extent, 0);
            }
            other => panic!("Unexpected error {other:?}"),
        }
    }

    #[test]
    fn zero_stride_is_rejected() {
        let conv = ConvGeometry3d::new([3, 3, 3], [1, 0, 1], [0, 0, 0], [1, 1, 1]);

        let error = conv.output_extents("conv2", [8, 8, 8]).unwrap_err();

        assert_eq!(
            error,
            Error::InvalidParameter(
                "conv2 stride must be positive, got 0 on the height axis".to_string()
            )
        );
    }

    #[test]
    fn error_message_names_stage_and_axis() {
        let conv = ConvGeometry3d::new([3, 7, 3], [1, 1, 1], [0, 0, 0], [1, 1, 1]);

        let error = conv.output_extents("conv2", [8, 4, 8]).unwrap_err();

        assert_eq!(
            error.to_string(),
            "Invalid configuration: conv2 output height would be -2 \
             (input 4, kernel 7, stride 1, padding 0, dilation 1)"
        );
    }
}
