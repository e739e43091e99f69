//! # The `ResNet` Shortcut Projection.
//!
//! [`Downsample`] reshapes the identity path of a residual block
//! to match the block's main path: a ``1x1`` strided conv followed by
//! batch norm.

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::errors::BlockShapeError;
use crate::models::resnet::util::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Downsample`] Meta trait.
pub trait DownsampleMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_channels(&self) -> usize;

    /// The stride of the downsample layer.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// The input must be a multiple of the stride.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the stride.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`Downsample`] configuration.
///
/// Implements [`DownsampleMeta`].
#[derive(Config, Debug)]
pub struct DownsampleConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// The size of the out channels dimension.
    pub out_channels: usize,

    /// The stride of the downsample layer.
    #[config(default = 1)]
    pub stride: usize,
}

impl DownsampleMeta for DownsampleConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

/// Does a block mapping `in_planes -> out_planes` at `stride` need a shortcut projection?
pub fn needs_shortcut(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
) -> bool {
    stride != 1 || in_planes != out_planes
}

/// Check a block's optional shortcut against the block's shape.
///
/// The shortcut must be present iff [`needs_shortcut`] holds;
/// and when present, must map ``in_planes -> out_planes`` at the block's `stride`.
pub fn check_shortcut(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
    downsample: Option<&DownsampleConfig>,
) -> Result<(), BlockShapeError> {
    for (field, value) in [
        ("in_planes", in_planes),
        ("out_planes", out_planes),
        ("stride", stride),
    ] {
        if value == 0 {
            return Err(BlockShapeError::ZeroSize { field });
        }
    }

    match (needs_shortcut(in_planes, out_planes, stride), downsample) {
        (true, None) => Err(BlockShapeError::MissingShortcut {
            in_planes,
            out_planes,
            stride,
        }),
        (false, Some(_)) => Err(BlockShapeError::UnneededShortcut { planes: out_planes }),
        (false, None) => Ok(()),
        (true, Some(ds)) => {
            if ds.in_channels() != in_planes || ds.out_channels() != out_planes {
                Err(BlockShapeError::ShortcutChannels {
                    shortcut_in: ds.in_channels(),
                    shortcut_out: ds.out_channels(),
                    in_planes,
                    out_planes,
                })
            } else if ds.stride() != stride {
                Err(BlockShapeError::ShortcutStride {
                    shortcut: ds.stride(),
                    block: stride,
                })
            } else {
                Ok(())
            }
        }
    }
}

impl DownsampleConfig {
    /// Build the shortcut for a block mapping `in_planes -> out_planes` at `stride`.
    ///
    /// # Returns
    ///
    /// `Some(config)` if [`needs_shortcut`], otherwise `None`.
    pub fn for_block(
        in_planes: usize,
        out_planes: usize,
        stride: usize,
    ) -> Option<Self> {
        if needs_shortcut(in_planes, out_planes, stride) {
            Some(Self::new(in_planes, out_planes).with_stride(stride))
        } else {
            None
        }
    }

    /// Initialize a [`Downsample`] `Module`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Downsample<B> {
        Downsample {
            conv_norm: ConvNorm2dConfig::new(self.in_channels, self.out_channels, 1)
                .with_stride(self.stride)
                .init(device),
        }
    }
}

/// Shortcut projection; a ``1x1`` conv/norm which adjusts
/// the resolution ``(H, W)`` and the number of channels.
///
/// Maps ``[batch, in_channels, in_height, in_width]`` to
/// ``[batch, out_channels, out_height, out_width]`` tensors.
///
/// Implements [`DownsampleMeta`].
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    /// Embedded conv/norm.
    pub conv_norm: ConvNorm2d<B>,
}

impl<B: Backend> DownsampleMeta for Downsample<B> {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm.stride()
    }
}

impl<B: Backend> Downsample<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_channels, in_height=out_height*stride, in_width=out_width*stride]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[
                ("in_channels", self.in_channels()),
                ("stride", self.stride())
            ]
        );

        let out = self.conv_norm.forward(input);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        out
    }
}
