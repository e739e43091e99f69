//! # `ConvNorm` Module
//!
//! A [`ConvNorm2d`] module is a square, bias-free [`Conv2d`] layer
//! followed by a [`BatchNorm`] layer.
//!
//! The padding is always ``kernel_size / 2``; so an odd kernel at
//! stride `s` maps ``[h*s, w*s] -> [h, w]``. This is the shared building
//! unit of the `ResNet` stem, the residual block main paths,
//! and the shortcut projections.

use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};

/// [`ConvNorm2d`] Meta.
pub trait ConvNorm2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Square kernel size.
    fn kernel_size(&self) -> usize;

    /// Square stride.
    fn stride(&self) -> usize;

    /// Symmetric padding; ``kernel_size / 2``.
    fn padding(&self) -> usize {
        self.kernel_size() / 2
    }
}

/// [`ConvNorm2d`] Config.
#[derive(Config, Debug)]
pub struct ConvNorm2dConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels.
    pub out_channels: usize,

    /// Square kernel size; expected to be odd.
    pub kernel_size: usize,

    /// Square stride.
    #[config(default = 1)]
    pub stride: usize,
}

impl ConvNorm2dMeta for ConvNorm2dConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ConvNorm2dConfig {
    /// The underlying [`Conv2dConfig`].
    pub fn conv_config(&self) -> Conv2dConfig {
        let padding = self.padding();
        Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
    }

    /// Initialize a [`ConvNorm2d`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvNorm2d<B> {
        ConvNorm2d {
            conv: self.conv_config().init(device),
            norm: BatchNormConfig::new(self.out_channels).init(device),
        }
    }
}

/// Conv and batch-norm pair.
///
/// Implements [`ConvNorm2dMeta`].
#[derive(Module, Debug)]
pub struct ConvNorm2d<B: Backend> {
    /// Bias-free convolution.
    pub conv: Conv2d<B>,

    /// Batch norm over the conv output channels.
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvNorm2dMeta for ConvNorm2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.dims()[1]
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.dims()[0]
    }

    fn kernel_size(&self) -> usize {
        self.conv.kernel_size[0]
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }
}

impl<B: Backend> ConvNorm2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
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
                ("stride", self.stride()),
            ]
        );

        let x = self.norm.forward(self.conv.forward(input));

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}
