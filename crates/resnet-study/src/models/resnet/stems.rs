//! # Input Stem
//!
//! The classic `ResNet` stem:
//!
//! ```text,ignore
//! conv(in_channels -> width, 7x7, stride=2, padding=3, bias=False)
//! batch_norm(width)
//! relu
//! max_pool(3x3, stride=2, padding=1)
//! ```
//!
//! Reduces the input resolution by 4.

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::errors::BlockShapeError;
use crate::models::resnet::util::{scalar_to_array, stride_div_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// Total stride of the stem; conv /2, pool /2.
pub const STEM_STRIDE: usize = 4;

/// [`ResNetStem`] Meta.
pub trait ResNetStemMeta {
    /// Number of input (image) channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels; the input width of the first stage.
    fn out_channels(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of [`STEM_STRIDE`].
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, STEM_STRIDE)
    }
}

/// [`ResNetStem`] Config.
#[derive(Config, Debug)]
pub struct ResNetStemConfig {
    /// Number of input (image) channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Number of output channels.
    #[config(default = 64)]
    pub width: usize,
}

impl ResNetStemMeta for ResNetStemConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.width
    }
}

impl ResNetStemConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), BlockShapeError> {
        if self.in_channels == 0 {
            return Err(BlockShapeError::ZeroSize {
                field: "in_channels",
            });
        }
        if self.width == 0 {
            return Err(BlockShapeError::ZeroSize { field: "width" });
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`ResNetStem`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNetStem<B> {
        self.expect_valid();

        ResNetStem {
            conv_norm: ConvNorm2dConfig::new(self.in_channels, self.width, 7)
                .with_stride(2)
                .init(device),
            act: Relu::new(),
            pool: MaxPool2dConfig::new(scalar_to_array(3))
                .with_strides(scalar_to_array(2))
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
        }
    }
}

/// `ResNet` input stem.
///
/// Implements [`ResNetStemMeta`].
#[derive(Module, Debug)]
pub struct ResNetStem<B: Backend> {
    /// ``7x7`` conv/norm.
    pub conv_norm: ConvNorm2d<B>,
    /// Activation.
    pub act: Relu,
    /// ``3x3`` max pool.
    pub pool: MaxPool2d,
}

impl<B: Backend> ResNetStemMeta for ResNetStem<B> {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }
}

impl<B: Backend> ResNetStem<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height=out_height*4, in_width=out_width*4]``.
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
            &[("in_channels", self.in_channels()), ("stride", STEM_STRIDE)],
        );

        let x = self.conv_norm.forward(input);
        let x = self.act.forward(x);
        let x = self.pool.forward(x);

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
