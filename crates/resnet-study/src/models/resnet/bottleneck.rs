//! # [`BottleneckBlock`] Block for `ResNet`
//!
//! [`BottleneckBlock`] is the bottleneck form of the core `ResNet` convolution unit:
//! ``1x1`` reduce, ``3x3`` (strided), ``1x1`` expand (by [`BottleneckBlockMeta::EXPANSION`]).
//!
//! [`BottleneckBlockMeta`] defines a common meta API for [`BottleneckBlock`]
//! and [`BottleneckBlockConfig`].
//!
//! [`BottleneckBlockConfig`] implements [`Config`], and provides
//! [`BottleneckBlockConfig::init`] to initialize a [`BottleneckBlock`].
//!
//! [`BottleneckBlock`] implements [`Module`], and provides
//! [`BottleneckBlock::forward`].

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::downsample::{
    Downsample, DownsampleConfig, DownsampleMeta, check_shortcut,
};
use crate::models::resnet::errors::BlockShapeError;
use crate::models::resnet::util::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::Relu;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BottleneckBlock`] Meta trait.
pub trait BottleneckBlockMeta {
    /// Output planes are ``planes * EXPANSION``.
    const EXPANSION: usize = 4;

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The inner width; the ``1x1`` reduce and ``3x3`` conv output channels.
    fn planes(&self) -> usize;

    /// The number of output feature planes.
    ///
    /// ``out_planes = planes * EXPANSION``
    fn out_planes(&self) -> usize {
        self.planes() * Self::EXPANSION
    }

    /// The stride of the ``3x3`` convolution.
    ///
    /// Affects downsample behavior.
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

/// [`BottleneckBlock`] Config.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The inner width; configures `out_planes`.
    pub planes: usize,

    /// The stride of the ``3x3`` convolution.
    #[config(default = 1)]
    pub stride: usize,

    /// The optional shortcut projection.
    ///
    /// Required iff ``stride != 1 || in_planes != out_planes``.
    #[config(default = "None")]
    pub downsample: Option<DownsampleConfig>,
}

impl BottleneckBlockMeta for BottleneckBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BottleneckBlockConfig {
    /// Attach the shortcut projection required by the current shape, if any.
    pub fn with_standard_downsample(self) -> Self {
        let downsample = DownsampleConfig::for_block(self.in_planes, self.out_planes(), self.stride);
        Self { downsample, ..self }
    }

    /// Check the shortcut against the block shape.
    pub fn try_validate(&self) -> Result<(), BlockShapeError> {
        check_shortcut(
            self.in_planes(),
            self.out_planes(),
            self.stride(),
            self.downsample.as_ref(),
        )
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`BottleneckBlock`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        self.expect_valid();

        let in_planes = self.in_planes();
        let planes = self.planes();
        let out_planes = self.out_planes();

        BottleneckBlock {
            downsample: self.downsample.as_ref().map(|cfg| cfg.init(device)),
            conv_norm1: ConvNorm2dConfig::new(in_planes, planes, 1).init(device),
            conv_norm2: ConvNorm2dConfig::new(planes, planes, 3)
                .with_stride(self.stride())
                .init(device),
            conv_norm3: ConvNorm2dConfig::new(planes, out_planes, 1).init(device),
            act: Relu::new(),
        }
    }
}

/// Bottleneck Block for `ResNet`.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// Optional shortcut projection; for the residual connection.
    pub downsample: Option<Downsample<B>>,

    /// ``1x1`` reduce conv/norm.
    pub conv_norm1: ConvNorm2d<B>,
    /// ``3x3`` strided conv/norm.
    pub conv_norm2: ConvNorm2d<B>,
    /// ``1x1`` expand conv/norm.
    pub conv_norm3: ConvNorm2d<B>,

    /// Shared activation.
    pub act: Relu,
}

impl<B: Backend> BottleneckBlockMeta for BottleneckBlock<B> {
    fn in_planes(&self) -> usize {
        self.conv_norm1.in_channels()
    }

    fn planes(&self) -> usize {
        self.conv_norm1.out_channels()
    }

    fn out_planes(&self) -> usize {
        self.conv_norm3.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm2.stride()
    }
}

impl<B: Backend> BottleneckBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes=planes*EXPANSION, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, out_height, in_width, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_planes",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "in_height", "out_height", "in_width", "out_width"],
            &[("in_planes", self.in_planes()), ("stride", self.stride())],
        );

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv_norm1.forward(input);
        let x = self.act.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "planes", "in_height", "in_width"],
            &x,
            &[
                ("batch", batch),
                ("planes", self.planes()),
                ("in_height", in_height),
                ("in_width", in_width),
            ]
        );

        let x = self.conv_norm2.forward(x);
        let x = self.act.forward(x);

        let x = self.conv_norm3.forward(x);
        let x = self.act.forward(x + identity);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }

    /// The shortcut stride, if there is a shortcut.
    pub fn downsample_stride(&self) -> Option<usize> {
        self.downsample.as_ref().map(|ds| ds.stride())
    }
}
