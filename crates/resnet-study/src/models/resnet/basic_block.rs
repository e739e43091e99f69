//! # Basic Block for `ResNet`
//!
//! [`BasicBlock`] is the core `ResNet` convolution unit; two ``3x3`` convs
//! and a residual connection.
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].
//!
//! [`BasicBlockConfig`] implements [`Config`], and provides
//! [`BasicBlockConfig::init`] to initialize a [`BasicBlock`].
//!
//! [`BasicBlock`] implements [`Module`], and provides
//! [`BasicBlock::forward`].

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::downsample::{
    Downsample, DownsampleConfig, DownsampleMeta, check_shortcut,
};
use crate::models::resnet::errors::BlockShapeError;
use crate::models::resnet::util::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::Relu;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// Output planes are ``planes * EXPANSION``.
    const EXPANSION: usize = 1;

    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// Configures the size of `out_planes`.
    fn planes(&self) -> usize;

    /// The size of the out channels dimension.
    ///
    /// ``out_planes = planes * EXPANSION``
    fn out_planes(&self) -> usize {
        self.planes() * Self::EXPANSION
    }

    /// The stride of the first convolution.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// The input must be a multiple of the stride.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: \
    ///   ``[in_height=out_height*stride, in_width=out_width*stride]``.
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

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// Configures the `out_planes`.
    pub planes: usize,

    /// The stride of the first convolution.
    #[config(default = 1)]
    pub stride: usize,

    /// The optional shortcut projection.
    ///
    /// Required iff ``stride != 1 || in_planes != out_planes``.
    #[config(default = "None")]
    pub downsample: Option<DownsampleConfig>,
}

impl BasicBlockMeta for BasicBlockConfig {
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

impl BasicBlockConfig {
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

    /// Initialize a [`BasicBlock`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        self.expect_valid();

        let in_planes = self.in_planes();
        let out_planes = self.out_planes();

        BasicBlock {
            downsample: self.downsample.as_ref().map(|cfg| cfg.init(device)),
            conv_norm1: ConvNorm2dConfig::new(in_planes, out_planes, 3)
                .with_stride(self.stride())
                .init(device),
            conv_norm2: ConvNorm2dConfig::new(out_planes, out_planes, 3).init(device),
            act: Relu::new(),
        }
    }
}

/// Basic Block for `ResNet`.
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// Optional shortcut projection; for the residual connection.
    pub downsample: Option<Downsample<B>>,

    /// First conv/norm; ``3x3``, strided.
    pub conv_norm1: ConvNorm2d<B>,

    /// Second conv/norm; ``3x3``.
    pub conv_norm2: ConvNorm2d<B>,

    /// Shared activation.
    pub act: Relu,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.conv_norm1.in_channels()
    }

    fn planes(&self) -> usize {
        self.conv_norm1.out_channels()
    }

    fn out_planes(&self) -> usize {
        self.conv_norm2.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm1.stride()
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_planes",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[("in_planes", self.in_planes()), ("stride", self.stride())],
        );

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv_norm1.forward(input);
        let x = self.act.forward(x);
        let x = self.conv_norm2.forward(x);

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
