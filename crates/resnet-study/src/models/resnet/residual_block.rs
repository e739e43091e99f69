//! # Residual Block Wrapper
//!
//! [`BlockKind`] selects the block variant, and is the factory
//! the stage builder is written against.
//!
//! [`ResidualBlockConfig`] / [`ResidualBlock`] wrap the
//! [`BasicBlock`] and [`BottleneckBlock`] variants.

use crate::models::resnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::resnet::bottleneck::{
    BottleneckBlock, BottleneckBlockConfig, BottleneckBlockMeta,
};
use crate::models::resnet::downsample::DownsampleConfig;
use crate::models::resnet::errors::BlockShapeError;
use crate::models::resnet::util::stride_div_output_resolution;
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Residual block variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// [`BasicBlock`]; two ``3x3`` convs, expansion 1.
    Basic,

    /// [`BottleneckBlock`]; ``1x1``, ``3x3``, ``1x1`` convs, expansion 4.
    Bottleneck,
}

impl fmt::Display for BlockKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "BasicBlock"),
            Self::Bottleneck => write!(f, "Bottleneck"),
        }
    }
}

impl BlockKind {
    /// The expansion factor from `planes` to `out_planes`.
    pub fn expansion(&self) -> usize {
        match self {
            Self::Basic => <BasicBlockConfig as BasicBlockMeta>::EXPANSION,
            Self::Bottleneck => <BottleneckBlockConfig as BottleneckBlockMeta>::EXPANSION,
        }
    }

    /// Build a block config of this kind.
    ///
    /// The config is not validated; see [`ResidualBlockConfig::try_validate`].
    pub fn build_config(
        &self,
        in_planes: usize,
        planes: usize,
        stride: usize,
        downsample: Option<DownsampleConfig>,
    ) -> ResidualBlockConfig {
        match self {
            Self::Basic => BasicBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .with_downsample(downsample)
                .into(),
            Self::Bottleneck => BottleneckBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .with_downsample(downsample)
                .into(),
        }
    }
}

/// [`ResidualBlock`] Meta API.
pub trait ResidualBlockMeta {
    /// The block variant.
    fn kind(&self) -> BlockKind;

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The nominal width.
    fn planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// The stride of convolution.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;

    /// Does the block have a shortcut projection?
    fn has_downsample(&self) -> bool;

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

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub enum ResidualBlockConfig {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlockConfig),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlockConfig),
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn kind(&self) -> BlockKind {
        match self {
            Self::Basic(_) => BlockKind::Basic,
            Self::Bottleneck(_) => BlockKind::Bottleneck,
        }
    }

    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.in_planes(),
            Self::Bottleneck(config) => config.in_planes(),
        }
    }

    fn planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.planes(),
            Self::Bottleneck(config) => config.planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.out_planes(),
            Self::Bottleneck(config) => config.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(config) => config.stride(),
            Self::Bottleneck(config) => config.stride(),
        }
    }

    fn has_downsample(&self) -> bool {
        match self {
            Self::Basic(config) => config.downsample.is_some(),
            Self::Bottleneck(config) => config.downsample.is_some(),
        }
    }
}

impl From<BasicBlockConfig> for ResidualBlockConfig {
    fn from(config: BasicBlockConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckBlockConfig> for ResidualBlockConfig {
    fn from(config: BottleneckBlockConfig) -> Self {
        Self::Bottleneck(config)
    }
}

impl ResidualBlockConfig {
    /// Build a block, with the shortcut projection its shape requires.
    pub fn standard(
        kind: BlockKind,
        in_planes: usize,
        planes: usize,
        stride: usize,
    ) -> Self {
        let out_planes = planes * kind.expansion();
        kind.build_config(
            in_planes,
            planes,
            stride,
            DownsampleConfig::for_block(in_planes, out_planes, stride),
        )
    }

    /// Check the block shape.
    pub fn try_validate(&self) -> Result<(), BlockShapeError> {
        match self {
            Self::Basic(config) => config.try_validate(),
            Self::Bottleneck(config) => config.try_validate(),
        }
    }

    /// Initialize a [`ResidualBlock`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        match self {
            Self::Basic(config) => config.init(device).into(),
            Self::Bottleneck(config) => config.init(device).into(),
        }
    }
}

/// A `ResNet` [`BasicBlock`] or [`BottleneckBlock`] wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlock<B>),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlock<B>),
}

impl<B: Backend> From<BasicBlock<B>> for ResidualBlock<B> {
    fn from(block: BasicBlock<B>) -> Self {
        Self::Basic(block)
    }
}

impl<B: Backend> From<BottleneckBlock<B>> for ResidualBlock<B> {
    fn from(block: BottleneckBlock<B>) -> Self {
        Self::Bottleneck(block)
    }
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn kind(&self) -> BlockKind {
        match self {
            Self::Basic(_) => BlockKind::Basic,
            Self::Bottleneck(_) => BlockKind::Bottleneck,
        }
    }

    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.in_planes(),
            Self::Bottleneck(block) => block.in_planes(),
        }
    }

    fn planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.planes(),
            Self::Bottleneck(block) => block.planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.out_planes(),
            Self::Bottleneck(block) => block.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(block) => block.stride(),
            Self::Bottleneck(block) => block.stride(),
        }
    }

    fn has_downsample(&self) -> bool {
        match self {
            Self::Basic(block) => block.downsample.is_some(),
            Self::Bottleneck(block) => block.downsample.is_some(),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// Apply the wrapped block to the input.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes=planes*expansion, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_block_kind() {
        assert_eq!(BlockKind::Basic.expansion(), 1);
        assert_eq!(BlockKind::Bottleneck.expansion(), 4);
        assert_eq!(BlockKind::Basic.to_string(), "BasicBlock");
        assert_eq!(BlockKind::Bottleneck.to_string(), "Bottleneck");

        let cfg = BlockKind::Bottleneck.build_config(256, 128, 2, None);
        assert_eq!(cfg.kind(), BlockKind::Bottleneck);
        assert_eq!(cfg.in_planes(), 256);
        assert_eq!(cfg.planes(), 128);
        assert_eq!(cfg.out_planes(), 512);
        assert_eq!(cfg.stride(), 2);
        assert!(!cfg.has_downsample());
        assert!(cfg.try_validate().is_err());
    }

    #[test]
    fn test_residual_block_config_standard() {
        let cfg = ResidualBlockConfig::standard(BlockKind::Basic, 64, 64, 1);
        assert!(matches!(cfg, ResidualBlockConfig::Basic(_)));
        assert!(!cfg.has_downsample());
        assert_eq!(cfg.try_validate(), Ok(()));

        let cfg = ResidualBlockConfig::standard(BlockKind::Basic, 64, 128, 2);
        assert!(cfg.has_downsample());
        assert_eq!(cfg.output_resolution([20, 20]), [10, 10]);
        assert_eq!(cfg.try_validate(), Ok(()));

        let cfg = ResidualBlockConfig::standard(BlockKind::Bottleneck, 64, 64, 1);
        assert!(matches!(cfg, ResidualBlockConfig::Bottleneck(_)));
        assert!(cfg.has_downsample());
        assert_eq!(cfg.out_planes(), 256);
        assert_eq!(cfg.try_validate(), Ok(()));
    }

    #[test]
    fn test_residual_block_basic_block() {
        type B = NdArray;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 4;
        let planes = 8;

        let cfg = ResidualBlockConfig::standard(BlockKind::Basic, in_planes, planes, 2);
        let block: ResidualBlock<B> = cfg.init(&device);
        assert!(matches!(block, ResidualBlock::Basic(_)));
        assert_eq!(block.kind(), BlockKind::Basic);
        assert_eq!(block.in_planes(), in_planes);
        assert_eq!(block.out_planes(), planes);
        assert_eq!(block.stride(), 2);
        assert!(block.has_downsample());

        let input = Tensor::ones([batch_size, in_planes, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", planes),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }

    #[test]
    fn test_residual_block_bottleneck_block() {
        type B = NdArray;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 4;
        let planes = 2;

        let cfg = ResidualBlockConfig::standard(BlockKind::Bottleneck, in_planes, planes, 2);
        let block: ResidualBlock<B> = cfg.init(&device);
        assert!(matches!(block, ResidualBlock::Bottleneck(_)));
        assert_eq!(block.in_planes(), in_planes);
        assert_eq!(block.planes(), planes);
        assert_eq!(block.out_planes(), planes * 4);
        assert_eq!(block.stride(), 2);

        let input = Tensor::ones([batch_size, in_planes, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", planes * 4),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }
}
