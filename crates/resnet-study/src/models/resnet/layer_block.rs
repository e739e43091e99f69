//! # `ResNet` Layer Block
//!
//! A [`LayerBlock`] is a stage; a sequence of [`ResidualBlock`]s
//! sharing an output width, where only the first block may change
//! the resolution or the channel count.
//!
//! [`LayerBlockMeta`] defines a common meta API for [`LayerBlock`]
//! and [`LayerBlockConfig`].
//!
//! [`LayerBlockConfig`] implements [`Config`], and provides
//! [`LayerBlockConfig::build`] (the stage builder) and
//! [`LayerBlockConfig::init`] to initialize a [`LayerBlock`].
//!
//! [`LayerBlock`] implements [`Module`], and provides
//! [`LayerBlock::forward`].

use crate::models::resnet::downsample::DownsampleConfig;
use crate::models::resnet::errors::StageError;
use crate::models::resnet::residual_block::{
    BlockKind, ResidualBlock, ResidualBlockConfig, ResidualBlockMeta,
};
use crate::models::resnet::util::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`LayerBlock`] Meta API.
pub trait LayerBlockMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the layer block is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the layers.
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

/// [`LayerBlock`] Configuration.
#[derive(Config, Debug)]
pub struct LayerBlockConfig {
    /// The component blocks.
    pub blocks: Vec<ResidualBlockConfig>,
}

impl From<Vec<ResidualBlockConfig>> for LayerBlockConfig {
    fn from(blocks: Vec<ResidualBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl LayerBlockMeta for LayerBlockConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl LayerBlockConfig {
    /// Build a stage.
    ///
    /// The first block maps ``in_planes -> planes * expansion`` at `stride`,
    /// and owns a shortcut projection iff that changes the shape;
    /// the remaining ``num_blocks - 1`` blocks are stride 1 and shape preserving.
    ///
    /// The stage's [`LayerBlockMeta::out_planes`] is the input width of the next stage.
    ///
    /// # Arguments
    ///
    /// - `kind`: the block variant.
    /// - `in_planes`: the running input channel count.
    /// - `planes`: the nominal stage width.
    /// - `num_blocks`: the repeat count.
    /// - `stride`: the stride of the first block.
    pub fn build(
        kind: BlockKind,
        in_planes: usize,
        planes: usize,
        num_blocks: usize,
        stride: usize,
    ) -> Self {
        let out_planes = planes * kind.expansion();
        let downsample = DownsampleConfig::for_block(in_planes, out_planes, stride);

        tracing::debug!(
            %kind,
            in_planes,
            planes,
            out_planes,
            num_blocks,
            stride,
            shortcut = downsample.is_some(),
            "building stage"
        );

        let mut blocks = Vec::with_capacity(num_blocks);
        let mut running_planes = in_planes;
        for idx in 0..num_blocks {
            if idx == 0 {
                blocks.push(kind.build_config(running_planes, planes, stride, downsample.clone()));
                running_planes = out_planes;
            } else {
                blocks.push(kind.build_config(running_planes, planes, 1, None));
            }
        }

        Self { blocks }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), StageError> {
        if self.is_empty() {
            return Err(StageError::Empty);
        }

        for (idx, curr) in self.blocks.iter().enumerate() {
            if idx > 0 {
                if curr.stride() != 1 {
                    return Err(StageError::LateStride {
                        block: idx,
                        stride: curr.stride(),
                    });
                }
                let prev = &self.blocks[idx - 1];
                if prev.out_planes() != curr.in_planes() {
                    return Err(StageError::Chain {
                        block: idx,
                        expected: prev.out_planes(),
                        found: curr.in_planes(),
                    });
                }
            }
            curr.try_validate().map_err(|err| err.at_block(idx))?;
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a new [`LayerBlock`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> LayerBlock<B> {
        self.expect_valid();

        LayerBlock {
            blocks: self
                .blocks
                .iter()
                .map(|block| block.init(device))
                .collect(),
        }
    }
}

/// Layer block.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    /// Internal blocks.
    pub blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlockMeta for LayerBlock<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl<B: Backend> LayerBlock<B> {
    /// Apply the layer block.
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

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}
