//! # `ResNet` Core Model
//!
//! [`ResNet`] is the core `ResNet` module.
//!
//! [`ResNetConfig`] implements [`Config`], and provides
//! a high-level configuration interface; the block variant and stage depths.
//! It provides [`ResNetConfig::to_structure`] to convert
//! to a [`ResNetStructureConfig`].
//!
//! [`ResNetStructureConfig`] implements [`Config`], and provides
//! [`ResNetStructureConfig::try_validate`], and [`ResNetStructureConfig::init`]
//! to initialize a [`ResNet`].
//!
//! [`ResNet`] implements [`Module`], and provides
//! [`ResNet::forward`].

use crate::models::resnet::errors::ResNetConfigError;
use crate::models::resnet::layer_block::{LayerBlock, LayerBlockConfig, LayerBlockMeta};
use crate::models::resnet::residual_block::BlockKind;
use crate::models::resnet::stems::{ResNetStem, ResNetStemConfig, ResNetStemMeta, STEM_STRIDE};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Config, Tensor};

/// ResNet-18 block depths.
pub const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
/// ResNet-34 block depths.
pub const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// ResNet-50 block depths.
pub const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// ResNet-101 block depths.
pub const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
/// ResNet-152 block depths.
pub const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// Nominal stage widths (`planes`).
pub const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];
/// Stage strides; applied by the first block of each stage.
pub const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

/// [`ResNet`] Meta API.
pub trait ResNetMeta {
    /// Number of input (image) channels.
    fn in_channels(&self) -> usize;

    /// Number of stages.
    fn num_stages(&self) -> usize;

    /// Number of blocks, over all stages.
    fn num_blocks(&self) -> usize;

    /// Number of feature planes entering the head.
    fn head_planes(&self) -> usize;

    /// Number of classification classes.
    fn num_classes(&self) -> usize;

    /// The total stride of the stem and stages.
    fn stride(&self) -> usize;
}

/// High-level `ResNet` model configuration.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// The block variant.
    pub block: BlockKind,

    /// Layer block depths.
    pub layers: [usize; 4],

    /// Number of classification classes.
    #[config(default = 1000)]
    pub num_classes: usize,

    /// Number of input (image) channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Number of channels out of the stem.
    #[config(default = 64)]
    pub stem_width: usize,
}

impl From<&ResNetConfig> for ResNetStructureConfig {
    fn from(config: &ResNetConfig) -> Self {
        let expansion = config.block.expansion();

        // Running input width; local to the expansion.
        let mut in_planes = config.stem_width;

        let layers = config
            .layers
            .iter()
            .zip(STAGE_WIDTHS.iter().zip(STAGE_STRIDES.iter()))
            .map(|(&num_blocks, (&planes, &stride))| {
                let stage =
                    LayerBlockConfig::build(config.block, in_planes, planes, num_blocks, stride);
                in_planes = planes * expansion;
                stage
            })
            .collect();

        ResNetStructureConfig::new(
            ResNetStemConfig::new()
                .with_in_channels(config.in_channels)
                .with_width(config.stem_width),
            layers,
            config.num_classes,
        )
    }
}

impl ResNetConfig {
    /// `ResNet-18`; [`BlockKind::Basic`], [`RESNET18_BLOCKS`], 1000 classes.
    pub fn resnet18() -> Self {
        Self::new(BlockKind::Basic, RESNET18_BLOCKS)
    }

    /// `ResNet-34`; [`BlockKind::Basic`], [`RESNET34_BLOCKS`], 1000 classes.
    pub fn resnet34() -> Self {
        Self::new(BlockKind::Basic, RESNET34_BLOCKS)
    }

    /// `ResNet-50`; [`BlockKind::Bottleneck`], [`RESNET50_BLOCKS`], 1000 classes.
    pub fn resnet50() -> Self {
        Self::new(BlockKind::Bottleneck, RESNET50_BLOCKS)
    }

    /// `ResNet-101`; [`BlockKind::Bottleneck`], [`RESNET101_BLOCKS`], 1000 classes.
    pub fn resnet101() -> Self {
        Self::new(BlockKind::Bottleneck, RESNET101_BLOCKS)
    }

    /// `ResNet-152`; [`BlockKind::Bottleneck`], [`RESNET152_BLOCKS`], 1000 classes.
    pub fn resnet152() -> Self {
        Self::new(BlockKind::Bottleneck, RESNET152_BLOCKS)
    }

    /// The block expansion factor.
    pub fn expansion(&self) -> usize {
        self.block.expansion()
    }

    /// Convert to a [`ResNetStructureConfig`].
    pub fn to_structure(&self) -> ResNetStructureConfig {
        self.into()
    }

    /// Initialize a [`ResNet`] model.
    ///
    /// # Returns
    ///
    /// The model; or the first topology error found.
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNet<B>, ResNetConfigError> {
        self.to_structure().try_init(device)
    }

    /// Initialize a [`ResNet`] model.
    ///
    /// # Panics
    ///
    /// If the expanded topology is not valid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNet<B> {
        self.to_structure().init(device)
    }
}

/// [`ResNet`] Structure Config.
///
/// This config defines the fully expanded structure of a `ResNet` model.
/// [`ResNetStructureConfig::try_validate`] checks the block, stage, and
/// model level shape invariants before any module is initialized.
#[derive(Config, Debug)]
pub struct ResNetStructureConfig {
    /// The input stem.
    pub stem: ResNetStemConfig,

    /// The stages.
    pub layers: Vec<LayerBlockConfig>,

    /// The number of classes.
    pub num_classes: usize,
}

impl ResNetMeta for ResNetStructureConfig {
    fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn num_stages(&self) -> usize {
        self.layers.len()
    }

    fn num_blocks(&self) -> usize {
        self.layers.iter().map(|stage| stage.len()).sum()
    }

    fn head_planes(&self) -> usize {
        match self.layers.last() {
            Some(stage) => stage.out_planes(),
            None => self.stem.out_channels(),
        }
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn stride(&self) -> usize {
        self.layers
            .iter()
            .fold(STEM_STRIDE, |acc, stage| acc * stage.stride())
    }
}

impl ResNetStructureConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// The first error found; naming the stage and block index.
    pub fn try_validate(&self) -> Result<(), ResNetConfigError> {
        self.stem
            .try_validate()
            .map_err(|source| ResNetConfigError::Stem { source })?;
        if self.layers.len() != STAGE_WIDTHS.len() {
            return Err(ResNetConfigError::StageCount {
                found: self.layers.len(),
            });
        }
        if self.num_classes == 0 {
            return Err(ResNetConfigError::NoClasses);
        }

        let mut expected = self.stem.out_channels();
        for (idx, stage) in self.layers.iter().enumerate() {
            stage.try_validate().map_err(|err| err.at_stage(idx))?;
            if stage.in_planes() != expected {
                return Err(ResNetConfigError::StageChain {
                    stage: idx,
                    expected,
                    found: stage.in_planes(),
                });
            }
            expected = stage.out_planes();
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`ResNet`] model.
    ///
    /// # Returns
    ///
    /// The model; or the first topology error found.
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNet<B>, ResNetConfigError> {
        self.try_validate()?;
        Ok(self.build(device))
    }

    /// Initialize a [`ResNet`] model.
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNet<B> {
        self.expect_valid();
        self.build(device)
    }

    fn build<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNet<B> {
        tracing::debug!(
            stages = self.num_stages(),
            blocks = self.num_blocks(),
            head_planes = self.head_planes(),
            num_classes = self.num_classes,
            "initializing ResNet"
        );

        ResNet {
            stem: self.stem.init(device),
            layers: self
                .layers
                .iter()
                .map(|stage| stage.init(device))
                .collect(),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(self.head_planes(), self.num_classes).init(device),
        }
    }
}

/// `ResNet` model.
///
/// Implements [`ResNetMeta`].
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// Input stem.
    pub stem: ResNetStem<B>,

    /// Stages.
    pub layers: Vec<LayerBlock<B>>,

    /// Head pooling.
    pub avgpool: AdaptiveAvgPool2d,
    /// Head classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> ResNetMeta for ResNet<B> {
    fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn num_stages(&self) -> usize {
        self.layers.len()
    }

    fn num_blocks(&self) -> usize {
        self.layers.iter().map(|stage| stage.len()).sum()
    }

    fn head_planes(&self) -> usize {
        self.fc.weight.dims()[0]
    }

    fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    fn stride(&self) -> usize {
        self.layers
            .iter()
            .fold(STEM_STRIDE, |acc, stage| acc * stage.stride())
    }
}

impl<B: Backend> ResNet<B> {
    /// `ResNet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``;
    ///   the resolution must be a multiple of [`ResNetMeta::stride`].
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())],
        );

        // Stem
        let x = self.stem.forward(input);

        // Residual stages
        let x = self.layers.iter().fold(x, |x, stage| stage.forward(x));

        // Head
        let x = self.avgpool.forward(x);
        // Reshape [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);
        let x = self.fc.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())]
        );

        x
    }

    /// The stage modules.
    pub fn stages(&self) -> &[LayerBlock<B>] {
        &self.layers
    }

    /// Re-initialize the classifier with the specified number of output classes.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let [d_input, _d_output] = self.fc.weight.dims();
        self.fc = LinearConfig::new(d_input, num_classes).init(&self.fc.weight.device());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::errors::{BlockShapeError, StageError};
    use crate::models::resnet::residual_block::ResidualBlockMeta;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};

    fn presets() -> Vec<(ResNetConfig, BlockKind, [usize; 4])> {
        vec![
            (ResNetConfig::resnet18(), BlockKind::Basic, [2, 2, 2, 2]),
            (ResNetConfig::resnet34(), BlockKind::Basic, [3, 4, 6, 3]),
            (ResNetConfig::resnet50(), BlockKind::Bottleneck, [3, 4, 6, 3]),
            (
                ResNetConfig::resnet101(),
                BlockKind::Bottleneck,
                [3, 4, 23, 3],
            ),
            (
                ResNetConfig::resnet152(),
                BlockKind::Bottleneck,
                [3, 8, 36, 3],
            ),
        ]
    }

    #[test]
    fn test_presets() {
        for (config, kind, layers) in presets() {
            assert_eq!(config.block, kind);
            assert_eq!(config.layers, layers);
            assert_eq!(config.num_classes, 1000);
            assert_eq!(config.in_channels, 3);
            assert_eq!(config.stem_width, 64);
        }
        assert_eq!(ResNetConfig::resnet18().expansion(), 1);
        assert_eq!(ResNetConfig::resnet34().expansion(), 1);
        assert_eq!(ResNetConfig::resnet50().expansion(), 4);
        assert_eq!(ResNetConfig::resnet101().expansion(), 4);
        assert_eq!(ResNetConfig::resnet152().expansion(), 4);
    }

    #[test]
    fn test_preset_structures() {
        for (config, kind, layers) in presets() {
            let expansion = kind.expansion();
            let structure = config.to_structure();
            structure.expect_valid();

            assert_eq!(structure.num_stages(), 4);
            assert_eq!(structure.num_blocks(), layers.iter().sum::<usize>());
            assert_eq!(structure.head_planes(), 512 * expansion);
            assert_eq!(structure.stride(), 32);
            assert_eq!(structure.num_classes(), 1000);

            let mut running_planes = 64;
            for (idx, stage) in structure.layers.iter().enumerate() {
                let planes = STAGE_WIDTHS[idx];
                let out_planes = planes * expansion;

                assert_eq!(stage.len(), layers[idx]);
                assert_eq!(stage.in_planes(), running_planes);
                assert_eq!(stage.out_planes(), out_planes);
                assert_eq!(stage.stride(), STAGE_STRIDES[idx]);

                let first = &stage.blocks[0];
                assert_eq!(first.kind(), kind);
                assert_eq!(first.planes(), planes);
                assert_eq!(first.out_planes(), out_planes);
                assert_eq!(first.stride(), STAGE_STRIDES[idx]);
                assert_eq!(
                    first.has_downsample(),
                    STAGE_STRIDES[idx] != 1 || running_planes != out_planes
                );

                for block in &stage.blocks[1..] {
                    assert_eq!(block.kind(), kind);
                    assert_eq!(block.in_planes(), out_planes);
                    assert_eq!(block.out_planes(), out_planes);
                    assert_eq!(block.stride(), 1);
                    assert!(!block.has_downsample());
                }

                running_planes = out_planes;
            }
        }
    }

    #[test]
    fn test_stage_one_shortcut() {
        // Basic: 64 -> 64 at stride 1; no shortcut.
        let structure = ResNetConfig::resnet18().to_structure();
        assert!(!structure.layers[0].blocks[0].has_downsample());

        // Bottleneck: 64 -> 256 at stride 1; shortcut.
        let structure = ResNetConfig::resnet50().to_structure();
        assert!(structure.layers[0].blocks[0].has_downsample());
        assert_eq!(
            structure
                .layers
                .iter()
                .map(|s| s.in_planes())
                .collect::<Vec<_>>(),
            vec![64, 256, 512, 1024]
        );
    }

    #[test]
    fn test_structure_validation() {
        let mut structure = ResNetConfig::resnet18().to_structure();
        structure.layers.pop();
        assert_eq!(
            structure.try_validate().unwrap_err(),
            ResNetConfigError::StageCount { found: 3 }
        );

        let structure = ResNetConfig::resnet18()
            .with_num_classes(0)
            .to_structure();
        assert_eq!(
            structure.try_validate().unwrap_err(),
            ResNetConfigError::NoClasses
        );

        // A stage that does not consume the previous stage's width.
        let mut structure = ResNetConfig::resnet18().to_structure();
        structure.layers[2] = LayerBlockConfig::build(BlockKind::Basic, 64, 256, 2, 2);
        let err = structure.try_validate().unwrap_err();
        assert_eq!(
            err,
            ResNetConfigError::StageChain {
                stage: 2,
                expected: 128,
                found: 64
            }
        );
        assert_eq!(
            err.to_string(),
            "stage 2: in_planes(64) != previous out_planes(128)"
        );

        // A first block stripped of its required shortcut.
        let mut structure = ResNetConfig::resnet50().to_structure();
        structure.layers[1].blocks[0] = BlockKind::Bottleneck.build_config(256, 128, 2, None);
        let err = structure.try_validate().unwrap_err();
        assert_eq!(
            err,
            StageError::Block {
                block: 0,
                source: BlockShapeError::MissingShortcut {
                    in_planes: 256,
                    out_planes: 512,
                    stride: 2,
                },
            }
            .at_stage(1)
        );
        assert_eq!(
            err.to_string(),
            "stage 1: block 0: missing shortcut: in_planes(256) -> out_planes(512) with stride 2"
        );
    }

    #[test]
    fn test_stem_validation() {
        type B = NdArray<f32>;
        let device = Default::default();

        let result = ResNetConfig::new(BlockKind::Basic, [1, 1, 1, 1])
            .with_in_channels(0)
            .try_init::<B>(&device);
        let err = result.unwrap_err();
        assert_eq!(
            err,
            ResNetConfigError::Stem {
                source: BlockShapeError::ZeroSize {
                    field: "in_channels"
                },
            }
        );
        assert_eq!(err.to_string(), "stem: in_channels must be non-zero");

        let err = ResNetConfig::resnet18()
            .with_stem_width(0)
            .to_structure()
            .try_validate()
            .unwrap_err();
        assert_eq!(
            err,
            ResNetConfigError::Stem {
                source: BlockShapeError::ZeroSize { field: "width" },
            }
        );
        assert_eq!(err.to_string(), "stem: width must be non-zero");
    }

    #[test]
    fn test_try_init_empty_stage() {
        type B = NdArray<f32>;
        let device = Default::default();

        let result = ResNetConfig::new(BlockKind::Basic, [2, 0, 2, 2]).try_init::<B>(&device);
        assert_eq!(
            result.unwrap_err(),
            ResNetConfigError::Stage {
                stage: 1,
                source: StageError::Empty,
            }
        );
    }

    #[test]
    #[should_panic(expected = "stage 3: stage has no blocks")]
    fn test_init_panics_on_empty_stage() {
        type B = NdArray<f32>;
        let device = Default::default();

        let _model: ResNet<B> = ResNetConfig::new(BlockKind::Basic, [1, 1, 1, 0]).init(&device);
    }

    #[test]
    fn test_resnet_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetConfig::new(BlockKind::Bottleneck, [1, 1, 1, 1])
            .with_num_classes(10)
            .init(&device);

        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.num_stages(), 4);
        assert_eq!(model.num_blocks(), 4);
        assert_eq!(model.head_planes(), 2048);
        assert_eq!(model.num_classes(), 10);
        assert_eq!(model.stride(), 32);

        let widths: Vec<usize> = model.stages().iter().map(|s| s.out_planes()).collect();
        assert_eq!(widths, vec![256, 512, 1024, 2048]);

        let model = model.with_classes(3);
        assert_eq!(model.num_classes(), 3);
        assert_eq!(model.head_planes(), 2048);
    }

    #[test]
    fn test_resnet18_forward_224() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetConfig::resnet18().init(&device);

        let input = Tensor::ones([1, 3, 224, 224], &device);
        let output = model.forward(input);

        assert_shape_contract!(
            ["batch", "num_classes"],
            &output,
            &[("batch", 1), ("num_classes", 1000)],
        );
    }

    #[test]
    fn test_resnet50_forward_224() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetConfig::resnet50().init(&device);
        assert_eq!(model.head_planes(), 2048);

        let output = model.forward(Tensor::ones([1, 3, 224, 224], &device));

        assert_shape_contract!(
            ["batch", "num_classes"],
            &output,
            &[("batch", 1), ("num_classes", 1000)],
        );
    }

    #[test]
    fn test_small_forward_all_kinds() {
        type B = NdArray<f32>;
        let device = Default::default();

        for kind in [BlockKind::Basic, BlockKind::Bottleneck] {
            let model: ResNet<B> = ResNetConfig::new(kind, [1, 2, 1, 1])
                .with_num_classes(7)
                .init(&device);

            let input = Tensor::ones([2, 3, 64, 64], &device);
            let output = model.forward(input);

            assert_shape_contract!(
                ["batch", "num_classes"],
                &output,
                &[("batch", 2), ("num_classes", 7)],
            );
        }
    }

    #[test]
    fn test_grayscale_input() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetConfig::new(BlockKind::Basic, [1, 1, 1, 1])
            .with_in_channels(1)
            .with_num_classes(10)
            .init(&device);

        let output = model.forward(Tensor::ones([1, 1, 32, 32], &device));
        assert_eq!(output.dims(), [1, 10]);
    }

    #[test]
    fn test_backward_reaches_stem() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let model: ResNet<B> = ResNetConfig::new(BlockKind::Basic, [1, 1, 1, 1])
            .with_num_classes(4)
            .init(&device);

        let input = Tensor::ones([2, 3, 32, 32], &device);
        let loss = model.forward(input).sum();
        let grads = loss.backward();

        let stem_grad = model.stem.conv_norm.conv.weight.grad(&grads);
        assert!(stem_grad.is_some());
        let fc_grad = model.fc.weight.grad(&grads);
        assert_eq!(fc_grad.map(|g| g.dims()), Some([512, 4]));
    }

    #[test]
    #[ignore = "slow on the ndarray backend"]
    fn test_all_presets_forward_224() {
        type B = NdArray<f32>;
        let device = Default::default();

        for (config, _, _) in presets() {
            let model: ResNet<B> = config.init(&device);
            let output = model.forward(Tensor::ones([1, 3, 224, 224], &device));
            assert_eq!(output.dims(), [1, 1000]);
        }
    }
}
