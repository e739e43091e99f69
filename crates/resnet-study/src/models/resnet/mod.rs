//! # `ResNet`
//!
//! The `ResNet` family from "Deep Residual Learning for Image Recognition"
//! (He et al. 2015).
//!
//! * [`ResNetConfig`] - the high-level config; block kind and stage depths.
//! * [`ResNetStructureConfig`] - the fully expanded, validated topology.
//! * [`ResNet`] - the module.
//! * [`ResNetPreset`] - the named `resnet18` .. `resnet152` presets.

pub mod basic_block;
pub mod bottleneck;
pub mod downsample;
pub mod errors;
pub mod layer_block;
pub mod prefabs;
pub mod residual_block;
pub mod resnet_model;
pub mod stems;
pub mod util;

pub use errors::{BlockShapeError, ResNetConfigError, StageError, UnknownPresetError};
pub use prefabs::ResNetPreset;
pub use residual_block::BlockKind;
pub use resnet_model::{
    RESNET18_BLOCKS, RESNET34_BLOCKS, RESNET50_BLOCKS, RESNET101_BLOCKS, RESNET152_BLOCKS, ResNet,
    ResNetConfig, ResNetMeta, ResNetStructureConfig, STAGE_STRIDES, STAGE_WIDTHS,
};
