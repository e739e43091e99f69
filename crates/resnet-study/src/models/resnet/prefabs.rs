//! # `ResNet` Presets
//!
//! The well-known `ResNet` depths, selectable by name.
//!
//! ```rust,ignore
//! let preset: ResNetPreset = "resnet50".parse()?;
//! let model: ResNet<B> = preset.config().with_num_classes(10).init(&device);
//! ```

use crate::models::resnet::errors::UnknownPresetError;
use crate::models::resnet::residual_block::BlockKind;
use crate::models::resnet::resnet_model::{
    RESNET18_BLOCKS, RESNET34_BLOCKS, RESNET50_BLOCKS, RESNET101_BLOCKS, RESNET152_BLOCKS,
    ResNetConfig,
};
use std::fmt;
use std::str::FromStr;

/// A well-known `ResNet` preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResNetPreset {
    /// `resnet18`
    ResNet18,
    /// `resnet34`
    ResNet34,
    /// `resnet50`
    ResNet50,
    /// `resnet101`
    ResNet101,
    /// `resnet152`
    ResNet152,
}

impl ResNetPreset {
    /// All presets, shallowest first.
    pub const ALL: [ResNetPreset; 5] = [
        Self::ResNet18,
        Self::ResNet34,
        Self::ResNet50,
        Self::ResNet101,
        Self::ResNet152,
    ];

    /// The preset name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResNet18 => "resnet18",
            Self::ResNet34 => "resnet34",
            Self::ResNet50 => "resnet50",
            Self::ResNet101 => "resnet101",
            Self::ResNet152 => "resnet152",
        }
    }

    /// The block variant.
    pub fn block_kind(&self) -> BlockKind {
        match self {
            Self::ResNet18 | Self::ResNet34 => BlockKind::Basic,
            _ => BlockKind::Bottleneck,
        }
    }

    /// The stage depths.
    pub fn layers(&self) -> [usize; 4] {
        match self {
            Self::ResNet18 => RESNET18_BLOCKS,
            Self::ResNet34 => RESNET34_BLOCKS,
            Self::ResNet50 => RESNET50_BLOCKS,
            Self::ResNet101 => RESNET101_BLOCKS,
            Self::ResNet152 => RESNET152_BLOCKS,
        }
    }

    /// The preset config; 1000 classes.
    pub fn config(&self) -> ResNetConfig {
        ResNetConfig::new(self.block_kind(), self.layers())
    }
}

impl fmt::Display for ResNetPreset {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResNetPreset {
    type Err = UnknownPresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == name)
            .ok_or_else(|| UnknownPresetError {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_names() {
        let names: Vec<&str> = ResNetPreset::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec!["resnet18", "resnet34", "resnet50", "resnet101", "resnet152"]
        );

        for preset in ResNetPreset::ALL {
            assert_eq!(preset.to_string(), preset.name());
            assert_eq!(preset.name().parse::<ResNetPreset>(), Ok(preset));
        }

        assert_eq!(
            "ResNet50".parse::<ResNetPreset>(),
            Ok(ResNetPreset::ResNet50)
        );
    }

    #[test]
    fn test_unknown_preset() {
        let err = "resnet20".parse::<ResNetPreset>().unwrap_err();
        assert_eq!(
            err,
            UnknownPresetError {
                name: "resnet20".to_string()
            }
        );
        assert_eq!(err.to_string(), "unknown ResNet preset: \"resnet20\"");
    }

    #[test]
    fn test_preset_configs_match_constructors() {
        let pairs = [
            (ResNetPreset::ResNet18, ResNetConfig::resnet18()),
            (ResNetPreset::ResNet34, ResNetConfig::resnet34()),
            (ResNetPreset::ResNet50, ResNetConfig::resnet50()),
            (ResNetPreset::ResNet101, ResNetConfig::resnet101()),
            (ResNetPreset::ResNet152, ResNetConfig::resnet152()),
        ];
        for (preset, expected) in pairs {
            let config = preset.config();
            assert_eq!(config.block, expected.block);
            assert_eq!(config.layers, expected.layers);
            assert_eq!(config.num_classes, 1000);
            assert_eq!(config.block.expansion(), preset.block_kind().expansion());
        }
    }
}
