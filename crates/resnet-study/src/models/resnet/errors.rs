//! # `ResNet` Topology Errors
//!
//! Construction-time shape errors, nested by location:
//! [`ResNetConfigError`] > [`StageError`] > [`BlockShapeError`].

use thiserror::Error;

/// Shape violations local to a single residual block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockShapeError {
    /// A size or stride field is zero.
    #[error("{field} must be non-zero")]
    ZeroSize {
        /// The offending field.
        field: &'static str,
    },

    /// The main path changes shape, but there is no shortcut projection.
    #[error(
        "missing shortcut: in_planes({in_planes}) -> out_planes({out_planes}) with stride {stride}"
    )]
    MissingShortcut {
        /// Block input planes.
        in_planes: usize,
        /// Block output planes.
        out_planes: usize,
        /// Block stride.
        stride: usize,
    },

    /// The main path preserves shape, but a shortcut projection is present.
    #[error("unneeded shortcut: block preserves shape ({planes} planes, stride 1)")]
    UnneededShortcut {
        /// Block in/out planes.
        planes: usize,
    },

    /// The shortcut projection does not map the block's in/out planes.
    #[error(
        "shortcut maps {shortcut_in}->{shortcut_out} planes; block maps {in_planes}->{out_planes}"
    )]
    ShortcutChannels {
        /// Shortcut input channels.
        shortcut_in: usize,
        /// Shortcut output channels.
        shortcut_out: usize,
        /// Block input planes.
        in_planes: usize,
        /// Block output planes.
        out_planes: usize,
    },

    /// The shortcut projection stride differs from the block stride.
    #[error("shortcut stride ({shortcut}) != block stride ({block})")]
    ShortcutStride {
        /// Shortcut stride.
        shortcut: usize,
        /// Block stride.
        block: usize,
    },
}

/// Shape violations within one stage ([`super::layer_block::LayerBlockConfig`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The stage has no blocks.
    #[error("stage has no blocks")]
    Empty,

    /// A block is malformed.
    #[error("block {block}: {source}")]
    Block {
        /// Block index within the stage.
        block: usize,
        /// The block error.
        #[source]
        source: BlockShapeError,
    },

    /// A block does not consume the previous block's output planes.
    #[error("block {block}: in_planes({found}) != previous out_planes({expected})")]
    Chain {
        /// Block index within the stage.
        block: usize,
        /// Output planes of the previous block.
        expected: usize,
        /// Input planes of this block.
        found: usize,
    },

    /// A block other than the first changes resolution.
    #[error("block {block}: stride {stride} != 1; only the first block of a stage may downsample")]
    LateStride {
        /// Block index within the stage.
        block: usize,
        /// The offending stride.
        stride: usize,
    },
}

/// Shape violations of a whole model ([`super::ResNetStructureConfig`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResNetConfigError {
    /// The model must have exactly four stages.
    #[error("expected 4 stages, found {found}")]
    StageCount {
        /// Number of stages found.
        found: usize,
    },

    /// The stem is malformed.
    #[error("stem: {source}")]
    Stem {
        /// The stem error.
        #[source]
        source: BlockShapeError,
    },

    /// A stage is malformed.
    #[error("stage {stage}: {source}")]
    Stage {
        /// Stage index.
        stage: usize,
        /// The stage error.
        #[source]
        source: StageError,
    },

    /// A stage does not consume the stem's or previous stage's output planes.
    #[error("stage {stage}: in_planes({found}) != previous out_planes({expected})")]
    StageChain {
        /// Stage index.
        stage: usize,
        /// Output planes of the stem or previous stage.
        expected: usize,
        /// Input planes of this stage.
        found: usize,
    },

    /// The classifier has no outputs.
    #[error("num_classes must be non-zero")]
    NoClasses,
}

/// A preset name that matches no known `ResNet` preset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ResNet preset: {name:?}")]
pub struct UnknownPresetError {
    /// The name that was looked up.
    pub name: String,
}

impl StageError {
    /// Attach a stage index.
    pub fn at_stage(
        self,
        stage: usize,
    ) -> ResNetConfigError {
        ResNetConfigError::Stage {
            stage,
            source: self,
        }
    }
}

impl BlockShapeError {
    /// Attach a block index.
    pub fn at_block(
        self,
        block: usize,
    ) -> StageError {
        StageError::Block {
            block,
            source: self,
        }
    }
}
