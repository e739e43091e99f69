#![warn(missing_docs)]
//!# resnet-study - The `ResNet` Family on Burn
//!
//! ## Notable Components
//!
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::conv_norm`] - ``Conv2d + BatchNorm2d`` block.
//! * [`models`] - complete model families.
//!   * [`models::resnet`] - `ResNet-18/34/50/101/152`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use resnet_study::models::resnet::{ResNet, ResNetConfig};
//!
//! let model: ResNet<B> = ResNetConfig::resnet50().init(&device);
//! let logits = model.forward(images); // [batch, 1000]
//! ```

pub mod layers;
pub mod models;
