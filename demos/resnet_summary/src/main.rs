#![recursion_limit = "256"]

use burn::backend::NdArray;
use burn::module::Module;
use burn::prelude::Tensor;
use burn::tensor::Distribution;
use clap::Parser;
use resnet_study::models::resnet::layer_block::LayerBlockMeta;
use resnet_study::models::resnet::residual_block::ResidualBlockMeta;
use resnet_study::models::resnet::{ResNet, ResNetMeta, ResNetPreset};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Preset architecture: resnet18, resnet34, resnet50, resnet101, resnet152.
    #[arg(long, default_value = "resnet18")]
    arch: ResNetPreset,

    /// Number of classifier outputs.
    #[arg(long, default_value = "1000")]
    num_classes: usize,

    /// Number of images in the forward batch.
    #[arg(long, default_value = "1")]
    batch_size: usize,

    /// Square input resolution; a positive multiple of 32.
    #[arg(long, default_value = "224")]
    resolution: usize,

    /// Print the module tree.
    #[arg(long)]
    print_model: bool,
}

/// Reject input shapes the forward pass cannot take.
fn check_input(
    batch_size: usize,
    resolution: usize,
    stride: usize,
) -> anyhow::Result<()> {
    if batch_size == 0 {
        anyhow::bail!("batch size must be non-zero");
    }
    if resolution == 0 || resolution % stride != 0 {
        anyhow::bail!(
            "resolution {resolution} is not a positive multiple of the model stride {stride}"
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    type B = NdArray<f32>;
    let device = Default::default();

    let structure = args
        .arch
        .config()
        .with_num_classes(args.num_classes)
        .to_structure();
    structure.try_validate()?;

    check_input(args.batch_size, args.resolution, structure.stride())?;

    tracing::info!(
        arch = %args.arch,
        kind = %args.arch.block_kind(),
        blocks = structure.num_blocks(),
        head_planes = structure.head_planes(),
        num_classes = structure.num_classes(),
        "structure"
    );
    for (idx, stage) in structure.layers.iter().enumerate() {
        tracing::info!(
            stage = idx,
            blocks = stage.len(),
            in_planes = stage.in_planes(),
            out_planes = stage.out_planes(),
            stride = stage.stride(),
            shortcut = stage.blocks.iter().any(|block| block.has_downsample()),
            "stage"
        );
    }

    let model: ResNet<B> = structure.try_init(&device)?;
    tracing::info!(params = model.num_params(), "initialized {}", args.arch);

    if args.print_model {
        println!("{model}");
    }

    let input: Tensor<B, 4> = Tensor::random(
        [
            args.batch_size,
            model.in_channels(),
            args.resolution,
            args.resolution,
        ],
        Distribution::Normal(0.0, 1.0),
        &device,
    );
    let output = model.forward(input);
    tracing::info!(shape = ?output.dims(), "output");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_input() {
        assert!(check_input(1, 224, 32).is_ok());
        assert!(check_input(4, 64, 32).is_ok());

        let err = check_input(0, 224, 32).unwrap_err();
        assert_eq!(err.to_string(), "batch size must be non-zero");

        let err = check_input(1, 0, 32).unwrap_err();
        assert_eq!(
            err.to_string(),
            "resolution 0 is not a positive multiple of the model stride 32"
        );

        assert!(check_input(1, 100, 32).is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["resnet_summary"]);
        assert_eq!(args.arch, ResNetPreset::ResNet18);
        assert_eq!(args.num_classes, 1000);
        assert_eq!(args.batch_size, 1);
        assert_eq!(args.resolution, 224);
        assert!(!args.print_model);

        let args = Args::parse_from(["resnet_summary", "--arch", "resnet50", "--resolution", "0"]);
        assert_eq!(args.arch, ResNetPreset::ResNet50);
        assert!(check_input(args.batch_size, args.resolution, 32).is_err());
    }
}
