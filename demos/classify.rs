use burn::config::Config;
use burn::tensor::{backend::Backend, Distribution, Tensor};
use clap::Parser;
use cnn3d::VolumetricClassifierConfig;
use tracing_core::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, registry, util::SubscriberInitExt, Layer};

#[cfg(any(feature = "tch-cpu", feature = "tch-gpu"))]
use burn::backend::libtorch::{LibTorch, LibTorchDevice};
#[cfg(feature = "ndarray")]
use burn::backend::ndarray::{NdArray, NdArrayDevice};
#[cfg(feature = "wgpu")]
use burn::backend::wgpu::{Wgpu, WgpuDevice};

type Outcome = Result<(), Box<dyn std::error::Error>>;

// CLI arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Score a random clip with the volumetric classifier", long_about = None)]
struct Args {
    /// JSON classifier configuration; the default architecture is used when omitted
    #[clap(long, value_name = "FILE")]
    config: Option<String>,

    /// Write the effective configuration to this file
    #[clap(long, value_name = "FILE")]
    save_config: Option<String>,

    /// Number of clips in the batch
    #[clap(long, default_value_t = 1)]
    batch_size: usize,

    /// Number of best scoring classes to print
    #[clap(long, default_value_t = 5)]
    top: usize,

    /// Seed of the weight initialization and of the random clip
    #[clap(long, default_value_t = 42)]
    seed: u64,

    /// Log at debug level
    #[clap(long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = match verbose {
        true => LevelFilter::DEBUG,
        false => LevelFilter::INFO,
    };
    let layer = tracing_subscriber::fmt::layer().with_filter(level);

    let _ = registry().with(layer).try_init();
}

#[allow(unreachable_code)]
fn main() -> Outcome {
    let args = Args::parse();
    init_logging(args.verbose);

    #[cfg(feature = "wgpu")]
    return run::<Wgpu>(&args, WgpuDevice::default());

    #[cfg(all(feature = "tch-gpu", not(target_os = "macos")))]
    return run::<LibTorch>(&args, LibTorchDevice::Cuda(0));

    #[cfg(all(feature = "tch-gpu", target_os = "macos"))]
    return run::<LibTorch>(&args, LibTorchDevice::Mps);

    #[cfg(feature = "tch-cpu")]
    return run::<LibTorch>(&args, LibTorchDevice::Cpu);

    #[cfg(feature = "ndarray")]
    return run::<NdArray>(&args, NdArrayDevice::Cpu);

    unreachable!("At least one backend will be selected.")
}

fn run<B: Backend>(args: &Args, device: B::Device) -> Outcome {
    log::info!("Running on {device:?}");

    let config = match &args.config {
        Some(path) => VolumetricClassifierConfig::load(path)?,
        None => VolumetricClassifierConfig::new(),
    };
    if let Some(path) = &args.save_config {
        config.save(path)?;
        log::info!("Configuration saved to {path}");
    }

    B::seed(args.seed);

    let model = config.init::<B>(&device)?;
    let geometry = model.geometry();
    log::info!(
        "Input {:?}, conv1 {:?}, conv2 {:?}, fc1 input width {}",
        geometry.input,
        geometry.stage1,
        geometry.stage2,
        geometry.flattened_features().unwrap_or_default()
    );
    log::info!("Mode: {:?}", model.mode());
    println!("{model}");

    let [depth, height, width] = geometry.input;
    let volume = Tensor::<B, 5>::random(
        [args.batch_size, 1, depth, height, width],
        Distribution::Default,
        &device,
    );
    let scores = model.evaluate(volume)?;
    let top = args.top.min(model.num_classes());

    for (clip, row) in scores.iter_dim(0).enumerate() {
        let mut ranked: Vec<(usize, f32)> = row
            .into_data()
            .to_vec::<f32>()
            .map_err(|err| format!("Could not read scores: {err:?}"))?
            .into_iter()
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let best: Vec<String> = ranked
            .iter()
            .take(top)
            .map(|(class, score)| format!("{class} ({score:.4})"))
            .collect();
        println!("Clip {clip}: {}", best.join(", "));
    }

    Ok(())
}
