//! soundclass CLI binary
//! MFCC front-end + Candle classifier over WAV files or a live microphone.

use anyhow::{Context, Result, bail};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod cli;
use cli::{Cli, Commands};

use soundclass::audio::{Sample, WavSource, read_wav};
use soundclass::classifier::{ModelSave, argmax};
use soundclass::{
    AcquisitionError, CandleClassifier, ClassLabels, Classifier, ClassifierModel,
    FeatureExtractor, FeatureNormalizer, Pipeline, PipelineError, PredictionResponse,
    SoundClassConfig, TensorDescriptor,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => SoundClassConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SoundClassConfig::default(),
    };

    match cli.command {
        Commands::Classify(cmd) => classify_wav(&cfg, cmd),
        Commands::Features(cmd) => print_features(&cfg, cmd),
        Commands::Inspect(cmd) => inspect_model(cmd),
        Commands::InitModel(cmd) => init_model(&cfg, cmd),
        #[cfg(feature = "microphone")]
        Commands::Listen(cmd) => listen(&cfg, cmd),
        #[cfg(feature = "microphone")]
        Commands::Record(cmd) => record(&cfg, cmd),
        #[cfg(feature = "microphone")]
        Commands::ListDevices => {
            for name in soundclass::audio::MicrophoneSource::list_devices()? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

/// Ctrl-C raises the returned flag.
fn stop_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let s = Arc::clone(&stop);
    ctrlc::set_handler(move || s.store(true, Ordering::Release))
        .context("installing Ctrl-C handler")?;
    Ok(stop)
}

/// Load the model; its own label table names the classifier's outputs.
fn load_classifier(
    cfg: &SoundClassConfig,
    model: Option<PathBuf>,
) -> Result<(CandleClassifier, ClassLabels)> {
    let Some(path) = model.or_else(|| cfg.classifier.model_path.clone()) else {
        bail!("no model given: pass --model or set classifier.model_path");
    };
    let model = ClassifierModel::open(&path)
        .with_context(|| format!("opening model {}", path.display()))?;
    let classifier = CandleClassifier::new(&model)?;
    let labels = ClassLabels::new(classifier.labels().unwrap_or_default())?;
    info!(
        "Loaded {} model ({} parameters, {} classes)",
        classifier.m_type(),
        model.parameter_count(),
        labels.len()
    );
    Ok((classifier, labels))
}

fn print_response(outcome: &Result<soundclass::Prediction, PipelineError>) {
    match PredictionResponse::from(outcome).to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => error!("Failed to encode response: {e}"),
    }
}

fn classify_wav(cfg: &SoundClassConfig, cmd: cli::ClassifyCommand) -> Result<()> {
    let (classifier, labels) = load_classifier(cfg, cmd.model)?;
    let source = WavSource::open(&cmd.wav)
        .with_context(|| format!("opening {}", cmd.wav.display()))?;
    let mut pipeline = Pipeline::new(cfg, source, classifier, labels)?;
    let stop = stop_flag()?;

    let mut frames = 0u64;
    while !stop.load(Ordering::Acquire) {
        let outcome = pipeline.run_cycle();
        // trailing partial frame: end of file
        if let Err(PipelineError::Acquisition(AcquisitionError::ShortRead { .. })) = outcome {
            break;
        }
        print_response(&outcome);
        frames += 1;
        if cmd.cycles.is_some_and(|n| frames >= n) {
            break;
        }
    }
    let stats = pipeline.stats();
    info!(
        "Classified {} frames ({} acquisition failures, {} classification failures)",
        stats.classifications, stats.acquisition_failures, stats.classification_failures
    );
    Ok(())
}

fn print_features(cfg: &SoundClassConfig, cmd: cli::FeaturesCommand) -> Result<()> {
    let (samples, rate) =
        read_wav(&cmd.wav).with_context(|| format!("reading {}", cmd.wav.display()))?;
    if rate != cfg.capture.sample_rate {
        warn!(
            "{} is {rate} Hz, filterbank is built for {} Hz",
            cmd.wav.display(),
            cfg.capture.sample_rate
        );
    }
    let extractor = FeatureExtractor::new(cfg)?;
    let signal: Vec<f32> = samples.iter().map(|&s| s.into_f32()).collect();
    let mut frames = extractor.cepstrogram(&signal);
    if cmd.cmn {
        FeatureNormalizer::mean_centre(&mut frames);
    }
    info!("{} windows of {} coefficients", frames.len(), extractor.dct().num_coeffs());

    let out = serde_json::json!({
        "sample_rate": rate,
        "window_length": extractor.window_len(),
        "hop_length": extractor.hop_len(),
        "mean_centred": cmd.cmn,
        "frames": frames,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn inspect_model(cmd: cli::InspectCommand) -> Result<()> {
    let model = ClassifierModel::open(&cmd.model_path)
        .with_context(|| format!("opening model {}", cmd.model_path.display()))?;

    println!("Model: {}", cmd.model_path.display());
    println!("  format version : {}", model.version());
    println!("  type           : {}", model.m_type);
    println!("  input          : {} x {}", model.input.len, model.input.dtype);
    if model.input.dtype == soundclass::InputType::I8 {
        println!(
            "  quantisation   : scale={} zero_point={}",
            model.input.scale, model.input.zero_point
        );
    }
    println!("  parameters     : {}", model.parameter_count());
    println!("  labels         : {}", model.labels.join(", "));
    for (name, t) in model.weights.iter() {
        println!("    {name:<12} {:?}", t.dims);
    }

    // smoke-run on zeros so a broken file fails here rather than at runtime
    let mut classifier = CandleClassifier::new(&model)?;
    let logits = classifier.logits(&soundclass::ClassifierInput::for_descriptor(&model.input))?;
    if argmax(&logits).is_none() {
        warn!("Model produced no finite logits on a zero input");
    }
    Ok(())
}

fn init_model(cfg: &SoundClassConfig, cmd: cli::InitModelCommand) -> Result<()> {
    let labels = if cmd.labels.is_empty() {
        cfg.classifier.labels.clone()
    } else {
        cmd.labels.iter().map(|s| s.trim().to_string()).collect()
    };
    let input = if cmd.int8 {
        TensorDescriptor::int8(cfg.feature_len(), cmd.scale, cmd.zero_point)
    } else {
        TensorDescriptor::float(cfg.feature_len())
    };
    let model = CandleClassifier::fresh_model(cmd.model_type, input, labels)?;
    model
        .save_to_file(&cmd.output)
        .with_context(|| format!("writing {}", cmd.output.display()))?;
    info!(
        "Wrote untrained {} model ({} parameters) to {}",
        model.m_type,
        model.parameter_count(),
        cmd.output.display()
    );
    Ok(())
}

#[cfg(feature = "microphone")]
fn listen(cfg: &SoundClassConfig, cmd: cli::ListenCommand) -> Result<()> {
    use soundclass::audio::MicrophoneSource;

    let (classifier, labels) = load_classifier(cfg, cmd.model)?;
    let source = MicrophoneSource::new(cmd.device, cfg.capture.sample_rate);
    let mut pipeline = Pipeline::new(cfg, source, classifier, labels)?;
    let stop = stop_flag()?;
    info!("Listening, press Ctrl-C to stop");
    pipeline.run(&stop, print_response);
    Ok(())
}

#[cfg(feature = "microphone")]
fn record(cfg: &SoundClassConfig, cmd: cli::RecordCommand) -> Result<()> {
    use soundclass::Recorder;
    use soundclass::audio::MicrophoneSource;

    let mut recorder = Recorder::new(cfg);
    if let Some(secs) = cmd.seconds {
        recorder = recorder.with_samples(secs as usize * cfg.capture.sample_rate as usize);
    }
    let source = MicrophoneSource::new(cmd.device, cfg.capture.sample_rate);
    let handle = recorder.start(&cmd.category, source)?;
    info!("Recording to {}", handle.path().display());
    let summary = handle.join()?;
    info!("Saved {} samples to {}", summary.samples, summary.path.display());
    Ok(())
}
