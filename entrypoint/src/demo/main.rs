mod args;
mod errors;

use std::{fs, process, sync::Arc};

use args::{Args, RetryMode};
use binding::{ImgCacheBinding, MemoryElement, Scope};
use clap::Parser;
use common::{binding::BindingKind, config::CacheConfig};
use errors::DemoError;
use image_cache::{ImgCache, MemoryEngine, RetryCallbacks, RetryDecision};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use utils::logger::configure_logger;

const RETRY_PROVIDER: &str = "demoRetry";

#[tokio::main]
async fn main() {
    configure_logger();

    let args = Args::parse();

    if let Err(err) = run(args).await {
        error!("{err}");
        process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<CacheConfig, DemoError> {
    let config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|err| DemoError::ConfigUnreadable(path.display().to_string(), err))?;
            CacheConfig::from_json(&raw)?
        }
        None => CacheConfig::default(),
    };

    let mut builder = config.with_env_overrides().into_builder();

    if args.disable_cache {
        builder = builder.disable_cache(true);
    }

    if args.retry != RetryMode::None {
        builder = builder.retry_callback_provider(RETRY_PROVIDER);
    }

    for option in &args.options {
        let Some((name, raw_value)) = option.split_once('=') else {
            return Err(DemoError::InvalidOption(option.clone()));
        };

        // bare words are taken as strings
        let value = serde_json::from_str::<Value>(raw_value)
            .unwrap_or_else(|_| Value::String(raw_value.to_string()));

        builder = builder.set_option(name, value);
    }

    Ok(builder.build())
}

fn retry_callbacks(mode: RetryMode, alternate: String) -> RetryCallbacks {
    match mode {
        RetryMode::None => RetryCallbacks::new(),
        RetryMode::Defer => RetryCallbacks::new().register_fn(RETRY_PROVIDER, |src, err| async move {
            warn!("Deferring {src} after: {err}");
            Ok(RetryDecision::Defer)
        }),
        RetryMode::Alternate => RetryCallbacks::new().register_fn(RETRY_PROVIDER, move |src, err| {
            let alternate = alternate.clone();
            async move {
                warn!("Replacing {src} with {alternate} after: {err}");
                Ok(RetryDecision::Alternate(alternate))
            }
        }),
    }
}

fn report(kind: BindingKind, elements: &[(String, Arc<MemoryElement>)]) {
    for (src, element) in elements {
        let shown = match kind {
            BindingKind::Src => element.src(),
            BindingKind::Background => element.background_image(),
        };

        info!("{src} -> {}", shown.unwrap_or_else(|| "<blank>".to_string()));
    }
}

async fn run(args: Args) -> Result<(), DemoError> {
    let config = load_config(&args)?;
    let manual_init = config.manual_init;

    debug!("Using {config:?}");

    let mut engine = MemoryEngine::new(args.local_root.clone());
    for src in &args.cached {
        engine = engine.with_cached(src.clone());
    }
    for src in &args.fail {
        engine = engine.with_cache_failure(src.clone(), "simulated download failure");
    }
    let engine = Arc::new(engine);

    let cache = ImgCache::new(
        engine.clone(),
        config,
        retry_callbacks(args.retry, args.alternate.clone()),
    );
    let controller = ImgCacheBinding::new(cache.clone());

    let kind = match args.background {
        true => BindingKind::Background,
        false => BindingKind::Src,
    };

    let scope = Scope::new();
    let mut elements = Vec::new();
    let mut handles = Vec::new();

    for src in &args.sources {
        let element = Arc::new(MemoryElement::new());
        let linked = controller.link(&scope, element.clone());

        handles.push(linked.observe(kind, src.clone()));
        elements.push((src.clone(), element));
    }

    if manual_init {
        info!("Starting cache engine manually");
        cache.init();
    }

    for handle in handles {
        let outcome = handle.await?;
        debug!("{outcome:?}");
    }

    report(kind, &elements);

    if !controller.registry().is_empty() {
        info!(
            "{} loads pending, letting failed downloads through",
            controller.registry().len()
        );

        for src in &args.fail {
            engine.clear_cache_failure(src);
            controller.resolve_pending(src).await;
        }

        report(kind, &elements);
    }

    scope.destroy();

    let stats = engine.stats();
    info!(
        "Engine saw {} lookups, {} downloads, {} resolutions",
        stats.lookups, stats.downloads, stats.resolutions
    );

    Ok(())
}
