use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, bail, eyre};
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pictor::application::{FetchEngine, LoadOutcome, PersistService, RequestCoordinator};
use pictor::domain::entities::{ImageRef, LoadRequest, PersistState};
use pictor::domain::errors::PersistError;
use pictor::domain::ports::{AlwaysAlive, DisplayTarget, PersistListener};
use pictor::infrastructure::{
    AppConfig, CacheManager, CliArgs, Command, HttpFetcher, ImageCrateCodec, StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

/// Writes whatever the pipeline delivers to a PNG file.
struct FileTarget {
    out: PathBuf,
    written: Mutex<Option<std::result::Result<(), String>>>,
}

impl FileTarget {
    fn new(out: PathBuf) -> Self {
        Self {
            out,
            written: Mutex::new(None),
        }
    }

    fn save(&self, image: &DynamicImage) {
        let result = image
            .save_with_format(&self.out, ImageFormat::Png)
            .map_err(|e| e.to_string());
        *self.written.lock() = Some(result);
    }
}

impl DisplayTarget for FileTarget {
    fn set_image(&self, image: Arc<DynamicImage>) {
        self.save(&image);
    }

    fn set_placeholder(&self, placeholder: &ImageRef) {
        debug!(placeholder = !placeholder.is_none(), "Load started");
    }

    fn set_error(&self, fallback: &ImageRef) {
        if let Some(image) = fallback.render(1, 1) {
            self.save(&image);
        }
    }
}

struct PrintListener;

impl PersistListener for PrintListener {
    fn on_success(&self, path: &Path) {
        println!("{}", path.display());
    }

    fn on_fail(&self, error: &PersistError) {
        eprintln!("download failed: {error}");
    }
}

async fn run(args: CliArgs, config: AppConfig) -> Result<()> {
    let caches = CacheManager::open(&config.cache_manager_config()).await?;
    let fetcher = Arc::new(HttpFetcher::new(config.timeout(), &config.network.user_agent)?);

    match args.command {
        Command::Load {
            url,
            out,
            transforms,
            size,
            strategy,
            skip_memory_cache,
        } => {
            let engine = FetchEngine::new(
                caches.clone(),
                fetcher,
                Arc::new(ImageCrateCodec),
                config.fetch_engine_config(),
            );
            let coordinator = RequestCoordinator::new(engine);

            let mut request = LoadRequest::builder(url)
                .transforms(transforms)
                .disk_cache_strategy(strategy)
                .skip_memory_cache(skip_memory_cache);
            if let Some(size) = size {
                request = request.target_size(size);
            }

            let target = FileTarget::new(out);
            let outcome = coordinator.load(request.build(), &target, &AlwaysAlive).await;
            info!(?outcome, "Load finished");

            match outcome {
                LoadOutcome::Delivered(source) => {
                    if let Some(Err(e)) = target.written.lock().take() {
                        bail!("failed to write {}: {e}", target.out.display());
                    }
                    println!("{} (from {source})", target.out.display());
                }
                LoadOutcome::FallbackDelivered(kind) => bail!("load failed: {kind} error"),
                LoadOutcome::Discarded => bail!("load discarded"),
            }
        }
        Command::Download { url } => {
            let persist = PersistService::new(caches, fetcher, config.persist_config());
            let handle = persist.persist(url, Arc::new(PrintListener));
            let state = handle.wait().await;
            if state != PersistState::Succeeded {
                return Err(eyre!("download {state}"));
            }
        }
        Command::ClearCache => {
            caches.clear_all().await;
            println!("cache cleared: {}", caches.disk().dir().display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = pictor::VERSION, "Starting {}", pictor::NAME);

    run(args, config).await
}
