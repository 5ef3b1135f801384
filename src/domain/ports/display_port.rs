//! Ports for display targets and the liveness of their owning context.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;

use crate::domain::entities::{ImageRef, LoadRequest, LoadedImage};
use crate::domain::errors::{FetchError, PersistError};

/// Surface that shows the outcome of a load.
#[cfg_attr(test, mockall::automock)]
pub trait DisplayTarget: Send + Sync {
    /// Shows the loaded image.
    fn set_image(&self, image: Arc<DynamicImage>);

    /// Shows a placeholder while the load runs.
    fn set_placeholder(&self, placeholder: &ImageRef);

    /// Shows the fallback for a failed load.
    fn set_error(&self, fallback: &ImageRef) {
        self.set_placeholder(fallback);
    }
}

/// Reports whether the context owning a display target still exists.
///
/// Queried synchronously; implementations must not block.
pub trait LivenessProbe: Send + Sync {
    /// Returns false once the owning context has been torn down.
    fn is_alive(&self) -> bool;
}

/// Owner that never goes away, such as a CLI process.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAlive;

impl LivenessProbe for AlwaysAlive {
    fn is_alive(&self) -> bool {
        true
    }
}

/// Liveness flag flipped by the owner on teardown.
#[derive(Debug, Clone)]
pub struct LivenessFlag(Arc<AtomicBool>);

impl LivenessFlag {
    /// Creates a flag for a live owner.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Marks the owner as torn down. Irreversible.
    pub fn destroy(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for LivenessFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessProbe for LivenessFlag {
    fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Observer of load outcomes, notified before the target is touched.
pub trait LoadListener: Send + Sync {
    /// Called when an image is ready.
    fn on_resource_ready(&self, _request: &LoadRequest, _image: &LoadedImage) {}

    /// Called when the load failed.
    fn on_load_failed(&self, _request: &LoadRequest, _error: &FetchError) {}
}

/// Receives the outcome of a persist task exactly once.
pub trait PersistListener: Send + Sync {
    /// The full image now lives at `path`.
    fn on_success(&self, path: &Path);

    /// The task failed or was cancelled.
    fn on_fail(&self, error: &PersistError);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::path::PathBuf;

    use parking_lot::Mutex;

    /// Persist listener recording every callback.
    #[derive(Default)]
    pub struct RecordingPersistListener {
        /// Paths passed to `on_success`.
        pub successes: Mutex<Vec<PathBuf>>,
        /// Messages of errors passed to `on_fail`.
        pub failures: Mutex<Vec<String>>,
    }

    impl RecordingPersistListener {
        /// Total number of callbacks received.
        pub fn callbacks(&self) -> usize {
            self.successes.lock().len() + self.failures.lock().len()
        }
    }

    impl PersistListener for RecordingPersistListener {
        fn on_success(&self, path: &Path) {
            self.successes.lock().push(path.to_path_buf());
        }

        fn on_fail(&self, error: &PersistError) {
            self.failures.lock().push(error.to_string());
        }
    }
}
