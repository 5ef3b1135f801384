//! Binds fetch results to display targets.
//!
//! The owner's liveness is checked before dispatch and again right before
//! delivery. A dead owner's target is never touched. Failures end in the
//! request's error fallback and never reach the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::fetch_engine::FetchEngine;
use crate::domain::entities::{ImageSource, LoadRequest, LoadedImage};
use crate::domain::errors::{FetchError, FetchErrorKind};
use crate::domain::ports::{DisplayTarget, LivenessProbe, LoadListener};

/// How a load ended, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The image was delivered to the target.
    Delivered(ImageSource),
    /// The load failed and the error fallback was delivered.
    FallbackDelivered(FetchErrorKind),
    /// The owner was gone; the target was left untouched.
    Discarded,
}

/// Entry point for display-bound loads.
#[derive(Debug, Clone)]
pub struct RequestCoordinator {
    engine: FetchEngine,
}

impl RequestCoordinator {
    /// Creates a coordinator over `engine`.
    #[must_use]
    pub const fn new(engine: FetchEngine) -> Self {
        Self { engine }
    }

    /// The underlying fetch engine.
    #[must_use]
    pub const fn engine(&self) -> &FetchEngine {
        &self.engine
    }

    /// Loads `request` into `target`.
    ///
    /// Runs on the caller's task, so delivery happens on the context that
    /// owns the target.
    pub async fn load(
        &self,
        request: LoadRequest,
        target: &dyn DisplayTarget,
        owner: &dyn LivenessProbe,
    ) -> LoadOutcome {
        self.load_with_listener(request, target, owner, None).await
    }

    /// Loads `request` into `target`, notifying `listener` first.
    pub async fn load_with_listener(
        &self,
        request: LoadRequest,
        target: &dyn DisplayTarget,
        owner: &dyn LivenessProbe,
        listener: Option<&dyn LoadListener>,
    ) -> LoadOutcome {
        if !owner.is_alive() {
            debug!(url = %request.url(), "Owner gone before dispatch, discarding load");
            return LoadOutcome::Discarded;
        }

        let placeholder = request.placeholder().clone();
        if !guarded("set_placeholder", || target.set_placeholder(&placeholder)) {
            return LoadOutcome::FallbackDelivered(FetchErrorKind::Internal);
        }

        let result = AssertUnwindSafe(self.engine.resolve(&request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(FetchError::internal("resolve panicked")));

        if let Some(listener) = listener {
            notify(listener, &request, &result);
        }

        if !owner.is_alive() {
            debug!(url = %request.url(), "Owner gone before delivery, discarding result");
            return LoadOutcome::Discarded;
        }

        match result {
            Ok(loaded) => {
                debug!(url = %request.url(), source = %loaded.source, "Delivering image");
                let image = loaded.image;
                if guarded("set_image", || target.set_image(image)) {
                    LoadOutcome::Delivered(loaded.source)
                } else {
                    LoadOutcome::FallbackDelivered(FetchErrorKind::Internal)
                }
            }
            Err(e) => {
                warn!(url = %request.url(), error = %e, "Image load failed, showing fallback");
                let fallback = request.error_fallback().clone();
                guarded("set_error", || target.set_error(&fallback));
                LoadOutcome::FallbackDelivered(e.kind)
            }
        }
    }

    /// Runs [`load`](Self::load) on the runtime.
    pub fn spawn_load(
        &self,
        request: LoadRequest,
        target: Arc<dyn DisplayTarget>,
        owner: Arc<dyn LivenessProbe>,
    ) -> JoinHandle<LoadOutcome> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator
                .load(request, target.as_ref(), owner.as_ref())
                .await
        })
    }

    /// Warms the caches for `request` without a target.
    ///
    /// Returns `None` when the owner is already gone.
    pub fn preload(
        &self,
        request: LoadRequest,
        owner: &dyn LivenessProbe,
    ) -> Option<JoinHandle<Result<LoadedImage, FetchError>>> {
        if !owner.is_alive() {
            debug!(url = %request.url(), "Owner gone, skipping preload");
            return None;
        }
        Some(self.engine.preload(request))
    }
}

fn notify(listener: &dyn LoadListener, request: &LoadRequest, result: &Result<LoadedImage, FetchError>) {
    guarded("load listener", || match result {
        Ok(loaded) => listener.on_resource_ready(request, loaded),
        Err(e) => listener.on_load_failed(request, e),
    });
}

/// Runs a host callback, absorbing panics. Returns false if it panicked.
fn guarded(what: &str, f: impl FnOnce()) -> bool {
    if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(callback = what, "Host callback panicked");
        return false;
    }
    true
}
