//! Process-wide cache of recognition engines keyed by language set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use super::RecognitionEngine;
use crate::config::LanguageSet;
use crate::error::OcrResult;

/// Builds an engine for a language set. Called at most once per set.
pub type EngineFactory =
    Box<dyn Fn(&LanguageSet) -> OcrResult<Arc<dyn RecognitionEngine>> + Send + Sync>;

type Slot = Arc<OnceCell<Arc<dyn RecognitionEngine>>>;

/// Keyed registry with acquire-or-initialise semantics.
///
/// Each language set owns an initialisation cell. The map lock is held only
/// long enough to find or create the cell; initialisation itself runs under
/// the cell, so concurrent first requests for the same set block on a single
/// build while requests for other sets proceed. A failed build leaves the
/// cell empty and the next request tries again.
pub struct EngineRegistry {
    slots: Mutex<HashMap<LanguageSet, Slot>>,
    factory: EngineFactory,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.slots.lock().keys().map(LanguageSet::key).collect();
        f.debug_struct("EngineRegistry")
            .field("languages", &keys)
            .finish_non_exhaustive()
    }
}

impl EngineRegistry {
    /// Create an empty registry.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&LanguageSet) -> OcrResult<Arc<dyn RecognitionEngine>> + Send + Sync + 'static,
    {
        Self {
            slots: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Registry whose every language set maps to the same engine.
    pub fn with_engine(engine: Arc<dyn RecognitionEngine>) -> Self {
        Self::new(move |_| Ok(Arc::clone(&engine)))
    }

    /// Return the engine for `languages`, building it on first use.
    pub fn acquire(&self, languages: &LanguageSet) -> OcrResult<Arc<dyn RecognitionEngine>> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(languages.clone()).or_default())
        };

        let engine = slot.get_or_try_init(|| {
            log::info!("Initialising recognition engine for languages [{}]", languages);
            (self.factory)(languages)
        })?;
        Ok(Arc::clone(engine))
    }

    /// Make sure the engine for `languages` is initialised.
    pub fn warm(&self, languages: &LanguageSet) -> OcrResult<()> {
        self.acquire(languages).map(|_| ())
    }

    /// Whether an engine for `languages` has been built.
    pub fn is_initialized(&self, languages: &LanguageSet) -> bool {
        self.slots
            .lock()
            .get(languages)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Warm `languages` on a background thread.
    ///
    /// Best effort: a failure is logged and otherwise ignored, so callers can
    /// start serving requests without waiting on the handle.
    pub fn spawn_warmup(self: &Arc<Self>, languages: LanguageSet) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        std::thread::spawn(move || match registry.warm(&languages) {
            Ok(()) => log::info!("Recognition engine for [{}] warmed up", languages),
            Err(e) => log::warn!("Warmup for [{}] failed: {}", languages, e),
        })
    }
}
