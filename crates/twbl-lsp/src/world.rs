use std::sync::{atomic::AtomicBool, Arc};

use crate::{
    config::{InitConfig, LspConfig},
    scheduler::RequestScheduler,
    snippets::SnippetSet,
};
use arc_swap::ArcSwap;
use lsp_types::{CompletionResponse, Hover, SignatureHelp};
use parking_lot::Mutex;
use tokio::sync::RwLock as AsyncRwLock;
use twbl_analysis::{
    Catalog, DerivedCache, DocumentCache, IncrementalDriver, MemoryManager,
};
use twbl_common::environment::Environment;
use url::Url;

pub type World<E> = Arc<WorldState<E>>;

pub struct WorldState<E: Environment> {
    pub(crate) env: E,
    pub(crate) init_config: ArcSwap<InitConfig>,
    pub(crate) analysis: AsyncRwLock<Analysis>,
    pub(crate) scheduler: RequestScheduler<E>,
    pub(crate) derived: Mutex<DerivedCaches>,
    /// Whether `textDocument/formatting` is currently registered with the
    /// client; the formatter is only registered while `enableFormatting`
    /// is on.
    pub(crate) formatting_registered: AtomicBool,
}

impl<E: Environment> WorldState<E> {
    pub fn new(env: E) -> Self {
        Self {
            scheduler: RequestScheduler::new(env.clone(), Default::default()),
            env,
            init_config: Default::default(),
            analysis: AsyncRwLock::new(Analysis::new()),
            derived: Default::default(),
            formatting_registered: AtomicBool::new(false),
        }
    }
}

/// All analysis state behind one lock: the single analysis "thread" of the
/// server. Mutation happens only through the incremental driver and the
/// memory manager; feature providers take read guards.
pub struct Analysis {
    pub(crate) config: LspConfig,
    pub(crate) cache: DocumentCache,
    pub(crate) driver: IncrementalDriver,
    pub(crate) memory: MemoryManager,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) snippets: Arc<SnippetSet>,
}

impl Analysis {
    pub(crate) fn new() -> Self {
        Self {
            config: LspConfig::default(),
            cache: DocumentCache::default(),
            driver: IncrementalDriver::default(),
            memory: MemoryManager::default(),
            catalog: Arc::new(Catalog::builtin()),
            snippets: Arc::new(SnippetSet::bundled()),
        }
    }

    pub(crate) fn apply_config(&mut self) {
        self.driver.settings = self.config.incremental_settings();
        self.memory.settings = self.config.memory_settings();
    }
}

/// Per-provider result caches unified behind one version-stamped interface;
/// the driver's post-commit hook bumps them all at once.
#[derive(Default)]
pub struct DerivedCaches {
    pub(crate) hover: DerivedCache<Option<Hover>>,
    pub(crate) completion: DerivedCache<Option<CompletionResponse>>,
    pub(crate) signature: DerivedCache<Option<SignatureHelp>>,
}

impl DerivedCaches {
    pub(crate) fn bump(&mut self, uri: &Url) {
        self.hover.bump(uri);
        self.completion.bump(uri);
        self.signature.bump(uri);
    }

    pub(crate) fn forget(&mut self, uri: &Url) {
        self.hover.forget(uri);
        self.completion.forget(uri);
        self.signature.forget(uri);
    }
}
