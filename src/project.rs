use crate::analysis::ComplexityAnalyzer;
use crate::bridge::{self, BridgeMode, CompilerServiceBridge};
use crate::error::EngineResult;
use crate::expand::{ContextExpander, ExpandOptions};
use crate::model::{ExpandedFunctionResult, ResourceNode};
use crate::monitor::RoutesMonitor;
use crate::routes::{RouteExtraction, RouteTreeExtractor};
use crate::scan::ScanOptions;
use crate::store::FileVersionStore;
use crate::util;
use crate::watch::{self, WatchConfig, WatchHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// An opened project: the version store seeded from disk and the bridge reading it.
pub struct Project {
    root: PathBuf,
    watch_roots: Vec<PathBuf>,
    bridge: Arc<dyn CompilerServiceBridge>,
}

impl Project {
    /// Locate the tsconfig, start the bridge and track every source file under the
    /// project's watch roots. A missing tsconfig fails here.
    pub fn open(root: &Path, mode: BridgeMode) -> EngineResult<Self> {
        Self::open_with(root, mode, ScanOptions::default())
    }

    pub fn open_with(root: &Path, mode: BridgeMode, scan_options: ScanOptions) -> EngineResult<Self> {
        let root = util::canonical_path(root);
        let store = FileVersionStore::with_default_extensions();
        let bridge = bridge::connect(mode, &root, store.clone())?;
        let watch_roots = bridge.host().config().watch_roots(&root);
        let tracked = watch::seed(&store, &watch_roots, scan_options);
        info!(root = %root.display(), tracked, "project opened");
        Ok(Self {
            root,
            watch_roots,
            bridge,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watch_roots(&self) -> &[PathBuf] {
        &self.watch_roots
    }

    pub fn store(&self) -> &FileVersionStore {
        self.bridge.host().store()
    }

    pub fn bridge(&self) -> &Arc<dyn CompilerServiceBridge> {
        &self.bridge
    }

    pub fn extract_routes(&self) -> RouteExtraction {
        RouteTreeExtractor::new(self.bridge.as_ref()).extract()
    }

    pub fn dominant_router(&self) -> Option<ResourceNode> {
        let extraction = self.extract_routes();
        ComplexityAnalyzer::new(&extraction.graph).dominant().cloned()
    }

    pub fn expand_function(
        &self,
        src_path: &Path,
        function: &str,
        options: ExpandOptions,
    ) -> EngineResult<Option<ExpandedFunctionResult>> {
        ContextExpander::new(self.bridge.as_ref(), options).expand_function(src_path, function)
    }

    /// Keep the store in sync with disk. The store is already seeded, so the watcher skips
    /// its own initial scan.
    pub fn watch(&self, config: WatchConfig) -> anyhow::Result<Option<WatchHandle>> {
        let config = WatchConfig {
            bootstrap: false,
            ..config
        };
        watch::start(self.watch_roots.clone(), self.store().clone(), config)
    }

    pub fn monitor(&self, debounce: Duration) -> RoutesMonitor {
        RoutesMonitor::start(Arc::clone(&self.bridge), debounce)
    }
}

/// Open `project_root` with the in-process bridge and expand `function_name` in `src_path`.
pub fn expand_function(
    project_root: &Path,
    src_path: &Path,
    function_name: &str,
) -> EngineResult<Option<ExpandedFunctionResult>> {
    Project::open(project_root, BridgeMode::default())?.expand_function(
        src_path,
        function_name,
        ExpandOptions::default(),
    )
}
