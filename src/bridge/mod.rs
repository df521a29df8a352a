//! The compiler-service bridge: "where is the symbol at this position declared?"
//!
//! Two implementations sit behind [`CompilerServiceBridge`]. [`InProcessBridge`] resolves
//! bindings, imports and ambient globals directly from tree-sitter parses. [`LspBridge`]
//! drives an external TypeScript language server over stdio. Both read script text through
//! the same [`ScriptHost`], so they see exactly what the version store holds.

pub mod ambient;
pub mod host;
pub mod jsonrpc;
pub mod lsp;
pub mod modules;
pub mod resolver;

pub use host::ScriptHost;
pub use lsp::{LspBridge, LspOptions};
pub use resolver::InProcessBridge;

use crate::error::EngineResult;
use crate::model::{Definition, Position};
use crate::store::FileVersionStore;
use crate::tsconfig::{self, CompilerOptions};
use crate::util;
use clap::ValueEnum;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub trait CompilerServiceBridge: Send + Sync {
    /// Source-level definition: where the runtime value lives, following imports through
    /// to implementation files. `None` when the symbol only exists in declarations.
    fn resolve_definition(&self, uri: &str, position: Position) -> Option<Definition>;

    /// Declaration-level definition, which may land in a `.d.ts` file.
    fn resolve_type_definition(&self, uri: &str, position: Position) -> Option<Definition>;

    fn host(&self) -> &ScriptHost;

    fn script_text(&self, uri: &str) -> Option<Arc<str>> {
        util::uri_to_path(uri).and_then(|path| self.host().script_text(&path))
    }

    fn compiler_options(&self) -> &CompilerOptions {
        &self.host().config().compiler_options
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BridgeMode {
    #[default]
    InProcess,
    Lsp,
}

/// Load the project's tsconfig and start the requested bridge over `store`.
///
/// A missing `tsconfig.json` is a configuration error and fails here.
pub fn connect(
    mode: BridgeMode,
    project_root: &Path,
    store: FileVersionStore,
) -> EngineResult<Arc<dyn CompilerServiceBridge>> {
    let config = tsconfig::load_project_config(project_root)?;
    let host = ScriptHost::new(project_root, config, store);
    info!(?mode, root = %host.root().display(), "connecting compiler service");
    Ok(match mode {
        BridgeMode::InProcess => Arc::new(InProcessBridge::new(host)),
        BridgeMode::Lsp => Arc::new(LspBridge::spawn(host, LspOptions::default())?),
    })
}
