#![expect(
    unsafe_code,
    reason = "dlopen, dlsym, and raw symbol address to function pointer casts"
)]

//! Backend library handling: dynamic loading, symbol resolution, and the
//! per-library state the rest of the pipeline works against.
//!
//! Loading goes through the [`LibraryProvider`] seam so the pipeline can be
//! driven against in-process fakes; the production provider wraps
//! `libloading`.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LoaderError, Result};
use crate::ffi::functions::{
    InitializeFn, LegacyCloseFn, LegacyInitExFn, ModernEntry, ModernTable,
    QueryImplsDescriptionFn, RawSymbol, ReleaseImplDescriptionFn, SetHandleFn,
};
use crate::ffi::ApiVersion;
use crate::paths::SearchPriority;

pub mod compat;
pub mod probe;

/// A loaded shared library. Dropping the value unloads it.
pub trait LoadedLibrary: Send {
    /// Resolve a symbol by name. Returns the raw address, or `None` when
    /// the library does not export it.
    fn symbol(&self, name: &str) -> Option<RawSymbol>;
}

/// Source of loaded libraries.
///
/// The default provider is [`DlProvider`]. Tests substitute a counting fake
/// to drive the pipeline without real shared objects on disk.
pub trait LibraryProvider: Send {
    /// Load the library at `path`.
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>>;
}

/// Production provider backed by `libloading`.
#[derive(Debug, Default)]
pub struct DlProvider;

struct DlLibrary {
    lib: libloading::Library,
}

impl LoadedLibrary for DlLibrary {
    fn symbol(&self, name: &str) -> Option<RawSymbol> {
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);
        // Safety: the symbol is treated as an opaque address; callers cast
        // it to a typed entry point only per the ABI tables.
        let sym = unsafe { self.lib.get::<RawSymbol>(&bytes) };
        sym.ok().map(|s| *s)
    }
}

impl LibraryProvider for DlProvider {
    #[cfg(unix)]
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>> {
        use libloading::os::unix;

        // local visibility, immediate binding
        let flags = unix::RTLD_LOCAL | unix::RTLD_NOW;
        // Safety: loading an arbitrary runtime library is inherently up to
        // the host configuration; candidates come only from the search
        // ladder patterns.
        let lib = unsafe { unix::Library::open(Some(path), flags) }.map_err(|e| {
            debug!("failed to load {}: {e}", path.display());
            LoaderError::NotFound
        })?;
        Ok(Box::new(DlLibrary { lib: lib.into() }))
    }

    #[cfg(not(unix))]
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>> {
        // Safety: see the unix variant.
        let lib = unsafe { libloading::Library::new(path) }.map_err(|e| {
            debug!("failed to load {}: {e}", path.display());
            LoaderError::NotFound
        })?;
        Ok(Box::new(DlLibrary { lib }))
    }
}

/// Classification of a validated library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LibKind {
    /// Discovered but not yet probed.
    Unclassified,
    /// Modern ABI: exports the initialize/query/release entry set.
    Modern,
    /// Legacy ABI behind the compatibility shim.
    Legacy,
}

/// Callable modern entry points, cast from resolved symbol addresses.
#[derive(Clone, Copy)]
pub(crate) struct ModernApi {
    pub query_impls: QueryImplsDescriptionFn,
    pub release_impl: ReleaseImplDescriptionFn,
    pub initialize: InitializeFn,
}

impl ModernApi {
    /// Build the callable API from a resolved table. Returns `None` when
    /// any of the three mandatory entries is absent.
    pub(crate) fn from_table(table: &ModernTable) -> Option<Self> {
        let query = table.get(ModernEntry::QueryImplsDescription)?;
        let release = table.get(ModernEntry::ReleaseImplDescription)?;
        let init = table.get(ModernEntry::Initialize)?;
        // Safety: addresses were resolved under the exact names the ABI
        // tables pair with these signatures.
        unsafe {
            Some(Self {
                query_impls: std::mem::transmute::<RawSymbol, QueryImplsDescriptionFn>(query),
                release_impl: std::mem::transmute::<RawSymbol, ReleaseImplDescriptionFn>(release),
                initialize: std::mem::transmute::<RawSymbol, InitializeFn>(init),
            })
        }
    }
}

/// Callable legacy entry points.
#[derive(Clone, Copy)]
pub(crate) struct LegacyApi {
    pub init_ex: LegacyInitExFn,
    pub close: LegacyCloseFn,
}

impl LegacyApi {
    pub(crate) fn new(init_ex: RawSymbol, close: RawSymbol) -> Self {
        // Safety: same contract as ModernApi::from_table.
        unsafe {
            Self {
                init_ex: std::mem::transmute::<RawSymbol, LegacyInitExFn>(init_ex),
                close: std::mem::transmute::<RawSymbol, LegacyCloseFn>(close),
            }
        }
    }
}

/// One physical shared library that survived discovery.
pub(crate) struct LibInfo {
    /// Canonical absolute path.
    pub full_path: PathBuf,
    /// NUL-terminated path handed to applications that enumerate the
    /// implementation path format.
    pub path_cstr: CString,
    /// Ladder rung this library was found on.
    pub priority: SearchPriority,
    /// OS handle. `None` before loading and after a tombstoning unload.
    pub library: Option<Box<dyn LoadedLibrary>>,
    pub kind: LibKind,
    /// Resolved modern slots, also kept for per-version export validation.
    pub modern_table: ModernTable,
    pub modern_api: Option<ModernApi>,
    pub legacy_api: Option<LegacyApi>,
    /// Optional device-handle attach entry, either ABI generation.
    pub set_handle: Option<SetHandleFn>,
    /// Version reported by the legacy handshake.
    pub legacy_version: ApiVersion,
    /// Per-adapter compatibility state for legacy libraries.
    pub legacy_ctx: Vec<compat::LegacyAdapterCtx>,
}

impl LibInfo {
    pub(crate) fn discovered(full_path: PathBuf, priority: SearchPriority) -> Self {
        let path_cstr = CString::new(full_path.to_string_lossy().as_bytes())
            .unwrap_or_else(|_| CString::default());
        Self {
            full_path,
            path_cstr,
            priority,
            library: None,
            kind: LibKind::Unclassified,
            modern_table: ModernTable::default(),
            modern_api: None,
            legacy_api: None,
            set_handle: None,
            legacy_version: ApiVersion::default(),
            legacy_ctx: Vec::new(),
        }
    }

    /// File name component, used by the legacy host pattern check.
    pub(crate) fn basename(&self) -> String {
        self.full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Drop the OS handle and every entry point resolved from it.
    /// Idempotent: unloading an unloaded library is a no-op.
    pub(crate) fn unload(&mut self) {
        if self.library.take().is_some() {
            debug!("unloaded {}", self.full_path.display());
        }
        self.modern_api = None;
        self.legacy_api = None;
        self.set_handle = None;
        self.legacy_ctx.clear();
        self.kind = LibKind::Unclassified;
    }

    /// Whether the library still holds a live OS handle.
    pub(crate) fn is_alive(&self) -> bool {
        self.library.is_some()
    }
}
