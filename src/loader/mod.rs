//! Loader context: the top-level aggregate tying discovery, validation,
//! capability query, filtering, prioritization, and session creation
//! together.

use std::os::raw::c_void;

use tracing::{debug, info, warn};

use crate::config::{self, ConfigEntry, ConfigId, PropValue, SpecialConfig};
use crate::error::{LoaderError, Result};
use crate::ffi::CapsFormat;
use crate::paths::{self, SearchDir};
use crate::registry::{self, ImplCaps, ImplInfo};
use crate::runtime::{probe, DlProvider, LibInfo, LibraryProvider};
use crate::scan;
use crate::session::{self, Session};
use crate::telemetry;

/// A runtime dispatcher instance.
///
/// Each loader independently discovers the backends installed on the host,
/// filters them by the configuration its caller adds, and creates sessions
/// against the chosen implementation. Discovery runs once, triggered by the
/// first enumeration or session creation. Dropping the loader releases all
/// capability descriptors and unloads every library it opened.
///
/// A loader is not internally synchronized; callers serialize access.
pub struct Loader {
    provider: Box<dyn LibraryProvider>,
    /// Directory override used instead of the platform ladder, for tests
    /// and embedders with their own search policy.
    search_dirs: Option<Vec<SearchDir>>,
    libs: Vec<LibInfo>,
    impls: Vec<ImplInfo>,
    configs: Vec<ConfigEntry>,
    special: SpecialConfig,
    next_external_idx: i32,
    keep_caps_until_unload: bool,
    fully_loaded: bool,
}

// Safety: the raw handles held inside are owned by this loader and carry no
// thread affinity; the loader itself is used from one thread at a time.
#[expect(unsafe_code, reason = "raw descriptor handles have no thread affinity")]
unsafe impl Send for Loader {}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Create a loader using the platform search ladder and `dlopen`.
    pub fn new() -> Self {
        telemetry::init_dispatcher_log();
        Self::build(Box::new(DlProvider), None)
    }

    /// Create a loader with an explicit library provider and directory
    /// list. This is the seam integration tests and embedders use.
    pub fn with_provider(provider: Box<dyn LibraryProvider>, dirs: Vec<SearchDir>) -> Self {
        telemetry::init_dispatcher_log();
        Self::build(provider, Some(dirs))
    }

    fn build(provider: Box<dyn LibraryProvider>, search_dirs: Option<Vec<SearchDir>>) -> Self {
        Self {
            provider,
            search_dirs,
            libs: Vec::new(),
            impls: Vec::new(),
            configs: Vec::new(),
            special: SpecialConfig::default(),
            next_external_idx: 0,
            keep_caps_until_unload: true,
            fully_loaded: false,
        }
    }

    /// Create a new filter entry bound to this loader.
    pub fn create_config(&mut self) -> ConfigId {
        self.configs.push(ConfigEntry::default());
        ConfigId(self.configs.len() - 1)
    }

    /// Assign a `(property path, typed value)` pair to a filter entry,
    /// replacing whatever the entry held before.
    ///
    /// Unknown paths fail with [`LoaderError::NotFound`]; a value of the
    /// wrong typed variant fails with [`LoaderError::Unsupported`]. Every
    /// successful mutation re-validates and re-prioritizes the registry.
    pub fn set_filter_property(
        &mut self,
        config: ConfigId,
        name: &str,
        value: PropValue,
    ) -> Result<()> {
        if config.0 >= self.configs.len() {
            return Err(LoaderError::InvalidHandle);
        }
        let Some((key, type_ok)) = config::resolve_property(name, &value) else {
            debug!("unknown filter property {name}");
            return Err(LoaderError::NotFound);
        };
        if !type_ok {
            debug!("filter property {name} given wrong variant type");
            return Err(LoaderError::Unsupported);
        }

        if key.is_special() {
            self.special.apply(key, &value);
        }
        self.configs[config.0].prop = Some((key, value));

        if self.fully_loaded {
            registry::update_valid_impls(
                &mut self.impls,
                &self.libs,
                &self.configs,
                &self.special,
            );
        }
        Ok(())
    }

    /// Enumerate the implementation at `idx` in the requested format.
    ///
    /// Indices are contiguous from zero over the currently-valid set, in
    /// priority order; the first index past the end fails with
    /// [`LoaderError::NotFound`].
    pub fn enumerate(&mut self, idx: u32, format: CapsFormat) -> Result<ImplCaps> {
        self.ensure_loaded()?;
        registry::query_impl(&self.impls, &self.libs, idx, format)
    }

    /// Release a capability handle obtained from [`Self::enumerate`].
    ///
    /// Under keep-caps-until-unload (the default) the backend release is
    /// deferred to loader teardown and this call only validates the handle,
    /// so applications can enumerate and release the same implementation
    /// repeatedly.
    pub fn release_caps(&mut self, caps: &ImplCaps) -> Result<()> {
        registry::release_impl(
            &mut self.impls,
            &self.libs,
            caps.as_ptr(),
            self.keep_caps_until_unload,
        )
    }

    /// Release a raw capability handle, as an application that only kept
    /// the pointer would.
    pub fn release_caps_ptr(&mut self, handle: *mut c_void) -> Result<()> {
        registry::release_impl(
            &mut self.impls,
            &self.libs,
            handle,
            self.keep_caps_until_unload,
        )
    }

    /// Create a session bound to the implementation at `idx`.
    pub fn create_session(&mut self, idx: u32) -> Result<Session> {
        self.ensure_loaded()?;
        session::create_session(&self.libs, &self.impls, &self.special, idx)
    }

    /// Toggle the keep-caps-until-unload behavior. Defaults to enabled.
    pub fn set_keep_caps_until_unload(&mut self, keep: bool) {
        self.keep_caps_until_unload = keep;
    }

    /// Run the full discovery pipeline once.
    fn ensure_loaded(&mut self) -> Result<()> {
        if self.fully_loaded {
            return self.load_status();
        }

        let dirs = match &self.search_dirs {
            Some(dirs) => dirs.clone(),
            None => paths::produce_directories(),
        };

        for search_dir in &dirs {
            scan::scan_dir(&search_dir.dir, search_dir.priority, &mut self.libs);
        }
        debug!("{} candidate libraries", self.libs.len());

        let valid = probe::validate_libraries(self.provider.as_ref(), &mut self.libs);
        debug!("{valid} libraries validated");

        registry::query_library_caps(
            &mut self.libs,
            &mut self.impls,
            &mut self.next_external_idx,
        );

        registry::update_valid_impls(&mut self.impls, &self.libs, &self.configs, &self.special);

        self.fully_loaded = true;

        if self.impls.is_empty() {
            warn!("no usable implementations found");
        } else {
            info!("{} implementations registered", self.impls.len());
        }
        self.load_status()
    }

    fn load_status(&self) -> Result<()> {
        // no implementation could be materialized from any library
        if self.impls.is_empty() {
            return Err(LoaderError::Unsupported);
        }
        Ok(())
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        // descriptors go back to their backends first, then the libraries
        // are unloaded; filter entries fall out with the struct
        registry::release_all(&mut self.impls, &self.libs);
        self.impls.clear();
        for lib in &mut self.libs {
            lib.unload();
        }
    }
}
