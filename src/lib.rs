//! # vpl-dispatch
//!
//! Runtime dispatcher for video-processing backends.
//!
//! Applications do not link against a specific runtime. They create a
//! [`Loader`], optionally narrow the candidate set with filter properties,
//! enumerate the implementations installed on the host in priority order,
//! and create a session bound to the one they pick. Backends are shared
//! libraries discovered on a platform search ladder and validated against a
//! strict entry-point contract; a legacy-ABI runtime can participate
//! through a compatibility shim.
//!
//! # Architecture
//!
//! ```text
//! Loader
//!   ├─> paths     (platform search ladder, priority tags)
//!   ├─> scan      (name patterns, canonicalization, dedup)
//!   ├─> runtime   (dlopen/dlsym, ABI probe, legacy shim)
//!   ├─> registry  (capability query, external index, priority order)
//!   ├─> config    (filter properties, special config)
//!   └─> session   (backend initialize, device handle attach)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vpl_dispatch::{CapsFormat, Loader, PropValue};
//!
//! let mut loader = Loader::new();
//! let cfg = loader.create_config();
//! loader.set_filter_property(
//!     cfg,
//!     "mfxImplDescription.mfxDecoderDescription.decoder.CodecID",
//!     PropValue::U32(vpl_dispatch::ffi::MFX_CODEC_HEVC),
//! )?;
//!
//! let _caps = loader.enumerate(0, CapsFormat::Description)?;
//! let _session = loader.create_session(0)?;
//! # Ok::<(), vpl_dispatch::LoaderError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Filter properties and the special (out-of-band) configuration.
pub mod config;

/// Error surface of all loader operations.
pub mod error;

/// Wire-level ABI types shared with backend libraries.
pub mod ffi;

/// The top-level loader aggregate.
pub mod loader;

/// Platform search-path policy.
pub mod paths;

/// Capability registry and enumeration handles.
pub mod registry;

/// Dynamic library handling and the ABI probe.
pub mod runtime;

/// Candidate-library directory scanning.
pub(crate) mod scan;

/// Session creation.
pub mod session;

/// Dispatcher log activation from the environment.
pub mod telemetry;

pub use config::{ConfigId, PropKey, PropValue};
pub use error::{LoaderError, Result};
pub use ffi::{ApiVersion, CapsFormat};
pub use loader::Loader;
pub use paths::{SearchDir, SearchPriority};
pub use registry::ImplCaps;
pub use runtime::{DlProvider, LibraryProvider, LoadedLibrary};
pub use session::Session;
