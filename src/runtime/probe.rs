#![expect(
    unsafe_code,
    reason = "resolved symbol addresses are cast to typed entry points"
)]

//! Library classification: modern ABI, legacy ABI, or rejected.

use std::mem;

use tracing::{debug, warn};

use super::compat;
use super::{LegacyApi, LibInfo, LibKind, LibraryProvider, ModernApi};
use crate::ffi::functions::{
    ModernEntry, ModernTable, RawSymbol, SetHandleFn, LEGACY_FUNCTIONS, MODERN_FUNCTIONS,
    NUM_LEGACY_ENTRIES,
};
use crate::paths::SearchPriority;

/// Basename prefix a legacy host library must carry.
const LEGACY_LIB_PREFIX: &str = "libmfxhw";

/// Load and classify every candidate. Rejected candidates are unloaded in
/// place; after the pass at most one legacy library remains (the one with
/// the highest handshake version, first seen winning ties).
///
/// Returns the number of libraries that survived.
pub(crate) fn validate_libraries(provider: &dyn LibraryProvider, libs: &mut [LibInfo]) -> usize {
    for lib in libs.iter_mut() {
        if !probe_one(provider, lib) {
            lib.unload();
        }
    }

    prune_legacy(libs);

    libs.iter().filter(|li| li.is_alive()).count()
}

fn probe_one(provider: &dyn LibraryProvider, lib: &mut LibInfo) -> bool {
    let library = match provider.load(&lib.full_path) {
        Ok(library) => library,
        Err(_) => return false,
    };

    let mut table = ModernTable::default();
    for (idx, desc) in MODERN_FUNCTIONS.iter().enumerate() {
        if let Some(sym) = library.symbol(desc.name) {
            table.set_index(idx, sym);
        }
    }
    let set_handle = table
        .get(ModernEntry::SetHandle)
        // Safety: resolved under the exact name paired with this signature.
        .map(|sym| unsafe { mem::transmute::<RawSymbol, SetHandleFn>(sym) });

    // a modern runtime must export the initialize entry, and must not have
    // been picked up from a legacy-only rung
    if table.get(ModernEntry::Initialize).is_some() && lib.priority != SearchPriority::Legacy {
        let Some(api) = ModernApi::from_table(&table) else {
            // exports initialize but not the query/release pair; unusable
            warn!(
                "{}: initialize present but capability entries missing",
                lib.full_path.display()
            );
            return false;
        };
        debug!("{}: modern runtime", lib.full_path.display());
        lib.library = Some(library);
        lib.modern_table = table;
        lib.modern_api = Some(api);
        lib.set_handle = set_handle;
        lib.kind = LibKind::Modern;
        return true;
    }

    // legacy check: name pattern, full legacy entry set, version handshake
    if !lib.basename().starts_with(LEGACY_LIB_PREFIX) {
        return false;
    }

    let mut legacy_syms = [None; NUM_LEGACY_ENTRIES];
    for (idx, desc) in LEGACY_FUNCTIONS.iter().enumerate() {
        legacy_syms[idx] = library.symbol(desc.name);
    }
    let (Some(init_ex), Some(close)) = (legacy_syms[0], legacy_syms[1]) else {
        return false;
    };

    let api = LegacyApi::new(init_ex, close);
    let Some(version) = compat::query_api_version(&api) else {
        debug!("{}: legacy handshake failed", lib.full_path.display());
        return false;
    };

    debug!(
        "{}: legacy runtime at API {version}",
        lib.full_path.display()
    );
    lib.library = Some(library);
    lib.legacy_api = Some(api);
    lib.set_handle = set_handle;
    lib.legacy_version = version;
    lib.kind = LibKind::Legacy;
    true
}

/// Keep only the legacy library with the highest handshake version.
fn prune_legacy(libs: &mut [LibInfo]) {
    let mut best: Option<usize> = None;
    for (idx, lib) in libs.iter().enumerate() {
        if !lib.is_alive() || lib.kind != LibKind::Legacy {
            continue;
        }
        match best {
            None => best = Some(idx),
            Some(b) if lib.legacy_version > libs[b].legacy_version => best = Some(idx),
            Some(_) => {}
        }
    }

    for (idx, lib) in libs.iter_mut().enumerate() {
        if lib.kind == LibKind::Legacy && lib.is_alive() && Some(idx) != best {
            debug!(
                "{}: duplicate legacy runtime pruned",
                lib.full_path.display()
            );
            lib.unload();
        }
    }
}
