#![expect(
    unsafe_code,
    reason = "capability query crosses into backend entry points and walks returned handle arrays"
)]

//! Capability registry: one [`ImplInfo`] per discoverable implementation.
//!
//! Modern libraries report their implementations through the query entry
//! point; legacy libraries go through the compatibility shim, one probe per
//! adapter. The registry owns the external index mapping used by
//! enumeration and re-derives it after every filter change.

use std::ffi::CStr;
use std::os::raw::c_void;
use std::ptr;

use tracing::{debug, warn};

use crate::config::{self, ConfigEntry, SpecialConfig};
use crate::error::{LoaderError, Result};
use crate::ffi::{
    ApiVersion, CapsFormat, ImplDescription, ImplementedFunctions, InitializationParam,
    MFX_ERR_NONE, MFX_IMPL_TYPE_HARDWARE, VENDOR_ID_INTEL,
};
use crate::runtime::{compat, LibInfo, LibKind};

pub(crate) mod prioritize;

/// A capability handle as handed to the application, tagged with the
/// format it was enumerated under.
///
/// The underlying block stays owned by the registry (and ultimately the
/// backend); the wrapper is freely copyable.
#[derive(Debug, Clone, Copy)]
pub struct ImplCaps {
    format: CapsFormat,
    raw: *mut c_void,
}

impl ImplCaps {
    pub(crate) fn new(format: CapsFormat, raw: *mut c_void) -> Self {
        Self { format, raw }
    }

    /// Format this handle was enumerated under.
    pub fn format(&self) -> CapsFormat {
        self.format
    }

    /// Raw handle value.
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw
    }

    /// View as a capability descriptor.
    ///
    /// # Safety
    ///
    /// The handle must not have been released, and the loader that produced
    /// it must still be alive.
    pub unsafe fn description(&self) -> Option<&ImplDescription> {
        if self.format != CapsFormat::Description || self.raw.is_null() {
            return None;
        }
        unsafe { Some(&*(self.raw as *const ImplDescription)) }
    }

    /// View as an implemented-functions descriptor.
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::description`].
    pub unsafe fn implemented_functions(&self) -> Option<&ImplementedFunctions> {
        if self.format != CapsFormat::ImplementedFunctions || self.raw.is_null() {
            return None;
        }
        unsafe { Some(&*(self.raw as *const ImplementedFunctions)) }
    }

    /// View as the library path string.
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::description`].
    pub unsafe fn path(&self) -> Option<&CStr> {
        if self.format != CapsFormat::ImplPath || self.raw.is_null() {
            return None;
        }
        unsafe { Some(CStr::from_ptr(self.raw as *const _)) }
    }
}

/// One discoverable implementation.
pub(crate) struct ImplInfo {
    /// Index of the owning library in the loader's arena.
    pub lib: usize,
    /// Capability descriptor handle; null once explicitly released.
    pub impl_desc: *mut c_void,
    /// Implemented-functions handle; null when the backend predates the
    /// format or after release.
    pub impl_funcs: *mut c_void,
    /// Seed parameter block for session creation.
    pub init_param: InitializationParam,
    pub reported_version: ApiVersion,
    /// Position within the owning library's report.
    pub lib_impl_idx: u32,
    /// Adapter slot for legacy implementations.
    pub legacy_adapter: Option<u32>,
    /// Contiguous caller-visible index; -1 while filtered out.
    pub external_idx: i32,
    /// Parsed x86 GPU adapter index, when DeviceID carried one.
    pub adapter_idx: Option<u32>,
    // descriptor fields cached so ordering and filtering never chase a
    // handle the application may have released
    pub impl_type: u32,
    pub default_accel_mode: u32,
}

impl ImplInfo {
    fn from_descriptor(
        lib: usize,
        lib_impl_idx: u32,
        desc_handle: *mut c_void,
        funcs_handle: *mut c_void,
        desc: &ImplDescription,
    ) -> Self {
        let adapter_idx = if desc.VendorID == VENDOR_ID_INTEL && desc.is_hardware() {
            config::parse_device_id_x86(&desc.device_id()).map(|(_, adapter)| adapter)
        } else {
            None
        };

        Self {
            lib,
            impl_desc: desc_handle,
            impl_funcs: funcs_handle,
            init_param: InitializationParam {
                AccelerationMode: desc.AccelerationMode,
                ApiVersion: desc.ApiVersion,
                VendorImplID: desc.VendorImplID,
            },
            reported_version: desc.ApiVersion,
            lib_impl_idx,
            legacy_adapter: None,
            external_idx: -1,
            adapter_idx,
            impl_type: desc.Impl,
            default_accel_mode: desc.AccelerationMode,
        }
    }
}

/// Query capabilities of every validated library and populate `impls`.
///
/// Malformed libraries are unloaded in place and contribute nothing.
pub(crate) fn query_library_caps(
    libs: &mut [LibInfo],
    impls: &mut Vec<ImplInfo>,
    next_external_idx: &mut i32,
) {
    for lib_idx in 0..libs.len() {
        match libs[lib_idx].kind {
            LibKind::Modern => query_modern(libs, lib_idx, impls, next_external_idx),
            LibKind::Legacy => query_legacy(libs, lib_idx, impls, next_external_idx),
            LibKind::Unclassified => {}
        }
    }
}

fn query_modern(
    libs: &mut [LibInfo],
    lib_idx: usize,
    impls: &mut Vec<ImplInfo>,
    next_external_idx: &mut i32,
) {
    let lib = &mut libs[lib_idx];
    let Some(api) = lib.modern_api else {
        return;
    };

    let mut num_impls: u32 = 0;
    // Safety: the entry points were resolved from this (still loaded)
    // library under the ABI names.
    let handles =
        unsafe { (api.query_impls)(CapsFormat::Description as i32, &mut num_impls) };

    let handles_valid = !handles.is_null()
        && (0..num_impls as usize)
            .all(|i| unsafe { !(*handles.add(i)).is_null() });
    if !handles_valid {
        // a null array, or any null element, marks the query entry as
        // implemented incorrectly
        warn!(
            "{}: malformed capability report, dropping library",
            lib.full_path.display()
        );
        lib.unload();
        return;
    }

    // implemented-functions report is optional for older runtimes
    let mut num_funcs: u32 = 0;
    let func_handles = unsafe {
        (api.query_impls)(CapsFormat::ImplementedFunctions as i32, &mut num_funcs)
    };

    for i in 0..num_impls as usize {
        let desc_handle = unsafe { *handles.add(i) };
        let funcs_handle = if !func_handles.is_null() && i < num_funcs as usize {
            unsafe { *func_handles.add(i) }
        } else {
            ptr::null_mut()
        };

        // Safety: non-null by the validation pass above.
        let desc = unsafe { &*(desc_handle as *const ImplDescription) };

        // every entry required at the version this implementation reports
        // must have resolved
        if let Some(missing) = lib.modern_table.missing_for(desc.ApiVersion) {
            warn!(
                "{}: impl {} reports API {} but lacks {missing}",
                lib.full_path.display(),
                i,
                desc.ApiVersion
            );
            unsafe {
                (api.release_impl)(desc_handle);
                if !funcs_handle.is_null() {
                    (api.release_impl)(funcs_handle);
                }
            }
            continue;
        }

        let mut info =
            ImplInfo::from_descriptor(lib_idx, i as u32, desc_handle, funcs_handle, desc);
        info.external_idx = *next_external_idx;
        *next_external_idx += 1;

        debug!(
            "{}: impl {} ({}, API {})",
            lib.full_path.display(),
            i,
            desc.impl_name(),
            desc.ApiVersion
        );
        impls.push(info);
    }
}

fn query_legacy(
    libs: &mut [LibInfo],
    lib_idx: usize,
    impls: &mut Vec<ImplInfo>,
    next_external_idx: &mut i32,
) {
    let lib = &mut libs[lib_idx];
    let Some(api) = lib.legacy_api else {
        return;
    };

    let mut probed = Vec::new();
    for adapter in compat::adapter_range() {
        if let Some(ctx) = compat::query_adapter(&api, adapter) {
            probed.push(ctx);
        }
    }

    if probed.is_empty() {
        debug!(
            "{}: no legacy adapter answered, dropping library",
            lib.full_path.display()
        );
        lib.unload();
        return;
    }

    lib.legacy_ctx = probed;
    for ctx in &lib.legacy_ctx {
        let desc_handle = ctx.desc_handle();
        let funcs_handle = ctx.funcs_handle();
        // Safety: shim-owned block, alive as long as the library entry.
        let desc = unsafe { &*(desc_handle as *const ImplDescription) };

        let mut info = ImplInfo::from_descriptor(lib_idx, 0, desc_handle, funcs_handle, desc);
        info.legacy_adapter = Some(ctx.adapter_idx);
        info.external_idx = *next_external_idx;
        *next_external_idx += 1;
        impls.push(info);
    }
}

/// Re-validate every implementation against the filter state, apply the
/// legacy masking rule, and reprioritize.
pub(crate) fn update_valid_impls(
    impls: &mut [ImplInfo],
    libs: &[LibInfo],
    entries: &[ConfigEntry],
    special: &SpecialConfig,
) {
    // a modern hardware implementation shadows every legacy one
    let modern_hw_present = impls.iter().any(|info| {
        libs[info.lib].kind == LibKind::Modern && info.impl_type == MFX_IMPL_TYPE_HARDWARE
    });

    let mut next = 0;
    for info in impls.iter_mut() {
        let masked = modern_hw_present && libs[info.lib].kind == LibKind::Legacy;
        let valid = !masked
            && config::validate_impl(
                info.impl_desc as *const ImplDescription,
                entries,
                special,
                info.adapter_idx,
            );
        info.external_idx = if valid {
            let idx = next;
            next += 1;
            idx
        } else {
            -1
        };
    }

    prioritize::prioritize(impls, libs);
}

/// Enumerate implementation `idx` in the requested delivery format.
pub(crate) fn query_impl(
    impls: &[ImplInfo],
    libs: &[LibInfo],
    idx: u32,
    format: CapsFormat,
) -> Result<ImplCaps> {
    for info in impls {
        if info.external_idx != idx as i32 {
            continue;
        }
        let raw = match format {
            CapsFormat::Description => info.impl_desc,
            CapsFormat::ImplementedFunctions => info.impl_funcs,
            CapsFormat::ImplPath => libs[info.lib].path_cstr.as_ptr() as *mut c_void,
        };
        // implementation found, but this format has nothing to hand out
        if raw.is_null() {
            return Err(LoaderError::Unsupported);
        }
        return Ok(ImplCaps::new(format, raw));
    }
    Err(LoaderError::NotFound)
}

/// Release a capability handle previously handed out by enumeration.
///
/// Under keep-caps-until-unload (the default) this is a recorded no-op and
/// the actual backend release happens at loader teardown.
pub(crate) fn release_impl(
    impls: &mut [ImplInfo],
    libs: &[LibInfo],
    handle: *mut c_void,
    keep_caps: bool,
) -> Result<()> {
    if handle.is_null() {
        return Err(LoaderError::NullPtr);
    }

    for info in impls.iter_mut() {
        let format = if info.impl_desc == handle {
            CapsFormat::Description
        } else if info.impl_funcs == handle {
            CapsFormat::ImplementedFunctions
        } else if libs[info.lib].path_cstr.as_ptr() as *mut c_void == handle {
            CapsFormat::ImplPath
        } else {
            continue;
        };

        if keep_caps {
            return Ok(());
        }

        let lib = &libs[info.lib];
        // legacy blocks are shim-owned; nothing to call into
        if lib.kind != LibKind::Modern {
            return Ok(());
        }
        let Some(api) = lib.modern_api else {
            return Ok(());
        };

        match format {
            CapsFormat::Description => {
                // Safety: handle matched this implementation's live slot.
                let sts = unsafe { (api.release_impl)(info.impl_desc) };
                info.impl_desc = ptr::null_mut();
                if sts != MFX_ERR_NONE {
                    return Err(LoaderError::from_status(sts));
                }
            }
            CapsFormat::ImplementedFunctions => {
                let sts = unsafe { (api.release_impl)(info.impl_funcs) };
                info.impl_funcs = ptr::null_mut();
                if sts != MFX_ERR_NONE {
                    return Err(LoaderError::from_status(sts));
                }
            }
            // the path string is loader memory, nothing was allocated
            CapsFormat::ImplPath => {}
        }
        return Ok(());
    }

    Err(LoaderError::InvalidHandle)
}

/// Release every still-held descriptor handle back to its backend.
/// Called once during loader teardown.
pub(crate) fn release_all(impls: &mut [ImplInfo], libs: &[LibInfo]) {
    for info in impls.iter_mut() {
        let lib = &libs[info.lib];
        if lib.kind != LibKind::Modern {
            continue;
        }
        let Some(api) = lib.modern_api else {
            continue;
        };
        if !info.impl_desc.is_null() {
            // Safety: slot is nulled immediately, so no double release.
            unsafe {
                (api.release_impl)(info.impl_desc);
            }
            info.impl_desc = ptr::null_mut();
        }
        if !info.impl_funcs.is_null() {
            unsafe {
                (api.release_impl)(info.impl_funcs);
            }
            info.impl_funcs = ptr::null_mut();
        }
    }
}
