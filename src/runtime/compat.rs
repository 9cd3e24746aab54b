#![expect(
    unsafe_code,
    reason = "legacy handshake calls through raw entry points"
)]

//! Compatibility shim for legacy-ABI backends.
//!
//! A legacy runtime exports only the old session entry points, so its
//! capabilities cannot be queried directly. The shim opens a short-lived
//! probe session per adapter, reads the version the runtime negotiates, and
//! synthesizes the capability blocks the modern pipeline expects. Those
//! blocks are owned by the loader; releasing them through the backend is a
//! no-op.

use std::os::raw::{c_char, c_void};
use std::ptr;

use tracing::debug;

use super::LegacyApi;
use crate::ffi::{
    ApiVersion, ImplDescription, ImplementedFunctions, LegacyInitParam, SessionHandle,
    DEVICE_ID_LEN, IMPL_NAME_LEN, MFX_ERR_NONE, MFX_IMPL_HARDWARE, MFX_IMPL_HARDWARE2,
    MFX_IMPL_HARDWARE3, MFX_IMPL_HARDWARE4, MFX_IMPL_TYPE_HARDWARE, MFX_IMPL_VIA_ANY,
    MFX_IMPL_VIA_D3D9, VENDOR_ID_INTEL,
};

/// Soft ceiling on adapter probing. Windows systems report adapter counts
/// through DXGI; four covers every configuration seen in practice.
pub(crate) const MAX_LEGACY_ADAPTERS: u32 = 4;

#[cfg(windows)]
const LEGACY_ACCEL_MODE: u32 = crate::ffi::MFX_ACCEL_MODE_VIA_D3D11;
#[cfg(not(windows))]
const LEGACY_ACCEL_MODE: u32 = crate::ffi::MFX_ACCEL_MODE_VIA_VAAPI;

const LEGACY_IMPL_NAME: &str = "mfxhw-compat";

/// Per-adapter compatibility state for one legacy library.
///
/// Owns the synthesized descriptor blocks; their addresses are handed out
/// as capability handles, so the boxes must stay put for the lifetime of
/// the owning library entry.
pub(crate) struct LegacyAdapterCtx {
    pub adapter_idx: u32,
    /// Session implementation code for the default acceleration path.
    pub accel_impl: u32,
    /// Session implementation code when the caller asks for D3D9.
    pub accel_impl_d3d9: u32,
    desc: Box<ImplDescription>,
    funcs: Box<ImplementedFunctions>,
    _fn_names: Box<[*const c_char; 2]>,
}

impl LegacyAdapterCtx {
    pub(crate) fn desc_handle(&self) -> *mut c_void {
        ptr::from_ref::<ImplDescription>(&self.desc).cast_mut().cast()
    }

    pub(crate) fn funcs_handle(&self) -> *mut c_void {
        ptr::from_ref::<ImplementedFunctions>(&self.funcs)
            .cast_mut()
            .cast()
    }
}

fn base_impl_for_adapter(adapter: u32) -> u32 {
    match adapter {
        0 => MFX_IMPL_HARDWARE,
        1 => MFX_IMPL_HARDWARE2,
        2 => MFX_IMPL_HARDWARE3,
        _ => MFX_IMPL_HARDWARE4,
    }
}

fn open_probe_session(api: &LegacyApi, implementation: u32) -> Option<ApiVersion> {
    let mut par = LegacyInitParam {
        Implementation: implementation,
        Version: ApiVersion::new(1, 14),
        GPUCopy: 0,
    };
    let mut session: SessionHandle = ptr::null_mut();

    // Safety: entry points were resolved from this library under the legacy
    // ABI names; the parameter block lives across the call.
    let sts = unsafe { (api.init_ex)(&mut par, &mut session) };
    if sts != MFX_ERR_NONE || session.is_null() {
        return None;
    }
    unsafe {
        (api.close)(session);
    }

    // a runtime that negotiates no version at all is unusable
    if par.Version.Major == 0 {
        return None;
    }
    Some(par.Version)
}

/// Version handshake against adapter 0, used during classification.
pub(crate) fn query_api_version(api: &LegacyApi) -> Option<ApiVersion> {
    open_probe_session(api, MFX_IMPL_HARDWARE | MFX_IMPL_VIA_ANY)
}

/// Probe one adapter and synthesize its capability blocks.
pub(crate) fn query_adapter(api: &LegacyApi, adapter: u32) -> Option<LegacyAdapterCtx> {
    let base = base_impl_for_adapter(adapter);
    let version = open_probe_session(api, base | MFX_IMPL_VIA_ANY)?;

    debug!("legacy adapter {adapter} answers at API {version}");

    let mut desc = Box::new(ImplDescription {
        Impl: MFX_IMPL_TYPE_HARDWARE,
        AccelerationMode: LEGACY_ACCEL_MODE,
        ApiVersion: version,
        VendorID: VENDOR_ID_INTEL,
        VendorImplID: 0,
        ..ImplDescription::default()
    });
    write_cstr(&mut desc.ImplName, LEGACY_IMPL_NAME);
    // device id unknown through the legacy entry points; the adapter index
    // suffix still lets adapter filters apply
    write_cstr(&mut desc.Dev.DeviceID, &format!("0/{adapter}"));

    let fn_names: Box<[*const c_char; 2]> = Box::new([
        b"MFXInitEx\0".as_ptr().cast(),
        b"MFXClose\0".as_ptr().cast(),
    ]);
    let funcs = Box::new(ImplementedFunctions {
        NumFunctions: 2,
        FunctionsName: fn_names.as_ptr(),
    });

    Some(LegacyAdapterCtx {
        adapter_idx: adapter,
        accel_impl: base | MFX_IMPL_VIA_ANY,
        accel_impl_d3d9: base | MFX_IMPL_VIA_D3D9,
        desc,
        funcs,
        _fn_names: fn_names,
    })
}

/// Adapter indices to probe on this platform.
pub(crate) fn adapter_range() -> std::ops::Range<u32> {
    if cfg!(windows) {
        0..MAX_LEGACY_ADAPTERS
    } else {
        // a single adapter elsewhere, matching the session ABI
        0..1
    }
}

fn write_cstr(dst: &mut [c_char], s: &str) {
    for (slot, byte) in dst.iter_mut().zip(s.bytes()) {
        *slot = byte as c_char;
    }
    if let Some(last) = dst.last_mut() {
        *last = 0;
    }
}

const _: () = {
    assert!(IMPL_NAME_LEN > LEGACY_IMPL_NAME.len());
    assert!(DEVICE_ID_LEN > 8);
};
