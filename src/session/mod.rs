#![expect(
    unsafe_code,
    reason = "session creation calls through backend entry points"
)]

//! Session creation against a chosen implementation.

use std::ptr;

use tracing::{debug, warn};

use crate::config::SpecialConfig;
use crate::error::{LoaderError, Result};
use crate::ffi::{
    InitializationParam, LegacyInitParam, SessionHandle, MFX_ACCEL_MODE_VIA_D3D9, MFX_ERR_NONE,
};
use crate::registry::ImplInfo;
use crate::runtime::{LibInfo, LibKind};

/// Opaque session token returned by a backend.
///
/// The loader retains no reference to it; closing the session through the
/// backend's own entry points, before the loader is dropped, is the
/// caller's responsibility.
#[derive(Debug)]
pub struct Session {
    raw: SessionHandle,
}

// Safety: the token is an opaque backend pointer with no thread affinity at
// this layer; the backend ABI governs actual usage.
unsafe impl Send for Session {}

impl Session {
    /// Raw backend session handle.
    pub fn as_raw(&self) -> SessionHandle {
        self.raw
    }
}

/// Create a session bound to the implementation at `idx`.
pub(crate) fn create_session(
    libs: &[LibInfo],
    impls: &[ImplInfo],
    special: &SpecialConfig,
    idx: u32,
) -> Result<Session> {
    let Some(info) = impls.iter().find(|i| i.external_idx == idx as i32) else {
        return Err(LoaderError::NotFound);
    };

    // should not happen in normal sequencing, but never initialize from a
    // released descriptor
    if info.impl_desc.is_null() {
        return Err(LoaderError::NullPtr);
    }

    let lib = &libs[info.lib];
    // caller-chosen acceleration mode wins over the backend default
    let accel = special
        .acceleration_mode
        .unwrap_or(info.init_param.AccelerationMode);

    let mut session: SessionHandle = ptr::null_mut();
    let sts = match lib.kind {
        LibKind::Modern => {
            let Some(api) = lib.modern_api else {
                return Err(LoaderError::NotInitialized);
            };
            let par = InitializationParam {
                AccelerationMode: accel,
                ApiVersion: info.reported_version,
                VendorImplID: info.init_param.VendorImplID,
            };
            debug!(
                "initializing {} impl {} (accel {:#x})",
                lib.full_path.display(),
                info.lib_impl_idx,
                accel
            );
            // Safety: entry resolved from this still-loaded library; the
            // parameter block and path outlive the call.
            unsafe { (api.initialize)(&par, lib.path_cstr.as_ptr(), &mut session) }
        }
        LibKind::Legacy => {
            let Some(api) = lib.legacy_api else {
                return Err(LoaderError::NotInitialized);
            };
            let Some(ctx) = lib
                .legacy_ctx
                .iter()
                .find(|c| Some(c.adapter_idx) == info.legacy_adapter)
            else {
                return Err(LoaderError::NotFound);
            };
            let implementation = if accel == MFX_ACCEL_MODE_VIA_D3D9 {
                ctx.accel_impl_d3d9
            } else {
                ctx.accel_impl
            };
            let mut par = LegacyInitParam {
                Implementation: implementation,
                Version: info.reported_version,
                GPUCopy: 0,
            };
            debug!(
                "initializing legacy {} adapter {} (impl {:#x})",
                lib.full_path.display(),
                ctx.adapter_idx,
                implementation
            );
            unsafe { (api.init_ex)(&mut par, &mut session) }
        }
        LibKind::Unclassified => return Err(LoaderError::NotInitialized),
    };

    if sts != MFX_ERR_NONE {
        return Err(LoaderError::from_status(sts));
    }
    if session.is_null() {
        return Err(LoaderError::NullPtr);
    }

    // attach the caller-supplied device handle, if any
    if let (Some(handle_type), Some(handle)) = (special.device_handle_type, special.device_handle)
    {
        if handle_type != 0 && !handle.is_null() {
            let Some(set_handle) = lib.set_handle else {
                warn!(
                    "{}: device handle supplied but no set-handle entry",
                    lib.full_path.display()
                );
                return Err(LoaderError::Unsupported);
            };
            // Safety: session was just created by this library.
            let sts = unsafe { set_handle(session, handle_type, handle) };
            if sts != MFX_ERR_NONE {
                return Err(LoaderError::from_status(sts));
            }
        }
    }

    Ok(Session { raw: session })
}
