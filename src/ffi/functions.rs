//! Entry-point tables for the modern and legacy backend ABIs.
//!
//! Each well-known symbol is tagged with the minimum API version at which a
//! backend reporting that version must export it. The probe resolves every
//! slot; export validation later checks resolved slots against the version
//! an implementation actually declares.

use std::os::raw::{c_char, c_void};

use super::{ApiVersion, InitializationParam, LegacyInitParam, SessionHandle, Status};

/// Raw address of a resolved symbol.
pub type RawSymbol = *const c_void;

/// `MFXQueryImplsDescription(format, &num) -> handle array`
pub type QueryImplsDescriptionFn =
    unsafe extern "C" fn(format: i32, num_impls: *mut u32) -> *mut *mut c_void;

/// `MFXReleaseImplDescription(handle)`
pub type ReleaseImplDescriptionFn = unsafe extern "C" fn(hdl: *mut c_void) -> Status;

/// `MFXInitialize(&par, lib_path, &session)`
///
/// The full library path is passed so the backend can locate auxiliary
/// files installed beside it.
pub type InitializeFn = unsafe extern "C" fn(
    par: *const InitializationParam,
    lib_path: *const c_char,
    session: *mut SessionHandle,
) -> Status;

/// `MFXVideoCORE_SetHandle(session, type, handle)`, optional entry.
pub type SetHandleFn =
    unsafe extern "C" fn(session: SessionHandle, handle_type: u32, handle: *mut c_void) -> Status;

/// Legacy `MFXInitEx(&par, &session)`. Rewrites `par.Version` on success.
pub type LegacyInitExFn =
    unsafe extern "C" fn(par: *mut LegacyInitParam, session: *mut SessionHandle) -> Status;

/// Legacy `MFXClose(session)`.
pub type LegacyCloseFn = unsafe extern "C" fn(session: SessionHandle) -> Status;

/// Slot index into [`ModernTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ModernEntry {
    Initialize = 0,
    QueryImplsDescription,
    ReleaseImplDescription,
    GetSurfaceForVpp,
    GetSurfaceForEncode,
    GetSurfaceForDecode,
    GetSurfaceForVppOut,
    DecodeVppInit,
    DecodeVppDecodeFrameAsync,
    DecodeVppReset,
    DecodeVppGetChannelParam,
    DecodeVppClose,
    VppProcessFrameAsync,
    SetHandle,
}

/// Number of slots in the modern table.
pub const NUM_MODERN_ENTRIES: usize = 14;

/// Name and minimum required version of one entry point.
///
/// `min_version: None` marks an entry that is resolved when present but
/// never required.
#[derive(Debug, Clone, Copy)]
pub struct FunctionDesc {
    pub name: &'static str,
    pub min_version: Option<ApiVersion>,
}

const V2_0: ApiVersion = ApiVersion::new(2, 0);
const V2_2: ApiVersion = ApiVersion::new(2, 2);

/// Modern ABI entry points, indexed by [`ModernEntry`].
pub const MODERN_FUNCTIONS: [FunctionDesc; NUM_MODERN_ENTRIES] = [
    FunctionDesc {
        name: "MFXInitialize",
        min_version: Some(V2_0),
    },
    FunctionDesc {
        name: "MFXQueryImplsDescription",
        min_version: Some(V2_0),
    },
    FunctionDesc {
        name: "MFXReleaseImplDescription",
        min_version: Some(V2_0),
    },
    FunctionDesc {
        name: "MFXMemory_GetSurfaceForVPP",
        min_version: Some(V2_0),
    },
    FunctionDesc {
        name: "MFXMemory_GetSurfaceForEncode",
        min_version: Some(V2_0),
    },
    FunctionDesc {
        name: "MFXMemory_GetSurfaceForDecode",
        min_version: Some(V2_0),
    },
    FunctionDesc {
        name: "MFXMemory_GetSurfaceForVPPOut",
        min_version: Some(V2_2),
    },
    FunctionDesc {
        name: "MFXVideoDECODE_VPP_Init",
        min_version: Some(V2_2),
    },
    FunctionDesc {
        name: "MFXVideoDECODE_VPP_DecodeFrameAsync",
        min_version: Some(V2_2),
    },
    FunctionDesc {
        name: "MFXVideoDECODE_VPP_Reset",
        min_version: Some(V2_2),
    },
    FunctionDesc {
        name: "MFXVideoDECODE_VPP_GetChannelParam",
        min_version: Some(V2_2),
    },
    FunctionDesc {
        name: "MFXVideoDECODE_VPP_Close",
        min_version: Some(V2_2),
    },
    FunctionDesc {
        name: "MFXVideoVPP_ProcessFrameAsync",
        min_version: Some(V2_2),
    },
    FunctionDesc {
        name: "MFXVideoCORE_SetHandle",
        min_version: None,
    },
];

/// Slot index into the legacy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum LegacyEntry {
    InitEx = 0,
    Close,
}

/// Number of slots in the legacy table.
pub const NUM_LEGACY_ENTRIES: usize = 2;

/// Legacy ABI entry points, indexed by [`LegacyEntry`].
pub const LEGACY_FUNCTIONS: [FunctionDesc; NUM_LEGACY_ENTRIES] = [
    FunctionDesc {
        name: "MFXInitEx",
        min_version: Some(ApiVersion::new(1, 14)),
    },
    FunctionDesc {
        name: "MFXClose",
        min_version: Some(ApiVersion::new(1, 0)),
    },
];

/// Resolved modern entry points, one slot per [`ModernEntry`].
#[derive(Debug, Clone, Copy)]
pub struct ModernTable {
    slots: [Option<RawSymbol>; NUM_MODERN_ENTRIES],
}

impl Default for ModernTable {
    fn default() -> Self {
        Self {
            slots: [None; NUM_MODERN_ENTRIES],
        }
    }
}

impl ModernTable {
    pub fn set(&mut self, entry: ModernEntry, sym: RawSymbol) {
        self.slots[entry as usize] = Some(sym);
    }

    pub fn set_index(&mut self, idx: usize, sym: RawSymbol) {
        self.slots[idx] = Some(sym);
    }

    pub fn get(&self, entry: ModernEntry) -> Option<RawSymbol> {
        self.slots[entry as usize]
    }

    /// First entry that is required at `version` but was not resolved.
    pub fn missing_for(&self, version: ApiVersion) -> Option<&'static str> {
        for (idx, desc) in MODERN_FUNCTIONS.iter().enumerate() {
            let Some(min) = desc.min_version else {
                continue;
            };
            if min <= version && self.slots[idx].is_none() {
                return Some(desc.name);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_table() -> ModernTable {
        let mut table = ModernTable::default();
        for idx in 0..NUM_MODERN_ENTRIES {
            table.set_index(idx, mock_sym());
        }
        table
    }

    fn mock_sym() -> RawSymbol {
        // any stable non-null address works for presence checks
        static DUMMY: u8 = 0;
        std::ptr::addr_of!(DUMMY).cast()
    }

    #[test]
    fn test_base_entries_suffice_for_2_0() {
        let mut table = ModernTable::default();
        for idx in 0..6 {
            table.set_index(idx, mock_sym());
        }
        assert_eq!(table.missing_for(ApiVersion::new(2, 0)), None);
        assert_eq!(
            table.missing_for(ApiVersion::new(2, 2)),
            Some("MFXMemory_GetSurfaceForVPPOut")
        );
    }

    #[test]
    fn test_full_table_covers_all_versions() {
        let table = full_table();
        assert_eq!(table.missing_for(ApiVersion::new(2, 9)), None);
    }

    #[test]
    fn test_optional_entry_never_required() {
        let mut table = full_table();
        table.slots[ModernEntry::SetHandle as usize] = None;
        assert_eq!(table.missing_for(ApiVersion::new(2, 9)), None);
    }
}
