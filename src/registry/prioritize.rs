//! Implementation ordering.
//!
//! The precedence rules, most important first:
//!
//! 1. Hardware implementations before software.
//! 2. General hardware before vendor-specific-integration hardware.
//! 3. Higher declared API version first.
//! 4. Lower search-ladder rung first.
//!
//! Implemented as four stable sorts in reverse precedence order, so equals
//! at each level keep their relative order and the final order is
//! deterministic. Afterwards the caller-visible indices are rewritten from
//! zero across the currently-valid entries.

use super::ImplInfo;
use crate::ffi::MFX_ACCEL_MODE_VIA_HDDLUNITE;
use crate::runtime::LibInfo;

/// Sort `impls` per the precedence rules and renumber valid entries.
pub(crate) fn prioritize(impls: &mut [ImplInfo], libs: &[LibInfo]) {
    // 4: search-ladder rung, lower rung wins
    impls.sort_by_key(|info| libs[info.lib].priority);

    // 3: declared API version, higher wins
    impls.sort_by(|a, b| b.reported_version.cmp(&a.reported_version));

    // 2: general hardware before vendor-specific integration
    impls.sort_by_key(|info| info.default_accel_mode == MFX_ACCEL_MODE_VIA_HDDLUNITE);

    // 1: implementation type, hardware (2) before software (1)
    impls.sort_by(|a, b| b.impl_type.cmp(&a.impl_type));

    let mut next = 0;
    for info in impls.iter_mut() {
        if info.external_idx >= 0 {
            info.external_idx = next;
            next += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{
        ApiVersion, InitializationParam, MFX_ACCEL_MODE_VIA_VAAPI, MFX_IMPL_TYPE_HARDWARE,
        MFX_IMPL_TYPE_SOFTWARE,
    };
    use crate::paths::SearchPriority;
    use crate::runtime::LibInfo;
    use std::path::PathBuf;
    use std::ptr;

    fn make_lib(priority: SearchPriority) -> LibInfo {
        LibInfo::discovered(PathBuf::from("/tmp/libvpltest.so"), priority)
    }

    fn make_impl(lib: usize, impl_type: u32, accel: u32, version: ApiVersion) -> ImplInfo {
        ImplInfo {
            lib,
            impl_desc: ptr::null_mut(),
            impl_funcs: ptr::null_mut(),
            init_param: InitializationParam::default(),
            reported_version: version,
            lib_impl_idx: 0,
            legacy_adapter: None,
            external_idx: 0,
            adapter_idx: None,
            impl_type,
            default_accel_mode: accel,
        }
    }

    #[test]
    fn test_hardware_beats_software_and_version() {
        let libs = vec![make_lib(SearchPriority::DriverStore)];
        let mut impls = vec![
            make_impl(
                0,
                MFX_IMPL_TYPE_SOFTWARE,
                0,
                ApiVersion::new(2, 10),
            ),
            make_impl(
                0,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_VAAPI,
                ApiVersion::new(2, 5),
            ),
        ];
        prioritize(&mut impls, &libs);
        assert_eq!(impls[0].impl_type, MFX_IMPL_TYPE_HARDWARE);
        assert_eq!(impls[0].external_idx, 0);
        assert_eq!(impls[1].external_idx, 1);
    }

    #[test]
    fn test_ladder_rung_breaks_ties() {
        let libs = vec![
            make_lib(SearchPriority::EnvOnevpl),
            make_lib(SearchPriority::DriverStore),
        ];
        let mut impls = vec![
            make_impl(
                0,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_VAAPI,
                ApiVersion::new(2, 6),
            ),
            make_impl(
                1,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_VAAPI,
                ApiVersion::new(2, 6),
            ),
        ];
        prioritize(&mut impls, &libs);
        // driver-store rung comes out first
        assert_eq!(impls[0].lib, 1);
        assert_eq!(impls[0].external_idx, 0);
    }

    #[test]
    fn test_vsi_hardware_sorts_after_general() {
        let libs = vec![make_lib(SearchPriority::DriverStore)];
        let mut impls = vec![
            make_impl(
                0,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_HDDLUNITE,
                ApiVersion::new(2, 8),
            ),
            make_impl(
                0,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_VAAPI,
                ApiVersion::new(2, 4),
            ),
        ];
        prioritize(&mut impls, &libs);
        assert_eq!(impls[0].default_accel_mode, MFX_ACCEL_MODE_VIA_VAAPI);
    }

    #[test]
    fn test_filtered_entries_keep_minus_one() {
        let libs = vec![make_lib(SearchPriority::DriverStore)];
        let mut impls = vec![
            make_impl(
                0,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_VAAPI,
                ApiVersion::new(2, 6),
            ),
            make_impl(
                0,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_VAAPI,
                ApiVersion::new(2, 6),
            ),
        ];
        impls[1].external_idx = -1;
        prioritize(&mut impls, &libs);
        let valid: Vec<i32> = impls.iter().map(|i| i.external_idx).collect();
        assert!(valid.contains(&0));
        assert!(valid.contains(&-1));
        assert!(!valid.contains(&1));
    }

    #[test]
    fn test_prioritize_is_idempotent() {
        let libs = vec![
            make_lib(SearchPriority::DriverStore),
            make_lib(SearchPriority::Legacy),
        ];
        let mut impls = vec![
            make_impl(0, MFX_IMPL_TYPE_SOFTWARE, 0, ApiVersion::new(2, 9)),
            make_impl(
                1,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_VAAPI,
                ApiVersion::new(2, 6),
            ),
            make_impl(
                0,
                MFX_IMPL_TYPE_HARDWARE,
                MFX_ACCEL_MODE_VIA_HDDLUNITE,
                ApiVersion::new(2, 7),
            ),
        ];
        prioritize(&mut impls, &libs);
        let first: Vec<(usize, i32)> = impls.iter().map(|i| (i.lib, i.external_idx)).collect();
        prioritize(&mut impls, &libs);
        let second: Vec<(usize, i32)> = impls.iter().map(|i| (i.lib, i.external_idx)).collect();
        assert_eq!(first, second);
    }
}
