#![expect(
    unsafe_code,
    reason = "filter predicates walk backend-owned codec lists"
)]

//! Config-filter accumulation and validation.
//!
//! Applications narrow the implementation set by creating filter entries
//! and assigning each a `(property path, typed value)` pair. An entry holds
//! at most one property; setting another replaces it. Validation is the
//! conjunction of all entries plus the special-config rules, evaluated as
//! pure predicates so it can re-run after every mutation.

use std::os::raw::c_void;

use tracing::trace;

use crate::ffi::{ApiVersion, ImplDescription};

mod props;

pub(crate) use props::parse_device_id_x86;
pub use props::PropKey;

/// Typed filter value, mirroring the variant types of the C API.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// 16-bit unsigned.
    U16(u16),
    /// 32-bit unsigned (also carries codec four-character codes).
    U32(u32),
    /// 32-bit signed.
    I32(i32),
    /// 64-bit unsigned.
    U64(u64),
    /// Raw pointer (device handles).
    Ptr(*mut c_void),
    /// API version pair.
    Version(ApiVersion),
    /// String-valued descriptor fields.
    Str(String),
}

/// Handle to one filter entry of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigId(pub(crate) usize);

/// One filter entry. Carries at most one property at a time.
#[derive(Debug, Default)]
pub(crate) struct ConfigEntry {
    pub prop: Option<(PropKey, PropValue)>,
}

/// Out-of-band settings that bypass the per-capability filter.
///
/// `Option` stands in for the is-set flags of the C layout: zero is a
/// meaningful value for every field here, so presence has to be tracked
/// separately from the value.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SpecialConfig {
    pub device_handle_type: Option<u32>,
    pub device_handle: Option<*mut c_void>,
    pub acceleration_mode: Option<u32>,
    pub api_version: Option<ApiVersion>,
    pub adapter_index: Option<u32>,
}

impl SpecialConfig {
    /// Fold a special property into the config.
    pub(crate) fn apply(&mut self, key: PropKey, value: &PropValue) {
        match (key, value) {
            (PropKey::AccelerationMode, PropValue::U32(v)) => {
                self.acceleration_mode = Some(*v);
            }
            (PropKey::DeviceHandleType, PropValue::U32(v)) => {
                self.device_handle_type = Some(*v);
            }
            (PropKey::DeviceHandle, PropValue::Ptr(p)) => {
                self.device_handle = Some(*p);
            }
            (PropKey::DxgiAdapterIndex, PropValue::U32(v)) => {
                self.adapter_index = Some(*v);
            }
            (PropKey::ApiVersionFull, PropValue::U32(v)) => {
                self.api_version = Some(ApiVersion {
                    Minor: (*v & 0xFFFF) as u16,
                    Major: (*v >> 16) as u16,
                });
            }
            (PropKey::ApiVersionFull, PropValue::Version(v)) => {
                self.api_version = Some(*v);
            }
            (PropKey::ApiVersionMajor, PropValue::U16(v)) => {
                let mut ver = self.api_version.unwrap_or_default();
                ver.Major = *v;
                self.api_version = Some(ver);
            }
            (PropKey::ApiVersionMinor, PropValue::U16(v)) => {
                let mut ver = self.api_version.unwrap_or_default();
                ver.Minor = *v;
                self.api_version = Some(ver);
            }
            _ => {}
        }
    }
}

/// Resolve and type-check a property path.
pub(crate) fn resolve_property(name: &str, value: &PropValue) -> Option<(PropKey, bool)> {
    let key = props::lookup(name)?;
    Some((key, key.accepts(value)))
}

/// Check one descriptor-bound entry against a capability descriptor.
fn entry_passes(key: PropKey, value: &PropValue, desc: &ImplDescription) -> bool {
    match (key, value) {
        (PropKey::ImplType, PropValue::U32(v)) => desc.Impl == *v,
        (PropKey::VendorId, PropValue::U32(v)) => desc.VendorID == *v,
        (PropKey::VendorImplId, PropValue::U32(v)) => desc.VendorImplID == *v,
        (PropKey::ImplName, PropValue::Str(s)) => desc.impl_name() == *s,
        (PropKey::DeviceId, PropValue::Str(s)) => desc.device_id() == *s,
        // Safety: descriptors under validation are live by invariant; the
        // registry nulls released handles before revalidating.
        (PropKey::DecCodecId, PropValue::U32(v)) => unsafe {
            desc.dec_codecs().iter().any(|c| c.CodecID == *v)
        },
        (PropKey::EncCodecId, PropValue::U32(v)) => unsafe {
            desc.enc_codecs().iter().any(|c| c.CodecID == *v)
        },
        (PropKey::VppFilterFourcc, PropValue::U32(v)) => unsafe {
            desc.vpp_filters().iter().any(|f| f.FilterFourCC == *v)
        },
        // special keys were folded into SpecialConfig at set time
        _ => true,
    }
}

/// Validate one implementation against the full filter state.
///
/// `desc` is the implementation's capability descriptor (null once the
/// caller released it), `adapter_idx` its parsed x86 adapter index.
pub(crate) fn validate_impl(
    desc: *const ImplDescription,
    entries: &[ConfigEntry],
    special: &SpecialConfig,
    adapter_idx: Option<u32>,
) -> bool {
    if desc.is_null() {
        return false;
    }
    // Safety: non-null descriptor handles in the registry point at live
    // backend-owned (or shim-owned) blocks until loader teardown.
    let desc = unsafe { &*desc };

    for entry in entries {
        let Some((key, value)) = &entry.prop else {
            continue;
        };
        if key.is_special() {
            continue;
        }
        if !entry_passes(*key, value, desc) {
            trace!("filter {key:?} rejects {}", desc.impl_name());
            return false;
        }
    }

    // requested version is a floor, not an exact match
    if let Some(requested) = special.api_version {
        if desc.ApiVersion < requested {
            return false;
        }
    }

    if let Some(requested) = special.adapter_index {
        if adapter_idx != Some(requested) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::ffi::{
        CodecDescription, MFX_CODEC_AVC, MFX_CODEC_HEVC, MFX_IMPL_TYPE_HARDWARE,
    };

    fn entry(key_path: &str, value: PropValue) -> ConfigEntry {
        let (key, ok) = resolve_property(key_path, &value).unwrap();
        assert!(ok);
        ConfigEntry {
            prop: Some((key, value)),
        }
    }

    fn hw_desc(enc: &'static [CodecDescription]) -> ImplDescription {
        let mut desc = ImplDescription {
            Impl: MFX_IMPL_TYPE_HARDWARE,
            ApiVersion: ApiVersion::new(2, 6),
            ..ImplDescription::default()
        };
        desc.Enc.NumCodecs = enc.len() as u16;
        desc.Enc.Codecs = enc.as_ptr();
        desc
    }

    static HEVC_ONLY: [CodecDescription; 1] = [CodecDescription {
        CodecID: MFX_CODEC_HEVC,
        MaxcodecLevel: 0,
    }];

    #[test]
    fn test_codec_membership() {
        let desc = hw_desc(&HEVC_ONLY);
        let entries = [entry(
            "mfxImplDescription.mfxEncoderDescription.encoder.CodecID",
            PropValue::U32(MFX_CODEC_HEVC),
        )];
        let special = SpecialConfig::default();
        assert!(validate_impl(&desc, &entries, &special, None));

        let entries = [entry(
            "mfxImplDescription.mfxEncoderDescription.encoder.CodecID",
            PropValue::U32(MFX_CODEC_AVC),
        )];
        assert!(!validate_impl(&desc, &entries, &special, None));
    }

    #[test]
    fn test_impl_type_filter() {
        let desc = hw_desc(&HEVC_ONLY);
        let entries = [entry(
            "mfxImplDescription.Impl",
            PropValue::U32(MFX_IMPL_TYPE_HARDWARE),
        )];
        assert!(validate_impl(
            &desc,
            &entries,
            &SpecialConfig::default(),
            None
        ));
    }

    #[test]
    fn test_api_version_is_a_floor() {
        let desc = hw_desc(&HEVC_ONLY);
        let mut special = SpecialConfig::default();

        special.api_version = Some(ApiVersion::new(2, 2));
        assert!(validate_impl(&desc, &[], &special, None));

        special.api_version = Some(ApiVersion::new(2, 7));
        assert!(!validate_impl(&desc, &[], &special, None));
    }

    #[test]
    fn test_adapter_index_filter() {
        let desc = hw_desc(&HEVC_ONLY);
        let mut special = SpecialConfig::default();
        special.adapter_index = Some(1);

        assert!(validate_impl(&desc, &[], &special, Some(1)));
        assert!(!validate_impl(&desc, &[], &special, Some(0)));
        assert!(!validate_impl(&desc, &[], &special, None));
    }

    #[test]
    fn test_null_descriptor_fails() {
        assert!(!validate_impl(
            std::ptr::null(),
            &[],
            &SpecialConfig::default(),
            None
        ));
    }

    #[test]
    fn test_api_version_halves_merge() {
        let mut special = SpecialConfig::default();
        special.apply(PropKey::ApiVersionMajor, &PropValue::U16(2));
        special.apply(PropKey::ApiVersionMinor, &PropValue::U16(4));
        assert_eq!(special.api_version, Some(ApiVersion::new(2, 4)));
    }
}
