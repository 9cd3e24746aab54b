//! Static property-path table.
//!
//! Filter properties are dotted paths into the capability descriptor.
//! Unknown paths are rejected at set time rather than silently ignored, so
//! a typo in an application filter fails fast.

use super::PropValue;

/// Recognized filter property, resolved from its dotted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKey {
    /// `mfxImplDescription.Impl`
    ImplType,
    /// `mfxImplDescription.VendorID`
    VendorId,
    /// `mfxImplDescription.VendorImplID`
    VendorImplId,
    /// `mfxImplDescription.ImplName`
    ImplName,
    /// `mfxImplDescription.Dev.DeviceID`
    DeviceId,
    /// `mfxImplDescription.ApiVersion.Version`
    ApiVersionFull,
    /// `mfxImplDescription.ApiVersion.Major`
    ApiVersionMajor,
    /// `mfxImplDescription.ApiVersion.Minor`
    ApiVersionMinor,
    /// `mfxImplDescription.mfxDecoderDescription.decoder.CodecID`
    DecCodecId,
    /// `mfxImplDescription.mfxEncoderDescription.encoder.CodecID`
    EncCodecId,
    /// `mfxImplDescription.mfxVPPDescription.filter.FilterFourCC`
    VppFilterFourcc,
    /// `mfxImplDescription.AccelerationMode` (special: session creation)
    AccelerationMode,
    /// `mfxHandleType` (special: session creation)
    DeviceHandleType,
    /// `mfxHDL` (special: session creation)
    DeviceHandle,
    /// `DXGIAdapterIndex` (special: session creation and validation)
    DxgiAdapterIndex,
}

impl PropKey {
    /// Whether the property routes into the special config instead of the
    /// per-descriptor comparison.
    pub(crate) fn is_special(self) -> bool {
        matches!(
            self,
            PropKey::AccelerationMode
                | PropKey::DeviceHandleType
                | PropKey::DeviceHandle
                | PropKey::DxgiAdapterIndex
                | PropKey::ApiVersionFull
                | PropKey::ApiVersionMajor
                | PropKey::ApiVersionMinor
        )
    }

    /// Whether `value` carries the typed variant this property expects.
    pub(crate) fn accepts(self, value: &PropValue) -> bool {
        match self {
            PropKey::ImplType
            | PropKey::VendorId
            | PropKey::VendorImplId
            | PropKey::DecCodecId
            | PropKey::EncCodecId
            | PropKey::VppFilterFourcc
            | PropKey::AccelerationMode
            | PropKey::DeviceHandleType
            | PropKey::DxgiAdapterIndex => matches!(value, PropValue::U32(_)),
            PropKey::ApiVersionFull => {
                matches!(value, PropValue::U32(_) | PropValue::Version(_))
            }
            PropKey::ApiVersionMajor | PropKey::ApiVersionMinor => {
                matches!(value, PropValue::U16(_))
            }
            PropKey::ImplName | PropKey::DeviceId => matches!(value, PropValue::Str(_)),
            PropKey::DeviceHandle => matches!(value, PropValue::Ptr(_)),
        }
    }
}

const PROPERTY_TABLE: &[(&str, PropKey)] = &[
    ("mfxImplDescription.Impl", PropKey::ImplType),
    ("mfxImplDescription.AccelerationMode", PropKey::AccelerationMode),
    ("mfxImplDescription.ApiVersion.Version", PropKey::ApiVersionFull),
    ("mfxImplDescription.ApiVersion.Major", PropKey::ApiVersionMajor),
    ("mfxImplDescription.ApiVersion.Minor", PropKey::ApiVersionMinor),
    ("mfxImplDescription.VendorID", PropKey::VendorId),
    ("mfxImplDescription.VendorImplID", PropKey::VendorImplId),
    ("mfxImplDescription.ImplName", PropKey::ImplName),
    ("mfxImplDescription.Dev.DeviceID", PropKey::DeviceId),
    (
        "mfxImplDescription.mfxDecoderDescription.decoder.CodecID",
        PropKey::DecCodecId,
    ),
    (
        "mfxImplDescription.mfxEncoderDescription.encoder.CodecID",
        PropKey::EncCodecId,
    ),
    (
        "mfxImplDescription.mfxVPPDescription.filter.FilterFourCC",
        PropKey::VppFilterFourcc,
    ),
    ("mfxHandleType", PropKey::DeviceHandleType),
    ("mfxHDL", PropKey::DeviceHandle),
    ("DXGIAdapterIndex", PropKey::DxgiAdapterIndex),
];

/// Resolve a dotted property path.
pub(crate) fn lookup(name: &str) -> Option<PropKey> {
    PROPERTY_TABLE
        .iter()
        .find(|(path, _)| *path == name)
        .map(|(_, key)| *key)
}

/// Parse an x86 GPU `DeviceID` string: `HEX` or `HEX/DEC`.
///
/// Returns the PCI device id and the adapter index (0 when the suffix is
/// absent).
pub(crate) fn parse_device_id_x86(s: &str) -> Option<(u32, u32)> {
    let (hex, dec) = match s.split_once('/') {
        Some((hex, dec)) => (hex, Some(dec)),
        None => (s, None),
    };
    if hex.is_empty() {
        return None;
    }
    let device_id = u32::from_str_radix(hex, 16).ok()?;
    let adapter_idx = match dec {
        Some(dec) => dec.parse::<u32>().ok()?,
        None => 0,
    };
    Some((device_id, adapter_idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_paths() {
        assert_eq!(
            lookup("mfxImplDescription.mfxEncoderDescription.encoder.CodecID"),
            Some(PropKey::EncCodecId)
        );
        assert_eq!(lookup("DXGIAdapterIndex"), Some(PropKey::DxgiAdapterIndex));
    }

    #[test]
    fn test_lookup_rejects_unknown_path() {
        assert_eq!(lookup("mfxImplDescription.NoSuchField"), None);
        assert_eq!(lookup(""), None);
    }

    #[test]
    fn test_parse_device_id_hex_only() {
        assert_eq!(parse_device_id_x86("4c8a"), Some((0x4c8a, 0)));
    }

    #[test]
    fn test_parse_device_id_with_adapter() {
        assert_eq!(parse_device_id_x86("56a0/2"), Some((0x56a0, 2)));
    }

    #[test]
    fn test_parse_device_id_rejects_garbage() {
        assert_eq!(parse_device_id_x86(""), None);
        assert_eq!(parse_device_id_x86("zz"), None);
        assert_eq!(parse_device_id_x86("4c8a/x"), None);
        assert_eq!(parse_device_id_x86("/3"), None);
    }

    #[test]
    fn test_type_checking() {
        assert!(PropKey::ImplType.accepts(&PropValue::U32(2)));
        assert!(!PropKey::ImplType.accepts(&PropValue::U16(2)));
        assert!(PropKey::ApiVersionMajor.accepts(&PropValue::U16(2)));
        assert!(PropKey::ImplName.accepts(&PropValue::Str("hw".into())));
        assert!(!PropKey::DeviceHandle.accepts(&PropValue::U32(0)));
    }
}
