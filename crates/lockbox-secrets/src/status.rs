//! Native status codes.
//!
//! Numeric values match the Security framework's `errSec*` codes so that a
//! status reported by any backend reads the same in logs and diagnostics.

/// `errSecUnimplemented`
pub const UNIMPLEMENTED: i32 = -4;
/// `errSecIO`
pub const IO: i32 = -36;
/// `errSecParam`
pub const PARAM: i32 = -50;
/// `errSecUserCanceled`
pub const USER_CANCELED: i32 = -128;
/// `errSecNotAvailable`
pub const NOT_AVAILABLE: i32 = -25291;
/// `errSecAuthFailed`
pub const AUTH_FAILED: i32 = -25293;
/// `errSecDuplicateItem`
pub const DUPLICATE_ITEM: i32 = -25299;
/// `errSecItemNotFound`
pub const ITEM_NOT_FOUND: i32 = -25300;
/// `errSecInteractionNotAllowed`
pub const INTERACTION_NOT_ALLOWED: i32 = -25308;
/// `errSecDecode`
pub const DECODE: i32 = -26275;
/// `errSecInternalComponent`
pub const INTERNAL: i32 = -26276;
/// `errSecMissingEntitlement`; also reported for sharing-group mismatches.
pub const MISSING_ENTITLEMENT: i32 = -34018;

/// Sharing-group mismatch sub-code.
pub const GROUP_MISMATCH: i32 = MISSING_ENTITLEMENT;

/// Short human-readable name for a status code.
pub fn describe(code: i32) -> &'static str {
    match code {
        0 => "success",
        UNIMPLEMENTED => "unimplemented",
        IO => "I/O error",
        PARAM => "invalid parameter",
        USER_CANCELED => "user canceled",
        NOT_AVAILABLE => "store not available",
        AUTH_FAILED => "authentication failed",
        DUPLICATE_ITEM => "duplicate item",
        ITEM_NOT_FOUND => "item not found",
        INTERACTION_NOT_ALLOWED => "interaction not allowed",
        DECODE => "unable to decode data",
        INTERNAL => "internal component failure",
        MISSING_ENTITLEMENT => "missing entitlement or sharing group mismatch",
        _ => "unknown status",
    }
}
