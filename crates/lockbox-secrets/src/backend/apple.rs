//! Apple keychain backend.
//!
//! Entries are generic-password items with service = namespace and
//! account = key. Biometric entries carry a `SecAccessControl` bound to the
//! current biometry set, so the OS presents the prompt on read and invalidates
//! the item when fingers or faces change. Sharing groups map to the item's
//! access group; the OS enforces entitlements and reports `-34018` itself.
//!
//! Every query targets the data protection keychain. The legacy file keychain
//! ignores accessibility classes and access groups, so an item there would
//! carry weaker protection than requested.
//!
//! Attribute keys are the documented string values of the `kSec*` constants.

use std::collections::BTreeSet;

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::data::CFData;
use core_foundation::dictionary::{CFDictionary, CFMutableDictionary};
use core_foundation::string::CFString;
use core_foundation_sys::array::CFArrayRef;
use core_foundation_sys::base::{CFTypeRef, OSStatus};
use core_foundation_sys::data::CFDataRef;
use core_foundation_sys::dictionary::CFDictionaryRef;
use lockbox_core::{AccessPolicy, Accessibility, BiometricCapability};
use security_framework::access_control::{ProtectionMode, SecAccessControl};
use security_framework_sys::access_control::kSecAccessControlBiometryCurrentSet;
use security_framework_sys::base::errSecSuccess;
use security_framework_sys::item::{kSecClass, kSecClassGenericPassword};
use security_framework_sys::keychain_item::{SecItemAdd, SecItemCopyMatching, SecItemDelete};
use tracing::debug;
use zeroize::Zeroizing;

use super::Backend;
use crate::auth::DEFAULT_PROMPT;
use crate::crypto;
use crate::error::BackendError;
use crate::status;
use crate::types::StorageRequest;

const ATTR_SERVICE: &str = "svce";
const ATTR_ACCOUNT: &str = "acct";
const ATTR_ACCESS_GROUP: &str = "agrp";
const ATTR_ACCESSIBLE: &str = "pdmn";
const ATTR_ACCESS_CONTROL: &str = "accc";
const ATTR_DESCRIPTION: &str = "desc";
const VALUE_DATA: &str = "v_Data";
const RETURN_DATA: &str = "r_Data";
const RETURN_ATTRIBUTES: &str = "r_Attributes";
const MATCH_LIMIT: &str = "m_Limit";
const MATCH_LIMIT_ONE: &str = "m_LimitOne";
const MATCH_LIMIT_ALL: &str = "m_LimitAll";
const USE_OPERATION_PROMPT: &str = "u_OpPrompt";
const USE_DATA_PROTECTION_KEYCHAIN: &str = "nleg";

/// Description attribute marking biometric items, so enumeration knows when to challenge.
const BIOMETRIC_MARKER: &str = "lockbox.biometric";

/// Account used to discover the app identifier prefix.
const BUNDLE_SEED_ACCOUNT: &str = "bundleSeedID";

/// Upper bound on delete passes in `erase_all`; macOS removes one item per call.
const MAX_DELETE_PASSES: usize = 10_000;

/// `kSecAttrAccessible*ThisDeviceOnly` value for an accessibility class.
fn accessible_value(accessibility: Accessibility) -> &'static str {
    match accessibility {
        Accessibility::WhenUnlocked => "aku",
        Accessibility::AfterFirstUnlock => "cku",
        Accessibility::Always => "dku",
    }
}

fn protection_mode(accessibility: Accessibility) -> ProtectionMode {
    match accessibility {
        Accessibility::WhenUnlocked => ProtectionMode::AccessibleWhenUnlockedThisDeviceOnly,
        // Biometric items cannot be readable while locked; the closest class is used.
        Accessibility::AfterFirstUnlock | Accessibility::Always => {
            ProtectionMode::AccessibleAfterFirstUnlockThisDeviceOnly
        }
    }
}

fn biometric_access_control(
    accessibility: Accessibility,
) -> Result<SecAccessControl, BackendError> {
    SecAccessControl::create_with_protection(
        Some(protection_mode(accessibility)),
        kSecAccessControlBiometryCurrentSet,
    )
    .map_err(|e| BackendError::AccessControl(e.to_string()))
}

/// A keychain query under construction.
struct Query {
    dict: CFMutableDictionary<CFType, CFType>,
}

impl Query {
    fn generic_password(service: &str) -> Self {
        let mut dict = CFMutableDictionary::new();
        unsafe {
            dict.set(
                CFType::wrap_under_get_rule(kSecClass as *const _),
                CFType::wrap_under_get_rule(kSecClassGenericPassword as *const _),
            );
        }
        let mut query = Self { dict };
        query
            .string(ATTR_SERVICE, service)
            .flag(USE_DATA_PROTECTION_KEYCHAIN);
        query
    }

    fn set(&mut self, key: &str, value: CFType) -> &mut Self {
        self.dict.set(CFString::new(key).as_CFType(), value);
        self
    }

    fn string(&mut self, key: &str, value: &str) -> &mut Self {
        self.set(key, CFString::new(value).as_CFType())
    }

    fn flag(&mut self, key: &str) -> &mut Self {
        self.set(key, CFBoolean::true_value().as_CFType())
    }

    fn group(&mut self, group: Option<&str>) -> &mut Self {
        if let Some(group) = group {
            self.string(ATTR_ACCESS_GROUP, group);
        }
        self
    }

    fn as_dictionary(&self) -> CFDictionaryRef {
        self.dict.as_concrete_TypeRef()
    }

    fn add(&self) -> OSStatus {
        unsafe { SecItemAdd(self.as_dictionary(), std::ptr::null_mut()) }
    }

    fn delete(&self) -> OSStatus {
        unsafe { SecItemDelete(self.as_dictionary()) }
    }

    /// Whether any item matches, without returning data. Never prompts.
    fn exists(&self) -> Result<bool, BackendError> {
        match self.copy_matching() {
            Ok(result) => {
                drop(unsafe { CFType::wrap_under_create_rule(result) });
                Ok(true)
            }
            Err(status::ITEM_NOT_FOUND) => Ok(false),
            Err(code) => Err(BackendError::status(code, status::describe(code))),
        }
    }

    /// Run `SecItemCopyMatching`, returning the owned result on success.
    fn copy_matching(&self) -> Result<CFTypeRef, OSStatus> {
        let mut result: CFTypeRef = std::ptr::null();
        let code = unsafe { SecItemCopyMatching(self.as_dictionary(), &mut result) };
        if code == errSecSuccess && !result.is_null() {
            Ok(result)
        } else if code == errSecSuccess {
            Err(status::ITEM_NOT_FOUND)
        } else {
            Err(code)
        }
    }
}

fn check(code: OSStatus, context: &str) -> Result<(), BackendError> {
    if code == errSecSuccess {
        Ok(())
    } else {
        Err(BackendError::status(
            code,
            format!("{context}: {}", status::describe(code)),
        ))
    }
}

/// String attribute from a returned attribute dictionary.
fn string_attribute(attributes: &CFDictionary<CFString, CFType>, key: &str) -> Option<String> {
    attributes
        .find(&CFString::new(key))
        .and_then(|value| value.downcast::<CFString>())
        .map(|value| value.to_string())
}

/// Explain a failed grouped lookup: a key stored under another group is a
/// mismatch, anything else keeps its original status.
fn grouped_miss(request: &StorageRequest<'_>, code: OSStatus) -> BackendError {
    if code == status::ITEM_NOT_FOUND {
        if let Some(group) = request.sharing_group {
            let mut any_group = Query::generic_password(request.namespace);
            any_group
                .string(ATTR_ACCOUNT, request.key)
                .flag(RETURN_ATTRIBUTES)
                .string(MATCH_LIMIT, MATCH_LIMIT_ONE);
            match any_group.exists() {
                Ok(true) => {
                    return BackendError::group_mismatch(format!(
                        "entry is not visible in sharing group '{group}'"
                    ))
                }
                Ok(false) => {}
                Err(e) => return e,
            }
        }
    }
    BackendError::status(code, status::describe(code))
}

fn is_biometric_item(attributes: &CFDictionary<CFString, CFType>) -> bool {
    string_attribute(attributes, ATTR_DESCRIPTION).as_deref() == Some(BIOMETRIC_MARKER)
}

/// Stores entries in the Apple keychain.
#[derive(Debug, Default)]
pub struct AppleKeychainBackend;

impl AppleKeychainBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for AppleKeychainBackend {
    fn name(&self) -> &'static str {
        "keychain"
    }

    fn write(
        &self,
        request: &StorageRequest<'_>,
        value: &[u8],
        policy: &AccessPolicy,
    ) -> Result<(), BackendError> {
        let envelope = crypto::seal(value, request.password, request.key.as_bytes())?;

        let mut add = Query::generic_password(request.namespace);
        add.string(ATTR_ACCOUNT, request.key)
            .group(request.sharing_group)
            .set(VALUE_DATA, CFData::from_buffer(&envelope).as_CFType());
        if policy.require_biometrics {
            let access_control = biometric_access_control(policy.accessibility)?;
            add.set(ATTR_ACCESS_CONTROL, access_control.as_CFType())
                .string(ATTR_DESCRIPTION, BIOMETRIC_MARKER);
        } else {
            add.string(ATTR_ACCESSIBLE, accessible_value(policy.accessibility));
        }

        // Replace semantics: drop any previous item first.
        let mut existing = Query::generic_password(request.namespace);
        existing
            .string(ATTR_ACCOUNT, request.key)
            .group(request.sharing_group);
        let deleted = existing.delete();
        if deleted != errSecSuccess && deleted != status::ITEM_NOT_FOUND {
            return check(deleted, "failed to replace keychain item");
        }

        debug!(
            namespace = request.namespace,
            key = request.key,
            biometric = policy.require_biometrics,
            "adding keychain item"
        );
        check(add.add(), "failed to add keychain item")
    }

    fn read(&self, request: &StorageRequest<'_>) -> Result<Zeroizing<Vec<u8>>, BackendError> {
        let mut query = Query::generic_password(request.namespace);
        query
            .string(ATTR_ACCOUNT, request.key)
            .group(request.sharing_group)
            .flag(RETURN_DATA)
            .string(MATCH_LIMIT, MATCH_LIMIT_ONE)
            .string(USE_OPERATION_PROMPT, request.prompt_or_default());

        let result = query
            .copy_matching()
            .map_err(|code| grouped_miss(request, code))?;
        let data = unsafe { CFData::wrap_under_create_rule(result as CFDataRef) };
        let envelope = Zeroizing::new(data.bytes().to_vec());

        Ok(crypto::open(&envelope, request.password, request.key.as_bytes())?)
    }

    fn erase(&self, request: &StorageRequest<'_>) -> Result<(), BackendError> {
        let mut query = Query::generic_password(request.namespace);
        query
            .string(ATTR_ACCOUNT, request.key)
            .group(request.sharing_group);
        match query.delete() {
            code if code == errSecSuccess => Ok(()),
            code => Err(grouped_miss(request, code)),
        }
    }

    fn erase_all(&self, namespace: &str) -> Result<(), BackendError> {
        let query = Query::generic_password(namespace);
        for _ in 0..MAX_DELETE_PASSES {
            match query.delete() {
                code if code == errSecSuccess => continue,
                status::ITEM_NOT_FOUND => return Ok(()),
                code => return check(code, "failed to clear keychain namespace"),
            }
        }
        Err(BackendError::status(
            status::INTERNAL,
            "keychain namespace did not empty",
        ))
    }

    fn list_keys(
        &self,
        namespace: &str,
        prompt: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError> {
        // Attribute queries never prompt, so gated items are challenged below.
        let mut query = Query::generic_password(namespace);
        query
            .flag(RETURN_ATTRIBUTES)
            .string(MATCH_LIMIT, MATCH_LIMIT_ALL);

        let result = match query.copy_matching() {
            Ok(result) => result,
            Err(status::ITEM_NOT_FOUND) => return Ok(BTreeSet::new()),
            Err(code) => return Err(BackendError::status(code, status::describe(code))),
        };
        let items: CFArray<CFDictionary<CFString, CFType>> =
            unsafe { CFArray::wrap_under_create_rule(result as CFArrayRef) };

        let mut keys = BTreeSet::new();
        let mut gated = None;
        for attributes in items.iter() {
            let Some(account) = string_attribute(&attributes, ATTR_ACCOUNT) else {
                continue;
            };
            if gated.is_none() && is_biometric_item(&attributes) {
                gated = Some((
                    account.clone(),
                    string_attribute(&attributes, ATTR_ACCESS_GROUP),
                ));
            }
            keys.insert(account);
        }

        if let Some((account, group)) = gated {
            challenge_item(namespace, &account, group.as_deref(), prompt)?;
        }
        Ok(keys)
    }

    /// Reports a sensor if a biometry-bound access control can be created.
    ///
    /// The keychain API does not distinguish fingerprint from face, so an
    /// available sensor is reported as [`BiometricCapability::TouchEquivalent`].
    fn probe_biometrics(&self) -> BiometricCapability {
        match biometric_access_control(Accessibility::WhenUnlocked) {
            Ok(_) => BiometricCapability::TouchEquivalent,
            Err(e) => {
                debug!(error = %e, "biometric access control unavailable");
                BiometricCapability::None
            }
        }
    }
}

/// One data read of a biometric item, so the OS runs its challenge.
fn challenge_item(
    namespace: &str,
    account: &str,
    group: Option<&str>,
    prompt: Option<&str>,
) -> Result<(), BackendError> {
    let mut query = Query::generic_password(namespace);
    query
        .string(ATTR_ACCOUNT, account)
        .group(group)
        .flag(RETURN_DATA)
        .string(MATCH_LIMIT, MATCH_LIMIT_ONE)
        .string(USE_OPERATION_PROMPT, prompt.unwrap_or(DEFAULT_PROMPT));

    debug!(namespace, key = account, "challenging before enumeration");
    match query.copy_matching() {
        Ok(result) => {
            drop(unsafe { CFData::wrap_under_create_rule(result as CFDataRef) });
            Ok(())
        }
        // Deleted since the attribute query; nothing left to gate.
        Err(status::ITEM_NOT_FOUND) => Ok(()),
        Err(code) => Err(BackendError::status(code, status::describe(code))),
    }
}

/// The app identifier prefix ("bundle seed") the keychain assigns to this process.
///
/// Reads the access group of a marker item, creating it on first use. Access
/// groups have the form `PREFIX.identifier`.
pub fn bundle_seed_id() -> Result<String, BackendError> {
    let mut lookup = Query::generic_password("");
    lookup
        .string(ATTR_ACCOUNT, BUNDLE_SEED_ACCOUNT)
        .flag(RETURN_ATTRIBUTES);

    let result = match lookup.copy_matching() {
        Ok(result) => result,
        Err(status::ITEM_NOT_FOUND) => {
            let mut result: CFTypeRef = std::ptr::null();
            let code = unsafe { SecItemAdd(lookup.as_dictionary(), &mut result) };
            check(code, "failed to create bundle seed marker")?;
            if result.is_null() {
                return Err(BackendError::status(
                    status::INTERNAL,
                    "keychain returned no attributes for the bundle seed marker",
                ));
            }
            result
        }
        Err(code) => return Err(BackendError::status(code, status::describe(code))),
    };

    let attributes: CFDictionary<CFString, CFType> =
        unsafe { CFDictionary::wrap_under_create_rule(result as CFDictionaryRef) };
    let group = string_attribute(&attributes, ATTR_ACCESS_GROUP).ok_or_else(|| {
        BackendError::status(status::INTERNAL, "bundle seed marker has no access group")
    })?;

    group
        .split('.')
        .next()
        .filter(|seed| !seed.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BackendError::decode(format!("malformed access group '{group}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessible_values() {
        assert_eq!(accessible_value(Accessibility::WhenUnlocked), "aku");
        assert_eq!(accessible_value(Accessibility::AfterFirstUnlock), "cku");
        assert_eq!(accessible_value(Accessibility::Always), "dku");
    }

    #[test]
    fn test_queries_target_data_protection_keychain() {
        let query = Query::generic_password("ns");
        let key = CFString::new(USE_DATA_PROTECTION_KEYCHAIN).as_CFType();
        let flag = query
            .dict
            .find(&key)
            .and_then(|value| value.downcast::<CFBoolean>())
            .map(bool::from);
        assert_eq!(flag, Some(true));
    }

    #[test]
    fn test_biometric_items_are_recognized() {
        let gated = CFDictionary::from_CFType_pairs(&[
            (CFString::new(ATTR_ACCOUNT), CFString::new("k").as_CFType()),
            (
                CFString::new(ATTR_DESCRIPTION),
                CFString::new(BIOMETRIC_MARKER).as_CFType(),
            ),
        ]);
        let plain = CFDictionary::from_CFType_pairs(&[(
            CFString::new(ATTR_ACCOUNT),
            CFString::new("k").as_CFType(),
        )]);
        assert!(is_biometric_item(&gated));
        assert!(!is_biometric_item(&plain));
    }

    #[test]
    fn test_probe_does_not_fail() {
        let capability = AppleKeychainBackend::new().probe_biometrics();
        assert!(matches!(
            capability,
            BiometricCapability::None | BiometricCapability::TouchEquivalent
        ));
    }

    #[test]
    #[ignore]
    fn test_round_trip() {
        let backend = AppleKeychainBackend::new();
        let namespace = "lockbox-test-apple";
        backend.erase_all(namespace).unwrap();

        let request = StorageRequest::new(namespace, "k");
        backend
            .write(&request, b"v", &AccessPolicy::default())
            .unwrap();
        assert_eq!(&backend.read(&request).unwrap()[..], b"v");
        assert!(backend.list_keys(namespace, None).unwrap().contains("k"));

        backend.erase_all(namespace).unwrap();
        assert!(backend.list_keys(namespace, None).unwrap().is_empty());
    }

    #[test]
    #[ignore]
    fn test_bundle_seed_id() {
        let seed = bundle_seed_id().unwrap();
        assert!(!seed.is_empty());
        assert!(!seed.contains('.'));
    }

    #[test]
    #[ignore]
    fn test_group_mismatch_and_missing_key() {
        let backend = AppleKeychainBackend::new();
        let namespace = "lockbox-test-apple-groups";
        let seed = bundle_seed_id().unwrap();
        let group_a = format!("{seed}.lockbox.a");
        let group_b = format!("{seed}.lockbox.b");
        backend.erase_all(namespace).unwrap();

        let written = StorageRequest::new(namespace, "k").with_sharing_group(Some(&group_a));
        backend
            .write(&written, b"v", &AccessPolicy::default())
            .unwrap();

        let other = StorageRequest::new(namespace, "k").with_sharing_group(Some(&group_b));
        assert_eq!(
            backend.read(&other).unwrap_err().code(),
            Some(status::GROUP_MISMATCH)
        );
        let absent = StorageRequest::new(namespace, "absent").with_sharing_group(Some(&group_b));
        assert!(backend.read(&absent).unwrap_err().is_not_found());

        backend.erase_all(namespace).unwrap();
    }
}
