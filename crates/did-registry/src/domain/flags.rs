//! # Verification-Method Flag Algebra
//!
//! 16-bit capability set carried by every verification method, plus the
//! guard rules for OwnershipProof and Protected.

use super::errors::DidError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named capability bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum VmFlag {
    /// `authentication` relationship.
    Authentication = 1 << 0,
    /// `assertionMethod` relationship.
    Assertion = 1 << 1,
    /// `keyAgreement` relationship.
    KeyAgreement = 1 << 2,
    /// `capabilityInvocation` relationship; may update the record.
    CapabilityInvocation = 1 << 3,
    /// `capabilityDelegation` relationship.
    CapabilityDelegation = 1 << 4,
    /// Hidden from the rendered document.
    DidDocHidden = 1 << 5,
    /// The key proved control of itself.
    OwnershipProof = 1 << 6,
    /// Only the key itself may change or remove this method.
    Protected = 1 << 7,
}

impl VmFlag {
    /// All flags in bit order.
    pub const ALL: [VmFlag; 8] = [
        VmFlag::Authentication,
        VmFlag::Assertion,
        VmFlag::KeyAgreement,
        VmFlag::CapabilityInvocation,
        VmFlag::CapabilityDelegation,
        VmFlag::DidDocHidden,
        VmFlag::OwnershipProof,
        VmFlag::Protected,
    ];

    /// Flags that a plain "add" may never carry.
    pub const GUARDED: [VmFlag; 2] = [VmFlag::OwnershipProof, VmFlag::Protected];

    /// Bit value.
    pub fn bit(self) -> u16 {
        self as u16
    }
}

/// Bitset over [`VmFlag`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmFlags(u16);

impl VmFlags {
    /// Empty set.
    pub const NONE: VmFlags = VmFlags(0);

    /// From raw bits; unknown bits are kept so newer flags survive a round trip.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Flags of the genesis method.
    pub fn genesis() -> Self {
        Self::from_array(&[VmFlag::CapabilityInvocation, VmFlag::OwnershipProof])
    }

    pub fn has(&self, flag: VmFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn set(&mut self, flag: VmFlag) {
        self.0 |= flag.bit();
    }

    pub fn clear(&mut self, flag: VmFlag) {
        self.0 &= !flag.bit();
    }

    /// Builder-style [`VmFlags::set`].
    pub fn with(mut self, flag: VmFlag) -> Self {
        self.set(flag);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Known flags present, in bit order.
    pub fn to_array(&self) -> Vec<VmFlag> {
        VmFlag::ALL.into_iter().filter(|f| self.has(*f)).collect()
    }

    pub fn from_array(flags: &[VmFlag]) -> Self {
        flags.iter().fold(Self::NONE, |acc, f| acc.with(*f))
    }

    /// Guarded flags present in this set.
    pub fn guarded(&self) -> Vec<VmFlag> {
        VmFlag::GUARDED
            .into_iter()
            .filter(|f| self.has(*f))
            .collect()
    }
}

impl fmt::Debug for VmFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VmFlags({:#06x} {:?})", self.0, self.to_array())
    }
}

impl From<VmFlag> for VmFlags {
    fn from(flag: VmFlag) -> Self {
        Self(flag.bit())
    }
}

/// Why a flag change is being attempted.
///
/// Guarded flags depend on who signs: the key itself may set them, anyone
/// else may not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagTransition {
    /// A new method is being added.
    Add,
    /// Flags updated under the method's own key.
    SelfSignedUpdate,
    /// Flags updated under some other authority.
    OtherSignedUpdate,
}

impl FlagTransition {
    /// Check a transition from `current` to `requested`.
    pub fn validate(self, current: VmFlags, requested: VmFlags) -> Result<(), DidError> {
        match self {
            FlagTransition::Add => match requested.guarded().first() {
                Some(flag) => Err(DidError::GuardedFlagViolation(format!(
                    "{:?} cannot be set when adding a verification method",
                    flag
                ))),
                None => Ok(()),
            },
            FlagTransition::SelfSignedUpdate => Ok(()),
            FlagTransition::OtherSignedUpdate => {
                if current.has(VmFlag::Protected) && current != requested {
                    return Err(DidError::GuardedFlagViolation(
                        "protected method can only be changed by its own key".to_string(),
                    ));
                }
                let introduced = VmFlag::GUARDED
                    .into_iter()
                    .find(|f| requested.has(*f) && !current.has(*f));
                match introduced {
                    Some(flag) => Err(DidError::GuardedFlagViolation(format!(
                        "{:?} can only be set by the key itself",
                        flag
                    ))),
                    None => Ok(()),
                }
            }
        }
    }
}
