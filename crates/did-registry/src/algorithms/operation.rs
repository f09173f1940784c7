//! # Record Operations
//!
//! General operations queued on a transaction, as a tagged union.
//!
//! Each operation can be checked statically when it is queued, and applied to
//! an [`AllocationState`] during planning. `apply` is a pure state transition:
//! it validates the operation against the record it would run on, produces the
//! new record and carries the peak storage size forward.

use crate::domain::entities::{DidRecord, Service, UpdateArgs, VerificationMethod, VerificationMethodType};
use crate::domain::errors::DidError;
use crate::domain::eth_address::{address_from_raw_pubkey, EthAddress};
use crate::domain::flags::{FlagTransition, VmFlag, VmFlags};
use crate::domain::identifier::{validate_fragment, Pubkey, DEFAULT_KEY_FRAGMENT};
use crate::domain::instruction::DidInstruction;
use crate::domain::invariants::{
    invariant_no_lockout, invariant_unique_method_fragments, invariant_update_args,
    normalize_controllers,
};
use crate::domain::size::total_storage_size;

/// Record view and the storage size it needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationState {
    /// Record as it would be after the operations applied so far.
    pub record: DidRecord,
    /// Largest storage size any intermediate record needed.
    pub required_size: usize,
}

impl AllocationState {
    /// Start from a stored record and its allocated size.
    pub fn new(record: DidRecord, current_size: usize) -> Self {
        Self {
            record,
            required_size: current_size,
        }
    }

    fn advance(&self, record: DidRecord) -> Self {
        let required_size = self.required_size.max(total_storage_size(&record));
        Self {
            record,
            required_size,
        }
    }
}

/// Who executes the operations being planned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanContext {
    /// Native key that signs the transaction, if any.
    pub native_signer: Option<Pubkey>,
    /// Address of the eth signer, if instructions will be eth-signed.
    pub eth_signer: Option<EthAddress>,
}

impl PlanContext {
    /// Whether a method's own key signs the transaction.
    pub fn is_self_signed(&self, method: &VerificationMethod) -> bool {
        match method.method_type {
            VerificationMethodType::NativeEd25519 => self
                .native_signer
                .is_some_and(|key| method.key_data == key.as_bytes()[..]),
            VerificationMethodType::ExternalRecoverable => self
                .eth_signer
                .is_some_and(|address| method.key_data == address[..]),
            VerificationMethodType::ExternalFull => match self.eth_signer {
                Some(address) => address_from_raw_pubkey(&method.key_data)
                    .map(|derived| derived == address)
                    .unwrap_or(false),
                None => false,
            },
        }
    }

    /// Transition kind for updating `method`.
    pub fn update_transition(&self, method: &VerificationMethod) -> FlagTransition {
        if self.is_self_signed(method) {
            FlagTransition::SelfSignedUpdate
        } else {
            FlagTransition::OtherSignedUpdate
        }
    }
}

/// A general (non-allocating) record operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DidOperation {
    AddVerificationMethod(VerificationMethod),
    RemoveVerificationMethod(String),
    AddService {
        service: Service,
        allow_overwrite: bool,
    },
    RemoveService(String),
    SetVmFlags {
        fragment: String,
        flags: VmFlags,
    },
    SetControllers {
        native: Vec<Pubkey>,
        other: Vec<String>,
    },
    Update(UpdateArgs),
}

impl DidOperation {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        self.instruction().name()
    }

    /// Instruction this operation submits.
    pub fn instruction(&self) -> DidInstruction {
        match self {
            DidOperation::AddVerificationMethod(method) => DidInstruction::AddVerificationMethod {
                method: method.clone(),
            },
            DidOperation::RemoveVerificationMethod(fragment) => {
                DidInstruction::RemoveVerificationMethod {
                    fragment: fragment.clone(),
                }
            }
            DidOperation::AddService {
                service,
                allow_overwrite,
            } => DidInstruction::AddService {
                service: service.clone(),
                allow_overwrite: *allow_overwrite,
            },
            DidOperation::RemoveService(fragment) => DidInstruction::RemoveService {
                fragment: fragment.clone(),
            },
            DidOperation::SetVmFlags { fragment, flags } => DidInstruction::SetVmFlags {
                fragment: fragment.clone(),
                flags: *flags,
            },
            DidOperation::SetControllers { native, other } => DidInstruction::SetControllers {
                native: native.clone(),
                other: other.clone(),
            },
            DidOperation::Update(args) => DidInstruction::Update(args.clone()),
        }
    }

    /// Operation carried by a general instruction.
    pub fn from_instruction(instruction: &DidInstruction) -> Option<Self> {
        let op = match instruction {
            DidInstruction::AddVerificationMethod { method } => {
                DidOperation::AddVerificationMethod(method.clone())
            }
            DidInstruction::RemoveVerificationMethod { fragment } => {
                DidOperation::RemoveVerificationMethod(fragment.clone())
            }
            DidInstruction::AddService {
                service,
                allow_overwrite,
            } => DidOperation::AddService {
                service: service.clone(),
                allow_overwrite: *allow_overwrite,
            },
            DidInstruction::RemoveService { fragment } => {
                DidOperation::RemoveService(fragment.clone())
            }
            DidInstruction::SetVmFlags { fragment, flags } => DidOperation::SetVmFlags {
                fragment: fragment.clone(),
                flags: *flags,
            },
            DidInstruction::SetControllers { native, other } => DidOperation::SetControllers {
                native: native.clone(),
                other: other.clone(),
            },
            DidInstruction::Update(args) => DidOperation::Update(args.clone()),
            DidInstruction::Initialize { .. }
            | DidInstruction::Resize { .. }
            | DidInstruction::Close
            | DidInstruction::Migrate { .. } => return None,
        };
        Some(op)
    }

    /// Whether this operation may grow the record.
    pub fn may_grow(&self) -> bool {
        matches!(
            self,
            DidOperation::AddVerificationMethod(_)
                | DidOperation::AddService { .. }
                | DidOperation::SetControllers { .. }
                | DidOperation::Update(_)
        )
    }

    /// Checks that need no stored record.
    pub fn validate_static(&self, authority: &Pubkey) -> Result<(), DidError> {
        match self {
            DidOperation::AddVerificationMethod(method) => {
                method.validate()?;
                FlagTransition::Add.validate(VmFlags::NONE, method.flags)
            }
            DidOperation::RemoveVerificationMethod(fragment)
            | DidOperation::RemoveService(fragment)
            | DidOperation::SetVmFlags { fragment, .. } => validate_fragment(fragment),
            DidOperation::AddService { service, .. } => validate_fragment(&service.fragment),
            DidOperation::SetControllers { native, other } => {
                normalize_controllers(authority, native, other).map(|_| ())
            }
            DidOperation::Update(args) => {
                invariant_update_args(args)?;
                normalize_controllers(authority, &args.native_controllers, &args.other_controllers)
                    .map(|_| ())
            }
        }
    }

    /// Apply to a record view.
    pub fn apply(
        &self,
        state: &AllocationState,
        ctx: &PlanContext,
    ) -> Result<AllocationState, DidError> {
        let mut record = state.record.clone();
        match self {
            DidOperation::AddVerificationMethod(method) => {
                FlagTransition::Add.validate(VmFlags::NONE, method.flags)?;
                if record.find_method(&method.fragment).is_some() {
                    return Err(DidError::FragmentAlreadyInUse(method.fragment.clone()));
                }
                record.methods.push(method.clone());
            }
            DidOperation::RemoveVerificationMethod(fragment) => {
                remove_method(&mut record, fragment)?;
                invariant_no_lockout(&record)?;
            }
            DidOperation::AddService {
                service,
                allow_overwrite,
            } => match record.services.iter_mut().find(|s| s.fragment == service.fragment) {
                Some(existing) if *allow_overwrite => *existing = service.clone(),
                Some(_) => return Err(DidError::FragmentAlreadyInUse(service.fragment.clone())),
                None => record.services.push(service.clone()),
            },
            DidOperation::RemoveService(fragment) => {
                let before = record.services.len();
                record.services.retain(|s| s.fragment != *fragment);
                if record.services.len() == before {
                    return Err(DidError::FragmentNotFound(fragment.clone()));
                }
            }
            DidOperation::SetVmFlags { fragment, flags } => {
                let method = record
                    .find_method_mut(fragment)
                    .ok_or_else(|| DidError::FragmentNotFound(fragment.clone()))?;
                ctx.update_transition(method).validate(method.flags, *flags)?;
                method.flags = *flags;
                invariant_no_lockout(&record)?;
            }
            DidOperation::SetControllers { native, other } => {
                let (native, other) = normalize_controllers(&record.authority()?, native, other)?;
                record.native_controllers = native;
                record.other_controllers = other;
            }
            DidOperation::Update(args) => {
                record = apply_update(&record, args, ctx)?;
            }
        }
        invariant_unique_method_fragments(&record)?;
        Ok(state.advance(record))
    }
}

fn remove_method(record: &mut DidRecord, fragment: &str) -> Result<(), DidError> {
    let method = record
        .find_method(fragment)
        .ok_or_else(|| DidError::FragmentNotFound(fragment.to_string()))?;
    if method.has_flag(VmFlag::Protected) {
        return Err(DidError::GuardedFlagViolation(format!(
            "protected method '{}' cannot be removed",
            fragment
        )));
    }
    if fragment == DEFAULT_KEY_FRAGMENT {
        // The genesis method stays in place; removal strips its capabilities.
        record.initial_method.flags = VmFlags::NONE;
    } else {
        record.methods.retain(|m| m.fragment != fragment);
    }
    Ok(())
}

/// Merge bulk update arguments into a record.
///
/// Guarded flags cannot be expressed in a document, so those of surviving
/// methods are carried over from the record. Methods that are new, or whose
/// key changed, are checked as additions.
fn apply_update(
    record: &DidRecord,
    args: &UpdateArgs,
    ctx: &PlanContext,
) -> Result<DidRecord, DidError> {
    invariant_update_args(args)?;
    let mut next = record.clone();

    if let Some(entry) = args
        .verification_methods
        .iter()
        .find(|m| m.fragment == DEFAULT_KEY_FRAGMENT)
    {
        let current = &record.initial_method;
        let requested = carry_guarded(current.flags, entry.flags);
        ctx.update_transition(current).validate(current.flags, requested)?;
        next.initial_method.flags = requested;
    }

    next.methods.clear();
    for entry in args
        .verification_methods
        .iter()
        .filter(|m| m.fragment != DEFAULT_KEY_FRAGMENT)
    {
        let existing = record.methods.iter().find(|m| {
            m.fragment == entry.fragment
                && m.method_type == entry.method_type
                && m.key_data == entry.key_data
        });
        let method = match existing {
            Some(current) => {
                let requested = carry_guarded(current.flags, entry.flags);
                ctx.update_transition(current).validate(current.flags, requested)?;
                VerificationMethod {
                    flags: requested,
                    ..entry.clone()
                }
            }
            None => {
                FlagTransition::Add.validate(VmFlags::NONE, entry.flags)?;
                entry.clone()
            }
        };
        next.methods.push(method);
    }

    for dropped in record.methods.iter().filter(|m| {
        !next
            .methods
            .iter()
            .any(|n| n.fragment == m.fragment && n.key_data == m.key_data)
    }) {
        if dropped.has_flag(VmFlag::Protected) {
            return Err(DidError::GuardedFlagViolation(format!(
                "protected method '{}' cannot be removed",
                dropped.fragment
            )));
        }
    }

    next.services = args.services.clone();
    let (native, other) = normalize_controllers(
        &record.authority()?,
        &args.native_controllers,
        &args.other_controllers,
    )?;
    next.native_controllers = native;
    next.other_controllers = other;

    invariant_no_lockout(&next)?;
    Ok(next)
}

fn carry_guarded(current: VmFlags, requested: VmFlags) -> VmFlags {
    current
        .guarded()
        .into_iter()
        .fold(requested, |acc, flag| acc.with(flag))
}

/// Fold operations over a starting state.
pub fn plan(
    start: AllocationState,
    operations: &[DidOperation],
    ctx: &PlanContext,
) -> Result<AllocationState, DidError> {
    operations
        .iter()
        .try_fold(start, |state, op| op.apply(&state, ctx))
}
