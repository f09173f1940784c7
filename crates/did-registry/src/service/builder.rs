//! # Transaction Composer
//!
//! Queues registry operations for one DID and turns them into a single
//! ordered instruction list:
//!
//! ```text
//! [initialize | resize | migrate]? + general operations* + close?
//! ```
//!
//! When general operations are queued, the stored record is fetched and the
//! operations are folded over it. The fold validates each operation against
//! the record it would run on and yields the peak storage size, from which a
//! missing initialize or resize is synthesised. Eth-signed builds bind
//! consecutive nonces to the signable instructions in list order.
//!
//! A builder is single-owner. Finalizing always clears the queue, on success
//! or failure.

use crate::algorithms::eth_sign::EthSigner;
use crate::algorithms::operation::{plan, AllocationState, DidOperation, PlanContext};
use crate::domain::{
    check_record, decode_account, decode_legacy_record, minimum_initial_size, total_storage_size,
    AddressScheme, DidError, DidIdentifier, DidInstruction, DidRecord, EthSignStatus, Instruction,
    InstructionAccounts, Pubkey, RegistryConfig, Service, UpdateArgs, VerificationMethod,
    VmFlags,
};
use crate::ports::outbound::{LedgerClient, Transaction};
use std::sync::Arc;
use tracing::{debug, info};

/// The single storage-allocating slot of a build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationRequest {
    /// Create the record with at least `size` bytes.
    Initialize { size: u32 },
    /// Reallocate the record to at least `size` bytes.
    Resize { size: u32 },
    /// Create the record from the legacy one.
    Migrate { close_legacy: bool },
}

impl AllocationRequest {
    fn instruction(&self) -> DidInstruction {
        match *self {
            AllocationRequest::Initialize { size } => DidInstruction::Initialize { size },
            AllocationRequest::Resize { size } => DidInstruction::Resize { size },
            AllocationRequest::Migrate { close_legacy } => DidInstruction::Migrate { close_legacy },
        }
    }
}

/// Composer for one logical transaction against one DID.
pub struct DidTransactionBuilder<L: LedgerClient> {
    ledger: Arc<L>,
    identifier: DidIdentifier,
    config: RegistryConfig,
    authority: Option<Pubkey>,
    payer: Option<Pubkey>,
    eth_signer: Option<EthSigner>,
    allocation: Option<AllocationRequest>,
    operations: Vec<DidOperation>,
    close: bool,
}

impl<L: LedgerClient> DidTransactionBuilder<L> {
    /// Empty builder for `identifier`.
    pub fn new(ledger: Arc<L>, identifier: DidIdentifier, config: RegistryConfig) -> Self {
        Self {
            ledger,
            identifier: identifier.without_fragment(),
            config,
            authority: None,
            payer: None,
            eth_signer: None,
            allocation: None,
            operations: Vec::new(),
            close: false,
        }
    }

    /// Native key that signs the transaction. Defaults to the DID authority
    /// unless an eth signer is set.
    pub fn with_authority(mut self, authority: Pubkey) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Fee payer. Defaults to the signing authority.
    pub fn with_payer(mut self, payer: Pubkey) -> Self {
        self.payer = Some(payer);
        self
    }

    /// Sign every signable instruction with an external-chain key.
    pub fn with_eth_signer(mut self, signer: EthSigner) -> Self {
        self.eth_signer = Some(signer);
        self
    }

    /// Toggle automatic initialize/resize planning.
    pub fn with_auto_allocate(mut self, auto_allocate: bool) -> Self {
        self.config.auto_allocate = auto_allocate;
        self
    }

    pub fn identifier(&self) -> &DidIdentifier {
        &self.identifier
    }

    /// Queued general operations.
    pub fn operations(&self) -> &[DidOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.allocation.is_none() && self.operations.is_empty() && !self.close
    }

    // =========================================================================
    // QUEUEING
    // =========================================================================

    /// Queue an initialize of at least `size` bytes.
    pub fn initialize(&mut self, size: u32) -> Result<&mut Self, DidError> {
        if (size as usize) < minimum_initial_size() {
            return Err(DidError::InsufficientSize {
                required: minimum_initial_size(),
                available: size as usize,
            });
        }
        self.set_allocation(AllocationRequest::Initialize { size })
    }

    /// Queue a resize to at least `size` bytes.
    pub fn resize(&mut self, size: u32) -> Result<&mut Self, DidError> {
        self.set_allocation(AllocationRequest::Resize { size })
    }

    /// Queue a migration from the legacy record.
    ///
    /// The migrated size is fixed by the legacy content, so operations that
    /// may grow the record cannot share the build.
    pub fn migrate(&mut self, close_legacy: bool) -> Result<&mut Self, DidError> {
        if self.operations.iter().any(DidOperation::may_grow) {
            return Err(DidError::AlreadySet("migrate"));
        }
        self.set_allocation(AllocationRequest::Migrate { close_legacy })
    }

    /// Queue closing the record after all other instructions.
    pub fn close(&mut self) -> Result<&mut Self, DidError> {
        if self.close {
            return Err(DidError::AlreadySet("close"));
        }
        debug!("[did] queued close for {}", self.identifier);
        self.close = true;
        Ok(self)
    }

    pub fn add_verification_method(
        &mut self,
        method: VerificationMethod,
    ) -> Result<&mut Self, DidError> {
        self.push(DidOperation::AddVerificationMethod(method))
    }

    pub fn remove_verification_method(&mut self, fragment: &str) -> Result<&mut Self, DidError> {
        self.push(DidOperation::RemoveVerificationMethod(fragment.to_string()))
    }

    /// Queue adding a service; with `allow_overwrite` an existing service
    /// with the same fragment is replaced.
    pub fn add_service(
        &mut self,
        service: Service,
        allow_overwrite: bool,
    ) -> Result<&mut Self, DidError> {
        self.push(DidOperation::AddService {
            service,
            allow_overwrite,
        })
    }

    pub fn remove_service(&mut self, fragment: &str) -> Result<&mut Self, DidError> {
        self.push(DidOperation::RemoveService(fragment.to_string()))
    }

    pub fn set_vm_flags(&mut self, fragment: &str, flags: VmFlags) -> Result<&mut Self, DidError> {
        self.push(DidOperation::SetVmFlags {
            fragment: fragment.to_string(),
            flags,
        })
    }

    pub fn set_controllers(
        &mut self,
        native: Vec<Pubkey>,
        other: Vec<String>,
    ) -> Result<&mut Self, DidError> {
        self.push(DidOperation::SetControllers { native, other })
    }

    /// Queue a bulk replacement.
    pub fn update(&mut self, args: UpdateArgs) -> Result<&mut Self, DidError> {
        self.push(DidOperation::Update(args))
    }

    fn set_allocation(&mut self, request: AllocationRequest) -> Result<&mut Self, DidError> {
        if self.allocation.is_some() {
            return Err(DidError::AlreadySet("allocation"));
        }
        debug!("[did] queued {:?} for {}", request, self.identifier);
        self.allocation = Some(request);
        Ok(self)
    }

    fn push(&mut self, op: DidOperation) -> Result<&mut Self, DidError> {
        op.validate_static(&self.identifier.authority)?;
        if matches!(self.allocation, Some(AllocationRequest::Migrate { .. })) && op.may_grow() {
            return Err(DidError::AlreadySet("migrate"));
        }
        debug!("[did] queued {} for {}", op.name(), self.identifier);
        self.operations.push(op);
        Ok(self)
    }

    // =========================================================================
    // FINALIZE
    // =========================================================================

    /// Compose the instruction list. Clears the queue.
    pub async fn instructions(&mut self) -> Result<Vec<Instruction>, DidError> {
        let result = self.compose().await;
        self.reset();
        result
    }

    /// Compose and submit. Clears the queue.
    pub async fn execute(&mut self) -> Result<String, DidError> {
        let signers = self.signers();
        let instructions = self.instructions().await?;
        let signature = self
            .ledger
            .submit(Transaction::new(instructions, signers))
            .await
            .map_err(DidError::from_ledger)?;
        info!("[did] submitted transaction {} for {}", signature, self.identifier);
        Ok(signature)
    }

    /// Native keys that sign the transaction.
    pub fn signers(&self) -> Vec<Pubkey> {
        let mut signers = Vec::with_capacity(2);
        let authority = self.native_signer();
        if let Some(payer) = self.payer.or(authority) {
            signers.push(payer);
        }
        if let Some(authority) = authority {
            if !signers.contains(&authority) {
                signers.push(authority);
            }
        }
        signers
    }

    fn reset(&mut self) {
        self.allocation = None;
        self.operations.clear();
        self.close = false;
    }

    fn plan_context(&self) -> PlanContext {
        PlanContext {
            native_signer: self.native_signer(),
            eth_signer: self.eth_signer.as_ref().map(EthSigner::address),
        }
    }

    /// Native key that signs as the authority. An eth signer without an
    /// explicit authority signs nothing natively.
    fn native_signer(&self) -> Option<Pubkey> {
        match (self.authority, &self.eth_signer) {
            (Some(authority), _) => Some(authority),
            (None, None) => Some(self.identifier.authority),
            (None, Some(_)) => None,
        }
    }

    async fn compose(&self) -> Result<Vec<Instruction>, DidError> {
        let allocation = if self.operations.is_empty() {
            self.allocation
        } else {
            self.plan_allocation().await?
        };

        let accounts = self.accounts(matches!(allocation, Some(AllocationRequest::Migrate { .. })))?;
        let native_signed = self.signers().contains(&self.identifier.authority);
        let build = |kind: DidInstruction| {
            let ix = Instruction::new(self.config.program_id, accounts, kind);
            if native_signed {
                ix.with_authority_signer()
            } else {
                ix
            }
        };

        let mut instructions: Vec<Instruction> = allocation
            .iter()
            .map(|a| build(a.instruction()))
            .chain(self.operations.iter().map(|op| build(op.instruction())))
            .collect();
        if self.close {
            instructions.push(build(DidInstruction::Close));
        }

        if let Some(signer) = &self.eth_signer {
            let mut nonce = self.current_nonce().await?;
            for instruction in instructions.iter_mut() {
                if instruction.eth_sign_status() == EthSignStatus::Unsigned {
                    signer.sign_instruction(instruction, nonce)?;
                    debug!(
                        "[did] bound {} to nonce {}",
                        instruction.kind.name(),
                        nonce
                    );
                    nonce += 1;
                }
            }
        }

        info!(
            "[did] composed {} instruction(s) for {}",
            instructions.len(),
            self.identifier
        );
        Ok(instructions)
    }

    /// Fold the queued operations over the stored record and decide the
    /// allocation instruction.
    async fn plan_allocation(&self) -> Result<Option<AllocationRequest>, DidError> {
        let ctx = self.plan_context();
        let (address, bump) = self.record_address()?;
        let stored = self.fetch(&address).await?;
        let auto = self.config.auto_allocate;

        match (self.allocation, stored) {
            (Some(AllocationRequest::Migrate { close_legacy }), None) => {
                let record = self.legacy_record(bump).await?;
                let start_size = total_storage_size(&record);
                plan(AllocationState::new(record, start_size), &self.operations, &ctx)?;
                Ok(Some(AllocationRequest::Migrate { close_legacy }))
            }
            (Some(AllocationRequest::Initialize { size }), None) => {
                let start = AllocationState::new(
                    DidRecord::generative(&self.identifier.authority, bump),
                    size as usize,
                );
                let end = plan(start, &self.operations, &ctx)?;
                let size = self.fit(size as usize, end.required_size, auto)?;
                Ok(Some(AllocationRequest::Initialize { size }))
            }
            (Some(AllocationRequest::Resize { size }), Some(data)) => {
                let record = decode_account(&data)?;
                let end = plan(AllocationState::new(record, size as usize), &self.operations, &ctx)?;
                let size = self.fit(size as usize, end.required_size, auto)?;
                Ok(Some(AllocationRequest::Resize { size }))
            }
            (None, Some(data)) => {
                let current = data.len();
                let record = decode_account(&data)?;
                let end = plan(AllocationState::new(record, current), &self.operations, &ctx)?;
                if end.required_size > current {
                    let size = self.fit(current, end.required_size, auto)?;
                    debug!(
                        "[did] planned resize {} -> {} for {}",
                        current, size, self.identifier
                    );
                    return Ok(Some(AllocationRequest::Resize { size }));
                }
                Ok(None)
            }
            (None, None) => {
                if !auto {
                    return Err(DidError::RecordAbsent(self.identifier.to_string()));
                }
                let start = AllocationState::new(
                    DidRecord::generative(&self.identifier.authority, bump),
                    minimum_initial_size(),
                );
                let end = plan(start, &self.operations, &ctx)?;
                let size = to_u32(end.required_size.max(minimum_initial_size()))?;
                debug!(
                    "[did] planned initialize of {} bytes for {}",
                    size, self.identifier
                );
                Ok(Some(AllocationRequest::Initialize { size }))
            }
            (Some(AllocationRequest::Initialize { .. }), Some(_))
            | (Some(AllocationRequest::Migrate { .. }), Some(_)) => {
                Err(DidError::RecordAlreadyInitialized(self.identifier.to_string()))
            }
            (Some(AllocationRequest::Resize { .. }), None) => {
                Err(DidError::RecordAbsent(self.identifier.to_string()))
            }
        }
    }

    /// Grow an explicit allocation to what the operations need.
    fn fit(&self, requested: usize, required: usize, auto: bool) -> Result<u32, DidError> {
        if required <= requested {
            return to_u32(requested);
        }
        if !auto {
            return Err(DidError::InsufficientSize {
                required,
                available: requested,
            });
        }
        to_u32(required)
    }

    async fn legacy_record(&self, bump: u8) -> Result<DidRecord, DidError> {
        let (legacy_address, _) = self
            .identifier
            .record_address(AddressScheme::Legacy, &self.config.legacy_program_id)?;
        let data = self
            .fetch(&legacy_address)
            .await?
            .ok_or_else(|| DidError::RecordAbsent(legacy_address.to_string()))?;
        let record = decode_legacy_record(&data)?.into_record(bump);
        check_record(&record)?;
        Ok(record)
    }

    async fn current_nonce(&self) -> Result<u64, DidError> {
        let (address, _) = self.record_address()?;
        match self.fetch(&address).await? {
            Some(data) => Ok(decode_account(&data)?.nonce),
            None => Ok(0),
        }
    }

    async fn fetch(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, DidError> {
        self.ledger
            .get_account(address)
            .await
            .map_err(|e| DidError::Network(e.to_string()))
    }

    fn record_address(&self) -> Result<(Pubkey, u8), DidError> {
        self.identifier
            .record_address(AddressScheme::Current, &self.config.program_id)
    }

    fn accounts(&self, with_legacy: bool) -> Result<InstructionAccounts, DidError> {
        let (did_data, _) = self.record_address()?;
        let legacy_did_data = if with_legacy {
            let (legacy, _) = self
                .identifier
                .record_address(AddressScheme::Legacy, &self.config.legacy_program_id)?;
            Some(legacy)
        } else {
            None
        };
        let payer = self
            .signers()
            .first()
            .copied()
            .unwrap_or(self.identifier.authority);
        Ok(InstructionAccounts {
            did_data,
            authority: self.identifier.authority,
            payer,
            legacy_did_data,
        })
    }
}

fn to_u32(size: usize) -> Result<u32, DidError> {
    u32::try_from(size).map_err(|_| DidError::InsufficientSize {
        required: size,
        available: u32::MAX as usize,
    })
}
