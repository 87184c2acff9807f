//! Instruction planning and ordering validation
//!
//! Durable nonce transactions carry `advance_nonce_account` as their first
//! instruction; the ledger only honours it there, and consuming it
//! invalidates the nonce value for replay:
//! 1. advance_nonce_account (if durable)
//! 2. transfer (sender -> destination)
//!
//! Blockhash transactions carry the transfer alone.

use crate::tx_builder::context::ValidityReference;
use crate::tx_builder::errors::TransactionBuilderError;
use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, system_instruction, system_program,
    transaction::Transaction,
};

/// `SystemInstruction::AdvanceNonceAccount` discriminator (u32 little-endian)
const ADVANCE_NONCE_DISCRIMINATOR: [u8; 4] = [4, 0, 0, 0];

/// Plan of instructions with ordering metadata
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    /// The ordered list of instructions for the transaction
    pub instructions: Vec<Instruction>,

    /// Whether this plan uses durable nonce
    /// - `true`: First instruction must be advance_nonce_account
    /// - `false`: Standard blockhash-based transaction
    pub is_durable: bool,
}

impl InstructionPlan {
    pub fn new(instructions: Vec<Instruction>, is_durable: bool) -> Self {
        Self {
            instructions,
            is_durable,
        }
    }
}

/// Plan the transfer, preceded by the nonce advance when `validity` is durable
///
/// # Errors
///
/// Returns `TransactionBuilderError::Configuration` for a zero amount or a
/// transfer to self.
pub fn plan_transfer_instructions(
    validity: &ValidityReference,
    sender: &Pubkey,
    destination: &Pubkey,
    lamports: u64,
) -> Result<InstructionPlan, TransactionBuilderError> {
    if lamports == 0 {
        return Err(TransactionBuilderError::configuration(
            "Transfer amount must be greater than 0 lamports",
        ));
    }
    if sender == destination {
        return Err(TransactionBuilderError::configuration(
            "Transfer destination must differ from the sender",
        ));
    }

    let mut instructions = Vec::with_capacity(2);

    if let Some((nonce_account, nonce_authority)) = validity.durable_accounts() {
        instructions.push(system_instruction::advance_nonce_account(
            &nonce_account,
            &nonce_authority,
        ));
    }

    instructions.push(system_instruction::transfer(sender, destination, lamports));

    Ok(InstructionPlan::new(instructions, validity.is_durable()))
}

/// Whether `ix` is a system program `advance_nonce_account`
pub fn is_advance_nonce(ix: &Instruction) -> bool {
    ix.program_id == system_program::id()
        && ix.data.len() >= 4
        && ix.data[..4] == ADVANCE_NONCE_DISCRIMINATOR
}

/// Validate instruction ordering against the transaction's mode
///
/// Expected order for durable nonce transactions:
/// 1. `advance_nonce_account` (REQUIRED FIRST for durable transactions)
/// 2. Program instructions
///
/// # Errors
///
/// Returns `TransactionBuilderError::InvalidInstructionOrder` if:
/// - Instruction list is empty
/// - Durable transaction doesn't start with advance_nonce
/// - Multiple advance_nonce instructions found
/// - advance_nonce found in non-durable transaction
pub fn sanity_check_ix_order(
    instructions: &[Instruction],
    is_durable: bool,
) -> Result<(), TransactionBuilderError> {
    let Some(first) = instructions.first() else {
        return Err(TransactionBuilderError::invalid_order(
            "Instruction list is empty",
        ));
    };

    if is_durable {
        if !is_advance_nonce(first) {
            return Err(TransactionBuilderError::invalid_order(format!(
                "Durable nonce transaction must start with advance_nonce_account, got program_id: {}",
                first.program_id
            )));
        }

        for (idx, ix) in instructions.iter().enumerate().skip(1) {
            if is_advance_nonce(ix) {
                return Err(TransactionBuilderError::invalid_order(format!(
                    "Multiple advance_nonce_account instructions found (at position {}). Only one allowed at position 0",
                    idx
                )));
            }
        }
    } else if let Some(idx) = instructions.iter().position(is_advance_nonce) {
        return Err(TransactionBuilderError::invalid_order(format!(
            "Non-durable transaction should not have advance_nonce_account (found at position {})",
            idx
        )));
    }

    Ok(())
}

/// Recover `(nonce_account, nonce_authority)` from a compiled transaction
/// whose first instruction advances a nonce
pub fn durable_accounts_of(tx: &Transaction) -> Option<(Pubkey, Pubkey)> {
    let message = &tx.message;
    let first = message.instructions.first()?;
    let program_id = message.account_keys.get(first.program_id_index as usize)?;

    if *program_id != system_program::id()
        || first.data.len() < 4
        || first.data[..4] != ADVANCE_NONCE_DISCRIMINATOR
    {
        return None;
    }

    // Accounts: [nonce, recent_blockhashes sysvar, authority]
    let nonce_account = message.account_keys.get(*first.accounts.first()? as usize)?;
    let authority = message.account_keys.get(*first.accounts.get(2)? as usize)?;
    Some((*nonce_account, *authority))
}
