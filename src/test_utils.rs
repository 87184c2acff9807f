//! Test Utilities Module
//!
//! An in-memory ledger implementing [`LedgerRpc`] for deterministic tests.
//! It verifies signatures, enforces blockhash validity windows and durable
//! nonce matching, applies the system-program instructions the pipeline
//! uses, charges fees and rejects duplicate submissions.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::rpc_manager::{
    ConfirmationOutcome, ConfirmationRequest, LedgerRpc, RpcManagerError, RpcResult,
};
use async_trait::async_trait;
use solana_sdk::{
    account::Account,
    hash::Hash,
    message::Message,
    nonce::state::{Data, DurableNonce, State, Versions},
    pubkey::Pubkey,
    signature::Signature,
    system_instruction::SystemInstruction,
    system_program,
    transaction::Transaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Fee charged per signature
pub const MOCK_LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Blocks a blockhash stays valid for after it is handed out
pub const BLOCKHASH_VALIDITY_WINDOW: u64 = 150;

const MOCK_ENDPOINT: &str = "mock://ledger";

struct LedgerState {
    accounts: HashMap<Pubkey, Account>,
    block_height: u64,
    latest_blockhash: Hash,
    /// blockhash -> last valid block height
    blockhashes: HashMap<Hash, u64>,
    processed: HashSet<Signature>,
    submitted: usize,
    fail_next: Option<String>,
}

impl LedgerState {
    /// Start a new block with a fresh blockhash
    fn new_block(&mut self) {
        self.block_height += 1;
        self.latest_blockhash = Hash::new_unique();
        self.blockhashes.insert(
            self.latest_blockhash,
            self.block_height + BLOCKHASH_VALIDITY_WINDOW,
        );
    }

    fn take_failure(&mut self) -> RpcResult<()> {
        match self.fail_next.take() {
            Some(message) => Err(RpcManagerError::Transport {
                endpoint: MOCK_ENDPOINT.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }
}

/// In-memory ledger
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new() -> Self {
        let mut state = LedgerState {
            accounts: HashMap::new(),
            block_height: 100,
            latest_blockhash: Hash::default(),
            blockhashes: HashMap::new(),
            processed: HashSet::new(),
            submitted: 0,
            fail_next: None,
        };
        state.new_block();
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Credit `lamports` to `pubkey`, creating a system account if needed
    pub fn airdrop(&self, pubkey: &Pubkey, lamports: u64) {
        let mut state = self.lock();
        state
            .accounts
            .entry(*pubkey)
            .or_insert_with(|| Account::new(0, 0, &system_program::id()))
            .lamports += lamports;
    }

    pub fn account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.lock().accounts.get(pubkey).cloned()
    }

    /// Rent-exempt minimum: (size + 128 bytes overhead) * 3480 lamports * 2 years
    pub fn rent_exempt_minimum(&self, data_len: usize) -> u64 {
        (data_len as u64 + 128) * 3_480 * 2
    }

    pub fn block_height(&self) -> u64 {
        self.lock().block_height
    }

    /// Let `blocks` blocks pass without any transaction
    pub fn advance_block_height(&self, blocks: u64) {
        let mut state = self.lock();
        for _ in 0..blocks {
            state.new_block();
        }
    }

    /// Make the next request of any kind fail with a transport error
    pub fn fail_next_request(&self, message: &str) {
        self.lock().fail_next = Some(message.to_string());
    }

    /// Number of `send_raw_transaction` calls that reached the ledger
    pub fn submitted_count(&self) -> usize {
        self.lock().submitted
    }

    pub fn is_processed(&self, signature: &Signature) -> bool {
        self.lock().processed.contains(signature)
    }

    fn execute(state: &mut LedgerState, tx: &Transaction) -> RpcResult<()> {
        let message = &tx.message;
        let fee_payer = message
            .account_keys
            .first()
            .copied()
            .ok_or_else(|| failed("transaction has no accounts"))?;

        let mut accounts = state.accounts.clone();
        let fee = MOCK_LAMPORTS_PER_SIGNATURE * tx.signatures.len() as u64;
        match accounts.get_mut(&fee_payer) {
            Some(payer) if payer.lamports >= fee => payer.lamports -= fee,
            _ => return Err(insufficient_funds()),
        }

        for ix in &message.instructions {
            let program_id = message
                .account_keys
                .get(ix.program_id_index as usize)
                .ok_or_else(|| failed("program index out of range"))?;
            if *program_id != system_program::id() {
                return Err(failed(&format!("unsupported program {}", program_id)));
            }

            let keys: Vec<(Pubkey, bool)> = ix
                .accounts
                .iter()
                .map(|&idx| {
                    let idx = idx as usize;
                    message
                        .account_keys
                        .get(idx)
                        .map(|key| (*key, message.is_signer(idx)))
                        .ok_or_else(|| failed("account index out of range"))
                })
                .collect::<RpcResult<_>>()?;

            let instruction: SystemInstruction = bincode::deserialize(&ix.data)
                .map_err(|e| failed(&format!("invalid instruction data: {}", e)))?;

            apply_system_instruction(
                &mut accounts,
                &keys,
                instruction,
                &state.latest_blockhash,
            )?;
        }

        state.accounts = accounts;
        Ok(())
    }

    /// Whether `tx` references a valid blockhash or the current nonce value
    fn check_validity(state: &LedgerState, tx: &Transaction) -> RpcResult<()> {
        let recent = tx.message.recent_blockhash;

        if let Some((nonce_account, _)) = crate::tx_builder::durable_accounts_of(tx) {
            let current = state
                .accounts
                .get(&nonce_account)
                .and_then(|account| bincode::deserialize::<Versions>(&account.data).ok())
                .and_then(|versions| match versions.state() {
                    State::Initialized(data) => Some(data.blockhash()),
                    State::Uninitialized => None,
                });
            return match current {
                Some(nonce_value) if nonce_value == recent => Ok(()),
                _ => Err(blockhash_not_found()),
            };
        }

        match state.blockhashes.get(&recent) {
            Some(&last_valid) if state.block_height <= last_valid => Ok(()),
            _ => Err(blockhash_not_found()),
        }
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn failed(message: &str) -> RpcManagerError {
    RpcManagerError::TransactionFailed {
        endpoint: MOCK_ENDPOINT.to_string(),
        message: message.to_string(),
    }
}

fn insufficient_funds() -> RpcManagerError {
    RpcManagerError::InsufficientFunds {
        endpoint: MOCK_ENDPOINT.to_string(),
    }
}

fn blockhash_not_found() -> RpcManagerError {
    RpcManagerError::BlockhashNotFound {
        endpoint: MOCK_ENDPOINT.to_string(),
    }
}

fn require_signer(keys: &[(Pubkey, bool)], position: usize) -> RpcResult<Pubkey> {
    match keys.get(position) {
        Some((key, true)) => Ok(*key),
        Some((key, false)) => Err(failed(&format!("{} did not sign", key))),
        None => Err(failed("missing instruction account")),
    }
}

fn key_at(keys: &[(Pubkey, bool)], position: usize) -> RpcResult<Pubkey> {
    keys.get(position)
        .map(|(key, _)| *key)
        .ok_or_else(|| failed("missing instruction account"))
}

fn debit(accounts: &mut HashMap<Pubkey, Account>, from: &Pubkey, lamports: u64) -> RpcResult<()> {
    match accounts.get_mut(from) {
        Some(account) if account.lamports >= lamports => {
            account.lamports -= lamports;
            Ok(())
        }
        _ => Err(insufficient_funds()),
    }
}

fn write_nonce(account: &mut Account, authority: Pubkey, blockhash: &Hash) -> RpcResult<()> {
    let data = Data::new(
        authority,
        DurableNonce::from_blockhash(blockhash),
        MOCK_LAMPORTS_PER_SIGNATURE,
    );
    account.data = bincode::serialize(&Versions::new(State::Initialized(data)))
        .map_err(|e| failed(&e.to_string()))?;
    Ok(())
}

fn apply_system_instruction(
    accounts: &mut HashMap<Pubkey, Account>,
    keys: &[(Pubkey, bool)],
    instruction: SystemInstruction,
    blockhash: &Hash,
) -> RpcResult<()> {
    match instruction {
        SystemInstruction::CreateAccount {
            lamports,
            space,
            owner,
        } => {
            let from = require_signer(keys, 0)?;
            let to = require_signer(keys, 1)?;
            if accounts
                .get(&to)
                .is_some_and(|a| a.lamports > 0 || !a.data.is_empty())
            {
                return Err(failed(&format!("account {} already in use", to)));
            }
            debit(accounts, &from, lamports)?;
            accounts.insert(to, Account::new(lamports, space as usize, &owner));
            Ok(())
        }
        SystemInstruction::InitializeNonceAccount(authority) => {
            let nonce = key_at(keys, 0)?;
            let account = accounts
                .get_mut(&nonce)
                .ok_or_else(|| failed("nonce account does not exist"))?;
            if account.owner != system_program::id() || account.data.len() != State::size() {
                return Err(failed("account is not a nonce account"));
            }
            let versions: Versions =
                bincode::deserialize(&account.data).map_err(|e| failed(&e.to_string()))?;
            if !matches!(versions.state(), State::Uninitialized) {
                return Err(failed("nonce account already initialized"));
            }
            write_nonce(account, authority, blockhash)
        }
        SystemInstruction::AdvanceNonceAccount => {
            let nonce = key_at(keys, 0)?;
            let authority = require_signer(keys, 2)?;
            let account = accounts
                .get_mut(&nonce)
                .ok_or_else(|| failed("nonce account does not exist"))?;
            let versions: Versions =
                bincode::deserialize(&account.data).map_err(|e| failed(&e.to_string()))?;
            let data = match versions.state() {
                State::Initialized(data) => data.clone(),
                State::Uninitialized => return Err(failed("nonce account is uninitialized")),
            };
            if data.authority != authority {
                return Err(failed("nonce authority did not sign"));
            }
            if data.durable_nonce == DurableNonce::from_blockhash(blockhash) {
                return Err(failed("nonce blockhash not expired"));
            }
            write_nonce(account, authority, blockhash)
        }
        SystemInstruction::Transfer { lamports } => {
            let from = require_signer(keys, 0)?;
            let to = key_at(keys, 1)?;
            debit(accounts, &from, lamports)?;
            accounts
                .entry(to)
                .or_insert_with(|| Account::new(0, 0, &system_program::id()))
                .lamports += lamports;
            Ok(())
        }
        other => Err(failed(&format!("unsupported instruction {:?}", other))),
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    fn endpoint(&self) -> String {
        MOCK_ENDPOINT.to_string()
    }

    async fn get_account(&self, pubkey: &Pubkey) -> RpcResult<Option<Account>> {
        let mut state = self.lock();
        state.take_failure()?;
        Ok(state.accounts.get(pubkey).cloned())
    }

    async fn get_latest_blockhash(&self) -> RpcResult<(Hash, u64)> {
        let mut state = self.lock();
        state.take_failure()?;
        let blockhash = state.latest_blockhash;
        let last_valid = state
            .blockhashes
            .get(&blockhash)
            .copied()
            .unwrap_or(state.block_height + BLOCKHASH_VALIDITY_WINDOW);
        Ok((blockhash, last_valid))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> RpcResult<u64> {
        self.lock().take_failure()?;
        Ok(self.rent_exempt_minimum(data_len))
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> RpcResult<Signature> {
        let mut state = self.lock();
        state.take_failure()?;
        state.submitted += 1;

        let tx: Transaction =
            bincode::deserialize(wire).map_err(|e| RpcManagerError::RpcResponse {
                endpoint: MOCK_ENDPOINT.to_string(),
                message: format!("failed to deserialize transaction: {}", e),
                code: Some(-32602),
            })?;

        if let Err(e) = tx.verify() {
            return Err(RpcManagerError::SignatureFailure {
                endpoint: MOCK_ENDPOINT.to_string(),
                message: e.to_string(),
            });
        }

        let signature = *tx
            .signatures
            .first()
            .ok_or_else(|| RpcManagerError::SignatureFailure {
                endpoint: MOCK_ENDPOINT.to_string(),
                message: "transaction carries no signatures".to_string(),
            })?;
        if state.processed.contains(&signature) {
            return Err(RpcManagerError::AlreadyProcessed {
                endpoint: MOCK_ENDPOINT.to_string(),
            });
        }

        Self::check_validity(&state, &tx)?;

        // Each accepted transaction lands in a block of its own
        state.new_block();
        Self::execute(&mut state, &tx)?;
        state.processed.insert(signature);

        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        request: ConfirmationRequest,
    ) -> RpcResult<ConfirmationOutcome> {
        let mut state = self.lock();
        state.take_failure()?;

        if state.processed.contains(&request.signature) {
            return Ok(ConfirmationOutcome::Confirmed);
        }
        match request.last_valid_block_height {
            Some(last_valid) if state.block_height > last_valid => Ok(ConfirmationOutcome::Expired),
            _ => Ok(ConfirmationOutcome::TimedOut),
        }
    }
}

/// Compile `instructions` into an unsigned transaction paid by `payer`
pub fn unsigned_transaction(
    instructions: &[solana_sdk::instruction::Instruction],
    payer: &Pubkey,
    recent_blockhash: Hash,
) -> Transaction {
    let message = Message::new_with_blockhash(instructions, Some(payer), &recent_blockhash);
    Transaction::new_unsigned(message)
}
