//! Transaction data structures, signing and verification

use crate::hashing::{hash160, sha256};
use crate::lookup::{SpendableLookup, TransactionLookup};
use crate::wallet::{verify_signature, Wallet};
use crate::{codec, Address, Amount, CoreError, CoreResult, Hash, LockHash};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Value minted by every coinbase transaction
pub const COINBASE_REWARD: Amount = 10;

/// Output index carried by the single input of a coinbase transaction
pub const COINBASE_OUTPUT_INDEX: i32 = -1;

/// Size of the random data stored in a coinbase input
const COINBASE_DATA_LEN: usize = 32;

/// Reference to a previous output plus the proof of ownership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxInput {
    pub prev_tx_hash: Hash,
    pub output_index: i32,
    pub signature: Vec<u8>,
    /// Raw `X ∥ Y` public key of the spender
    pub public_key: Vec<u8>,
}

impl TxInput {
    /// Unsigned input spending `output_index` of `prev_tx_hash`
    pub fn new(prev_tx_hash: Hash, output_index: u32) -> Self {
        Self {
            prev_tx_hash,
            output_index: output_index as i32,
            signature: Vec::new(),
            public_key: Vec::new(),
        }
    }

    /// True for the sentinel reference used by coinbase inputs
    pub fn is_coinbase_ref(&self) -> bool {
        self.prev_tx_hash.is_zero() && self.output_index == COINBASE_OUTPUT_INDEX
    }

    /// Whether the public key in this input hashes to `lock_hash`
    pub fn uses_key(&self, lock_hash: &LockHash) -> bool {
        hash160(&self.public_key) == *lock_hash
    }
}

/// Value locked to the hash of an owner's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxOutput {
    pub value: Amount,
    pub lock_hash: LockHash,
}

impl TxOutput {
    pub fn new(value: Amount, address: &Address) -> Self {
        Self {
            value,
            lock_hash: *address.lock_hash(),
        }
    }

    pub fn is_locked_with(&self, lock_hash: &LockHash) -> bool {
        self.lock_hash == *lock_hash
    }
}

/// A value transfer; `hash` is derived from inputs and outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    pub hash: Hash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Build a transaction and compute its hash
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> CoreResult<Self> {
        let mut tx = Self {
            hash: Hash::zero(),
            inputs,
            outputs,
        };
        tx.hash = tx.compute_hash()?;
        Ok(tx)
    }

    /// Reward transaction paying [`COINBASE_REWARD`] to `to`.
    ///
    /// The input carries random data so that two rewards to the same address
    /// never share a hash.
    pub fn new_coinbase(to: &Address) -> CoreResult<Self> {
        let data: [u8; COINBASE_DATA_LEN] = rand::random();
        let input = TxInput {
            prev_tx_hash: Hash::zero(),
            output_index: COINBASE_OUTPUT_INDEX,
            signature: data.to_vec(),
            public_key: Vec::new(),
        };
        Self::new(vec![input], vec![TxOutput::new(COINBASE_REWARD, to)])
    }

    /// Transfer `amount` from `from` to `to`.
    ///
    /// Spendable outputs are taken greedily in the order `spendable` returns
    /// them until they cover `amount`; any remainder goes back to the sender.
    pub fn new_transfer<S>(
        from: &Wallet,
        to: &Address,
        amount: Amount,
        spendable: &S,
    ) -> Result<Self, S::Error>
    where
        S: SpendableLookup + ?Sized,
    {
        if amount == 0 {
            return Err(CoreError::InvalidTransaction("transfer amount must be positive".into()).into());
        }

        let sender = from.address();
        let mut selected = Vec::new();
        let mut accumulated: Amount = 0;
        for utxo in spendable.unspent_outputs(sender.lock_hash())? {
            if accumulated >= amount {
                break;
            }
            accumulated = accumulated.checked_add(utxo.output.value).ok_or_else(|| {
                CoreError::InvalidTransaction("spendable value overflows".into())
            })?;
            selected.push(utxo);
        }

        if accumulated < amount {
            return Err(CoreError::InsufficientFunds {
                address: sender.to_string(),
                available: accumulated,
                required: amount,
            }
            .into());
        }

        let inputs = selected
            .iter()
            .map(|utxo| TxInput::new(utxo.tx_hash, utxo.output_index))
            .collect();
        let mut outputs = vec![TxOutput::new(amount, to)];
        if accumulated > amount {
            outputs.push(TxOutput::new(accumulated - amount, &sender));
        }

        let prev_outputs: Vec<TxOutput> = selected.into_iter().map(|utxo| utxo.output).collect();
        let mut tx = Self {
            hash: Hash::zero(),
            inputs,
            outputs,
        };
        tx.sign_with_outputs(from, &prev_outputs)?;
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase_ref()
    }

    /// SHA-256 over the encoded inputs and outputs
    pub fn compute_hash(&self) -> CoreResult<Hash> {
        let encoded = codec::encode(&(&self.inputs, &self.outputs))?;
        Ok(sha256(&encoded))
    }

    /// Recompute the content hash and compare it with the stored one
    pub fn verify_hash(&self) -> CoreResult<()> {
        let computed = self.compute_hash()?;
        if computed != self.hash {
            return Err(CoreError::InvalidTransaction(format!(
                "hash mismatch: stored {}, computed {}",
                self.hash, computed
            )));
        }
        Ok(())
    }

    /// Copy with every signature and public key cleared
    pub fn trimmed_copy(&self) -> Self {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                prev_tx_hash: input.prev_tx_hash,
                output_index: input.output_index,
                signature: Vec::new(),
                public_key: Vec::new(),
            })
            .collect();
        Self {
            hash: self.hash,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// Message covered by the signature of input `index`: the trimmed copy
    /// with the referenced lock hash in that input's public-key slot.
    pub fn signing_hash(&self, index: usize, prev_lock_hash: &LockHash) -> CoreResult<Hash> {
        let mut trimmed = self.trimmed_copy();
        let input = trimmed.inputs.get_mut(index).ok_or_else(|| {
            CoreError::InvalidTransaction(format!("input {index} out of range"))
        })?;
        input.public_key = prev_lock_hash.as_bytes().to_vec();
        trimmed.compute_hash()
    }

    /// Outputs spent by this transaction, in input order
    pub fn referenced_outputs<L>(&self, lookup: &L) -> Result<Vec<TxOutput>, L::Error>
    where
        L: TransactionLookup + ?Sized,
    {
        let mut outputs = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let prev = lookup
                .find_transaction(&input.prev_tx_hash)?
                .ok_or(CoreError::UnknownReference(input.prev_tx_hash))?;
            let output = usize::try_from(input.output_index)
                .ok()
                .and_then(|index| prev.outputs.get(index))
                .ok_or(CoreError::MissingOutput {
                    tx_hash: input.prev_tx_hash,
                    index: input.output_index,
                })?;
            outputs.push(output.clone());
        }
        Ok(outputs)
    }

    /// Sign every input with `wallet`, resolving the spent outputs via `lookup`
    pub fn sign<L>(&mut self, wallet: &Wallet, lookup: &L) -> Result<(), L::Error>
    where
        L: TransactionLookup + ?Sized,
    {
        if self.is_coinbase() {
            return Ok(());
        }
        let prev_outputs = self.referenced_outputs(lookup)?;
        self.sign_with_outputs(wallet, &prev_outputs)?;
        Ok(())
    }

    fn sign_with_outputs(&mut self, wallet: &Wallet, prev_outputs: &[TxOutput]) -> CoreResult<()> {
        for (index, prev) in prev_outputs.iter().enumerate() {
            let digest = self.signing_hash(index, &prev.lock_hash)?;
            let signature = wallet.sign_digest(&digest)?;
            let input = &mut self.inputs[index];
            input.signature = signature;
            input.public_key = wallet.public_key().to_vec();
        }
        self.hash = self.compute_hash()?;
        Ok(())
    }

    /// Check every input signature against the outputs it spends.
    ///
    /// Coinbase transactions verify trivially.
    pub fn verify<L>(&self, lookup: &L) -> Result<(), L::Error>
    where
        L: TransactionLookup + ?Sized,
    {
        if self.is_coinbase() {
            return Ok(());
        }
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(CoreError::InvalidTransaction(format!(
                "transaction {} has no inputs or no outputs",
                self.hash
            ))
            .into());
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if input.is_coinbase_ref() || !seen.insert((input.prev_tx_hash, input.output_index)) {
                return Err(CoreError::InvalidTransaction(format!(
                    "transaction {} has an invalid or repeated input",
                    self.hash
                ))
                .into());
            }
        }

        let prev_outputs = self.referenced_outputs(lookup)?;
        for (index, (input, prev)) in self.inputs.iter().zip(&prev_outputs).enumerate() {
            let bad_signature = || CoreError::BadSignature {
                tx_hash: self.hash,
                input: index,
            };
            if !input.uses_key(&prev.lock_hash) {
                return Err(bad_signature().into());
            }
            let digest = self.signing_hash(index, &prev.lock_hash)?;
            if !verify_signature(&input.public_key, &digest, &input.signature) {
                return Err(bad_signature().into());
            }
        }

        let spent: u128 = prev_outputs.iter().map(|o| o.value as u128).sum();
        let created: u128 = self.outputs.iter().map(|o| o.value as u128).sum();
        if created > spent {
            return Err(CoreError::InvalidTransaction(format!(
                "transaction {} creates {created} from {spent}",
                self.hash
            ))
            .into());
        }
        Ok(())
    }

    /// Total value of the outputs
    pub fn output_value(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Transaction {}:", self.hash)?;
        for (i, input) in self.inputs.iter().enumerate() {
            writeln!(f, "     Input {i}:")?;
            writeln!(f, "       Prev tx:    {}", input.prev_tx_hash)?;
            writeln!(f, "       Out index:  {}", input.output_index)?;
            writeln!(f, "       Signature:  {}", hex::encode(&input.signature))?;
            writeln!(f, "       Public key: {}", hex::encode(&input.public_key))?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            writeln!(f, "     Output {i}:")?;
            writeln!(f, "       Value:      {}", output.value)?;
            writeln!(f, "       Lock hash:  {}", output.lock_hash.to_hex())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::Utxo;
    use std::collections::HashMap;

    fn funded(wallet: &Wallet) -> (Transaction, HashMap<Hash, Transaction>, Vec<Utxo>) {
        let coinbase = Transaction::new_coinbase(&wallet.address()).unwrap();
        let utxos = vec![Utxo {
            tx_hash: coinbase.hash,
            output_index: 0,
            output: coinbase.outputs[0].clone(),
        }];
        let mut known = HashMap::new();
        known.insert(coinbase.hash, coinbase.clone());
        (coinbase, known, utxos)
    }

    #[test]
    fn test_coinbase_shape() {
        let wallet = Wallet::generate();
        let tx = Transaction::new_coinbase(&wallet.address()).unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, COINBASE_REWARD);
        assert!(tx.outputs[0].is_locked_with(&wallet.lock_hash()));
        assert!(tx.verify_hash().is_ok());
        let empty: HashMap<Hash, Transaction> = HashMap::new();
        assert!(tx.verify(&empty).is_ok());
    }

    #[test]
    fn test_coinbase_hashes_are_unique() {
        let address = Wallet::generate().address();
        let a = Transaction::new_coinbase(&address).unwrap();
        let b = Transaction::new_coinbase(&address).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_transfer_with_change() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (coinbase, known, utxos) = funded(&alice);

        let tx = Transaction::new_transfer(&alice, &bob.address(), 3, utxos.as_slice()).unwrap();
        assert!(!tx.is_coinbase());
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].prev_tx_hash, coinbase.hash);
        assert_eq!(tx.outputs[0], TxOutput::new(3, &bob.address()));
        assert_eq!(tx.outputs[1], TxOutput::new(COINBASE_REWARD - 3, &alice.address()));
        assert!(tx.verify_hash().is_ok());
        assert!(tx.verify(&known).is_ok());
    }

    #[test]
    fn test_exact_transfer_has_no_change() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (_, known, utxos) = funded(&alice);

        let tx = Transaction::new_transfer(&alice, &bob.address(), COINBASE_REWARD, utxos.as_slice())
            .unwrap();
        assert_eq!(tx.outputs.len(), 1);
        assert!(tx.verify(&known).is_ok());
    }

    #[test]
    fn test_insufficient_funds() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (_, _, utxos) = funded(&alice);

        let err = Transaction::new_transfer(&alice, &bob.address(), COINBASE_REWARD + 1, utxos.as_slice())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientFunds {
                available: COINBASE_REWARD,
                required,
                ..
            } if required == COINBASE_REWARD + 1
        ));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let alice = Wallet::generate();
        let (_, _, utxos) = funded(&alice);
        let err = Transaction::new_transfer(&alice, &alice.address(), 0, utxos.as_slice()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransaction(_)));
    }

    #[test]
    fn test_greedy_selection_in_encounter_order() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let mut known = HashMap::new();
        let mut utxos = Vec::new();
        for _ in 0..3 {
            let coinbase = Transaction::new_coinbase(&alice.address()).unwrap();
            utxos.push(Utxo {
                tx_hash: coinbase.hash,
                output_index: 0,
                output: coinbase.outputs[0].clone(),
            });
            known.insert(coinbase.hash, coinbase);
        }

        let tx = Transaction::new_transfer(&alice, &bob.address(), 15, utxos.as_slice()).unwrap();
        let spent: Vec<Hash> = tx.inputs.iter().map(|i| i.prev_tx_hash).collect();
        assert_eq!(spent, vec![utxos[0].tx_hash, utxos[1].tx_hash]);
        assert_eq!(tx.outputs[1].value, 5);
        assert!(tx.verify(&known).is_ok());
    }

    #[test]
    fn test_signature_binds_to_owner_key() {
        let k1 = Wallet::generate();
        let k2 = Wallet::generate();
        let (_, known, utxos) = funded(&k1);

        let tx = Transaction::new_transfer(&k1, &k2.address(), 4, utxos.as_slice()).unwrap();
        assert!(tx.verify(&known).is_ok());

        // Presenting another key for the same input
        let mut swapped = tx.clone();
        swapped.inputs[0].public_key = k2.public_key().to_vec();
        assert!(matches!(
            swapped.verify(&known),
            Err(CoreError::BadSignature { input: 0, .. })
        ));

        // A K1 signature over an output locked to K2
        let (_, known_k2, utxos_k2) = funded(&k2);
        let mut forged = Transaction::new_transfer(&k2, &k1.address(), 4, utxos_k2.as_slice()).unwrap();
        let digest = forged.signing_hash(0, &k2.lock_hash()).unwrap();
        forged.inputs[0].signature = k1.sign_digest(&digest).unwrap();
        forged.inputs[0].public_key = k1.public_key().to_vec();
        assert!(matches!(
            forged.verify(&known_k2),
            Err(CoreError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_tampered_output_breaks_signature() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (_, known, utxos) = funded(&alice);

        let mut tx = Transaction::new_transfer(&alice, &bob.address(), 4, utxos.as_slice()).unwrap();
        tx.outputs[0].value = 5;
        tx.outputs[1].value = 5;
        assert!(tx.verify_hash().is_err());
        assert!(matches!(tx.verify(&known), Err(CoreError::BadSignature { .. })));
    }

    #[test]
    fn test_unknown_reference() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (coinbase, _, utxos) = funded(&alice);

        let tx = Transaction::new_transfer(&alice, &bob.address(), 4, utxos.as_slice()).unwrap();
        let empty: HashMap<Hash, Transaction> = HashMap::new();
        assert!(matches!(
            tx.verify(&empty),
            Err(CoreError::UnknownReference(hash)) if hash == coinbase.hash
        ));
    }

    #[test]
    fn test_sign_resolves_through_lookup() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (coinbase, known, _) = funded(&alice);

        let mut tx = Transaction::new(
            vec![TxInput::new(coinbase.hash, 0)],
            vec![TxOutput::new(COINBASE_REWARD, &bob.address())],
        )
        .unwrap();
        tx.sign(&alice, &known).unwrap();
        assert!(tx.verify_hash().is_ok());
        assert!(tx.verify(&known).is_ok());

        let mut bad_index = Transaction::new(
            vec![TxInput::new(coinbase.hash, 3)],
            vec![TxOutput::new(1, &bob.address())],
        )
        .unwrap();
        assert!(matches!(
            bad_index.sign(&alice, &known),
            Err(CoreError::MissingOutput { index: 3, .. })
        ));
    }

    #[test]
    fn test_verify_rejects_inflation() {
        let alice = Wallet::generate();
        let (coinbase, known, _) = funded(&alice);

        let mut tx = Transaction::new(
            vec![TxInput::new(coinbase.hash, 0)],
            vec![TxOutput::new(COINBASE_REWARD + 1, &alice.address())],
        )
        .unwrap();
        tx.sign(&alice, &known).unwrap();
        assert!(matches!(tx.verify(&known), Err(CoreError::InvalidTransaction(_))));
    }

    #[test]
    fn test_codec_roundtrip() {
        let alice = Wallet::generate();
        let (_, _, utxos) = funded(&alice);
        let tx = Transaction::new_transfer(&alice, &alice.address(), 2, utxos.as_slice()).unwrap();
        let decoded: Transaction = codec::decode(&codec::encode(&tx).unwrap()).unwrap();
        assert_eq!(decoded, tx);
    }
}
