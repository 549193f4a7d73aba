//! Transactions: a hybrid of UTXO inputs/outputs (for double-spend
//! safety) and an account-style nonce (for anti-replay), with
//! address-locked outputs rather than script-locked ones.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::amount::{Amount, NonNegative};
use crate::cached::Cached;
use crate::codec::{Canonical, MapDecoder, MapEncoder};
use crate::error::CodecError;
use crate::hash::{h256, Hash};

/// A reference to a previous transaction's output: `(prev_txid, vout)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash,
    pub vout: u32,
}

impl Canonical for OutPoint {
    fn encode(&self, out: &mut Vec<u8>) {
        MapEncoder::new()
            .field("txid", &self.txid)
            .field("vout", &self.vout)
            .finish(out);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let mut dec = MapDecoder::parse(buf)?;
        let txid = dec.field("txid")?;
        let vout = dec.field("vout")?;
        dec.finish_strict()?;
        Ok(OutPoint { txid, vout })
    }
}

/// A new, unspent output a transaction creates.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub amount: Amount<NonNegative>,
}

impl Canonical for TxOutput {
    fn encode(&self, out: &mut Vec<u8>) {
        MapEncoder::new()
            .field("address", &self.address)
            .field("amount", &self.amount)
            .finish(out);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let mut dec = MapDecoder::parse(buf)?;
        let address = dec.field("address")?;
        let amount = dec.field("amount")?;
        dec.finish_strict()?;
        Ok(TxOutput { address, amount })
    }
}

/// Coinbase transactions mint new supply and carry no inputs; transfers
/// spend existing UTXOs. Validators pattern-match this exhaustively —
/// no inheritance, no "type" string field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxKind {
    Coinbase,
    Transfer,
}

impl Canonical for TxKind {
    fn encode(&self, out: &mut Vec<u8>) {
        let tag: u8 = match self {
            TxKind::Coinbase => 0,
            TxKind::Transfer => 1,
        };
        tag.encode(out);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        match u8::decode(buf)? {
            0 => Ok(TxKind::Coinbase),
            1 => Ok(TxKind::Transfer),
            other => Err(CodecError::BadTag(other)),
        }
    }
}

/// A transaction. `sender`/`public_key`/`signature` are absent for
/// coinbase transactions; `inputs` is always empty for coinbase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub tx_type: TxKind,
    pub sender: Option<Address>,
    pub recipient: Address,
    pub amount: Amount<NonNegative>,
    pub fee: Amount<NonNegative>,
    pub account_nonce: u64,
    pub timestamp: u64,
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<TxOutput>,
    pub public_key: Option<Vec<u8>>,
    pub signature: Option<[u8; 64]>,
    #[serde(skip)]
    txid: Cached<Hash>,
}

impl Eq for Transaction {}
impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.tx_type == other.tx_type
            && self.sender == other.sender
            && self.recipient == other.recipient
            && self.amount == other.amount
            && self.fee == other.fee
            && self.account_nonce == other.account_nonce
            && self.timestamp == other.timestamp
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.public_key == other.public_key
            && self.signature == other.signature
    }
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u32,
        tx_type: TxKind,
        sender: Option<Address>,
        recipient: Address,
        amount: Amount<NonNegative>,
        fee: Amount<NonNegative>,
        account_nonce: u64,
        timestamp: u64,
        inputs: Vec<OutPoint>,
        outputs: Vec<TxOutput>,
        public_key: Option<Vec<u8>>,
        signature: Option<[u8; 64]>,
    ) -> Self {
        Transaction {
            version,
            tx_type,
            sender,
            recipient,
            amount,
            fee,
            account_nonce,
            timestamp,
            inputs,
            outputs,
            public_key,
            signature,
            txid: Cached::new(),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.tx_type, TxKind::Coinbase) && self.inputs.is_empty()
    }

    /// Canonical encoding of every field except `signature` — this is
    /// both the signed payload and the txid preimage.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        MapEncoder::new()
            .field("version", &self.version)
            .field("tx_type", &self.tx_type)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("amount", &self.amount)
            .field("fee", &self.fee)
            .field("account_nonce", &self.account_nonce)
            .field("timestamp", &self.timestamp)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("public_key", &self.public_key)
            .finish(&mut out);
        out
    }

    pub fn txid(&self) -> Hash {
        if let Some(cached) = self.txid.value() {
            return cached;
        }
        h256(&self.signing_bytes())
    }

    /// Caches the txid so repeated calls to [`Transaction::txid`] don't
    /// re-hash; used right after decoding from storage/wire bytes.
    pub fn with_cached_txid(mut self) -> Self {
        let id = h256(&self.signing_bytes());
        self.txid = Cached::from(id);
        self
    }

    pub fn encoded_len(&self) -> usize {
        self.encode_to_vec().len()
    }
}

impl Canonical for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        MapEncoder::new()
            .field("version", &self.version)
            .field("tx_type", &self.tx_type)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("amount", &self.amount)
            .field("fee", &self.fee)
            .field("account_nonce", &self.account_nonce)
            .field("timestamp", &self.timestamp)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("public_key", &self.public_key)
            .field("signature", &self.signature)
            .finish(out);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let mut dec = MapDecoder::parse(buf)?;
        let version = dec.field("version")?;
        let tx_type = dec.field("tx_type")?;
        let sender = dec.field("sender")?;
        let recipient = dec.field("recipient")?;
        let amount = dec.field("amount")?;
        let fee = dec.field("fee")?;
        let account_nonce = dec.field("account_nonce")?;
        let timestamp = dec.field("timestamp")?;
        let inputs = dec.field("inputs")?;
        let outputs = dec.field("outputs")?;
        let public_key = dec.field("public_key")?;
        let signature = dec.field("signature")?;
        dec.finish_strict()?;

        Ok(Transaction::new(
            version,
            tx_type,
            sender,
            recipient,
            amount,
            fee,
            account_nonce,
            timestamp,
            inputs,
            outputs,
            public_key,
            signature,
        )
        .with_cached_txid())
    }
}
