//! Transaction XDR helpers.
//!
//! Parsing, hashing, payment extraction, fee-bump wrapping, and
//! contract-call assembly over `stellar-xdr` types. These functions are
//! pure; all network I/O lives in [`crate::ledger`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use stellar_strkey::ed25519::PublicKey as StrkeyPublicKey;
use stellar_strkey::Contract as StrkeyContract;
use stellar_xdr::curr::{
    AccountId, Asset, ContractId, ContractIdPreimage, DecoratedSignature, FeeBumpTransaction,
    FeeBumpTransactionEnvelope, FeeBumpTransactionExt, FeeBumpTransactionInnerTx, Hash,
    HashIdPreimage, HashIdPreimageContractId, HostFunction, Int128Parts, InvokeContractArgs,
    InvokeHostFunctionOp, Limits, Memo, MuxedAccount, Operation, OperationBody, PaymentOp,
    Preconditions, PublicKey, ReadXdr, ScAddress, ScSymbol, ScVal, SequenceNumber,
    SorobanAuthorizationEntry, TimeBounds, TimePoint, Transaction, TransactionEnvelope,
    TransactionExt, TransactionV1Envelope, Uint256, VecM, WriteXdr,
};

use s402_proto::Network;

/// XDR envelope type tag for a plain transaction signature payload.
const ENVELOPE_TYPE_TX: u32 = 2;

/// XDR envelope type tag for a fee-bump signature payload.
const ENVELOPE_TYPE_TX_FEE_BUMP: u32 = 5;

/// Errors from XDR-level transaction handling.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// The data is not decodable XDR (or base64).
    #[error("invalid XDR: {0}")]
    InvalidXdr(String),

    /// The envelope is a shape the protocol does not accept (legacy V0 or
    /// an already fee-bumped transaction).
    #[error("unsupported envelope shape")]
    UnsupportedEnvelope,

    /// The transaction does not contain exactly one payment-style operation.
    #[error("transaction is not a single payment")]
    NotAPayment,

    /// An address was not a valid strkey for its expected kind.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An amount left the representable range.
    #[error("amount out of range")]
    AmountOutOfRange,
}

/// The asset a payment moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentAsset {
    /// The ledger's native asset.
    Native,
    /// A contract token, identified by its `C...` contract id. Classic
    /// trust-line assets are normalized to their Stellar Asset Contract id.
    Contract(String),
}

/// A payment extracted from a transaction envelope.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    /// The paying account (`G...`), from the transaction source.
    pub source: String,
    /// The receiving address.
    pub destination: String,
    /// Amount in the asset's smallest unit.
    pub amount: i128,
    /// The asset being moved.
    pub asset: PaymentAsset,
}

/// SHA-256 of the network passphrase, as mixed into signature payloads.
#[must_use]
pub fn network_id(network: Network) -> Hash {
    let digest = Sha256::digest(network.passphrase().as_bytes());
    Hash(digest.into())
}

/// Decodes a base64 transaction envelope.
///
/// # Errors
///
/// Returns [`TxError::InvalidXdr`] if the data is not base64 or not a
/// `TransactionEnvelope`.
pub fn parse_envelope(xdr_base64: &str) -> Result<TransactionEnvelope, TxError> {
    let bytes = BASE64
        .decode(xdr_base64)
        .map_err(|e| TxError::InvalidXdr(format!("base64 decode failed: {e}")))?;
    TransactionEnvelope::from_xdr(bytes, Limits::none())
        .map_err(|e| TxError::InvalidXdr(format!("envelope decode failed: {e}")))
}

/// Encodes a transaction envelope to base64 XDR.
///
/// # Errors
///
/// Returns [`TxError::InvalidXdr`] if serialization fails.
pub fn envelope_to_base64(envelope: &TransactionEnvelope) -> Result<String, TxError> {
    let bytes = envelope
        .to_xdr(Limits::none())
        .map_err(|e| TxError::InvalidXdr(format!("envelope encode failed: {e}")))?;
    Ok(BASE64.encode(bytes))
}

/// Computes the signature hash of a transaction on a given network.
///
/// `SHA256(network_id || ENVELOPE_TYPE_TX || tx_xdr)`.
///
/// # Errors
///
/// Returns [`TxError::InvalidXdr`] if the transaction fails to serialize.
pub fn transaction_hash(tx: &Transaction, network: Network) -> Result<[u8; 32], TxError> {
    let tx_xdr = tx
        .to_xdr(Limits::none())
        .map_err(|e| TxError::InvalidXdr(format!("transaction encode failed: {e}")))?;
    Ok(signature_hash(network, ENVELOPE_TYPE_TX, &tx_xdr))
}

/// Computes the signature hash of a fee-bump transaction.
///
/// # Errors
///
/// Returns [`TxError::InvalidXdr`] if the transaction fails to serialize.
pub fn fee_bump_hash(tx: &FeeBumpTransaction, network: Network) -> Result<[u8; 32], TxError> {
    let tx_xdr = tx
        .to_xdr(Limits::none())
        .map_err(|e| TxError::InvalidXdr(format!("fee-bump encode failed: {e}")))?;
    Ok(signature_hash(network, ENVELOPE_TYPE_TX_FEE_BUMP, &tx_xdr))
}

fn signature_hash(network: Network, envelope_type: u32, tx_xdr: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(network_id(network).0);
    hasher.update(envelope_type.to_be_bytes());
    hasher.update(tx_xdr);
    hasher.finalize().into()
}

/// Extracts the single payment carried by an envelope.
///
/// Accepts only V1 envelopes with exactly one operation that is either a
/// classic payment or a contract `transfer(from, to, amount)` invocation.
///
/// # Errors
///
/// - [`TxError::UnsupportedEnvelope`] for V0 or fee-bump envelopes
/// - [`TxError::NotAPayment`] for any other operation shape
pub fn extract_payment(
    envelope: &TransactionEnvelope,
    network: Network,
) -> Result<(&TransactionV1Envelope, PaymentDetails), TxError> {
    let inner = match envelope {
        TransactionEnvelope::Tx(v1) => v1,
        TransactionEnvelope::TxV0(_) | TransactionEnvelope::TxFeeBump(_) => {
            return Err(TxError::UnsupportedEnvelope)
        }
    };

    let ops = inner.tx.operations.as_slice();
    let [op] = ops else {
        return Err(TxError::NotAPayment);
    };

    let source = muxed_to_account_id(&inner.tx.source_account);
    let details = match &op.body {
        OperationBody::Payment(payment) => PaymentDetails {
            source,
            destination: muxed_to_account_id(&payment.destination),
            amount: i128::from(payment.amount),
            asset: match &payment.asset {
                Asset::Native => PaymentAsset::Native,
                credit => PaymentAsset::Contract(asset_contract_id(credit, network)),
            },
        },
        OperationBody::InvokeHostFunction(invoke) => extract_transfer(invoke, source)?,
        _ => return Err(TxError::NotAPayment),
    };

    Ok((inner, details))
}

/// Pulls the transfer details out of a contract invocation.
fn extract_transfer(
    invoke: &InvokeHostFunctionOp,
    source: String,
) -> Result<PaymentDetails, TxError> {
    let HostFunction::InvokeContract(args) = &invoke.host_function else {
        return Err(TxError::NotAPayment);
    };
    if args.function_name.0.to_utf8_string_lossy() != "transfer" {
        return Err(TxError::NotAPayment);
    }
    let [ScVal::Address(_from), ScVal::Address(to), ScVal::I128(parts)] = args.args.as_slice()
    else {
        return Err(TxError::NotAPayment);
    };
    let contract = sc_address_to_string(&args.contract_address).ok_or(TxError::NotAPayment)?;
    let destination = sc_address_to_string(to).ok_or(TxError::NotAPayment)?;

    Ok(PaymentDetails {
        source,
        destination,
        amount: i128_from_parts(parts),
        asset: PaymentAsset::Contract(contract),
    })
}

/// Whether the transaction's time bounds have elapsed at `now` (Unix secs).
#[must_use]
pub fn time_bounds_elapsed(tx: &Transaction, now: u64) -> bool {
    let bounds = match &tx.cond {
        Preconditions::Time(bounds) => Some(bounds),
        Preconditions::V2(v2) => v2.time_bounds.as_ref(),
        Preconditions::None => None,
    };
    match bounds {
        Some(TimeBounds { max_time, .. }) if max_time.0 != 0 => max_time.0 < now,
        _ => false,
    }
}

/// Converts a muxed account to its base `G...` account id.
#[must_use]
pub fn muxed_to_account_id(account: &MuxedAccount) -> String {
    let ed25519 = match account {
        MuxedAccount::Ed25519(key) => key,
        MuxedAccount::MuxedEd25519(muxed) => &muxed.ed25519,
    };
    StrkeyPublicKey(ed25519.0).to_string()
}

/// Parses a `G...` account id into a muxed account.
///
/// # Errors
///
/// Returns [`TxError::InvalidAddress`] for anything that is not an ed25519
/// public-key strkey.
pub fn account_to_muxed(account_id: &str) -> Result<MuxedAccount, TxError> {
    let key = StrkeyPublicKey::from_string(account_id)
        .map_err(|_| TxError::InvalidAddress(account_id.to_owned()))?;
    Ok(MuxedAccount::Ed25519(Uint256(key.0)))
}

/// Parses a `G...` account id into an XDR `AccountId`.
///
/// # Errors
///
/// Returns [`TxError::InvalidAddress`] on malformed input.
pub fn account_id(account: &str) -> Result<AccountId, TxError> {
    let key = StrkeyPublicKey::from_string(account)
        .map_err(|_| TxError::InvalidAddress(account.to_owned()))?;
    Ok(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key.0))))
}

/// Parses a `G...` or `C...` strkey into a contract-call address.
///
/// # Errors
///
/// Returns [`TxError::InvalidAddress`] on malformed input.
pub fn sc_address(address: &str) -> Result<ScAddress, TxError> {
    if let Ok(key) = StrkeyPublicKey::from_string(address) {
        return Ok(ScAddress::Account(AccountId(
            PublicKey::PublicKeyTypeEd25519(Uint256(key.0)),
        )));
    }
    if let Ok(contract) = StrkeyContract::from_string(address) {
        return Ok(ScAddress::Contract(ContractId(Hash(contract.0))));
    }
    Err(TxError::InvalidAddress(address.to_owned()))
}

/// Renders a contract-call address back into strkey form.
#[must_use]
pub fn sc_address_to_string(address: &ScAddress) -> Option<String> {
    match address {
        ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(key))) => {
            Some(StrkeyPublicKey(key.0).to_string())
        }
        ScAddress::Contract(contract) => Some(StrkeyContract(contract.0 .0).to_string()),
        _ => None,
    }
}

/// Derives the Stellar Asset Contract id for a classic asset.
///
/// `SHA256(HashIdPreimage::ContractId { network_id, Asset })`, rendered as a
/// `C...` strkey. This is how trust-line assets are compared against
/// contract-id requirements.
#[must_use]
pub fn asset_contract_id(asset: &Asset, network: Network) -> String {
    let preimage = HashIdPreimage::ContractId(HashIdPreimageContractId {
        network_id: network_id(network),
        contract_id_preimage: ContractIdPreimage::Asset(asset.clone()),
    });
    // Serialization of a fully-formed preimage cannot fail.
    let bytes = preimage
        .to_xdr(Limits::none())
        .unwrap_or_default();
    let digest = Sha256::digest(bytes);
    StrkeyContract(digest.into()).to_string()
}

/// Splits an `i128` into XDR high/low parts.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub const fn parts_from_i128(value: i128) -> Int128Parts {
    Int128Parts {
        hi: (value >> 64) as i64,
        lo: value as u64,
    }
}

/// Reassembles an `i128` from XDR high/low parts.
#[must_use]
pub const fn i128_from_parts(parts: &Int128Parts) -> i128 {
    ((parts.hi as i128) << 64) | (parts.lo as i128)
}

/// Builds an unsigned single-operation native payment transaction.
///
/// # Errors
///
/// Returns [`TxError`] on malformed addresses or amounts outside `i64`.
pub fn build_payment_transaction(
    source: &str,
    destination: &str,
    amount: i128,
    sequence: i64,
    max_time: u64,
) -> Result<Transaction, TxError> {
    let amount = i64::try_from(amount).map_err(|_| TxError::AmountOutOfRange)?;
    let operation = Operation {
        source_account: None,
        body: OperationBody::Payment(PaymentOp {
            destination: account_to_muxed(destination)?,
            asset: Asset::Native,
            amount,
        }),
    };
    Ok(Transaction {
        source_account: account_to_muxed(source)?,
        fee: 100,
        seq_num: SequenceNumber(sequence),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(max_time),
        }),
        memo: Memo::None,
        operations: single_operation(operation)?,
        ext: TransactionExt::V0,
    })
}

/// Builds an unsigned transaction invoking `transfer(from, to, amount)` on a
/// token contract. Authorization entries and Soroban resource data are
/// attached after simulation.
///
/// # Errors
///
/// Returns [`TxError`] on malformed addresses.
pub fn build_transfer_transaction(
    source: &str,
    destination: &str,
    contract: &str,
    amount: i128,
    sequence: i64,
    max_time: u64,
) -> Result<Transaction, TxError> {
    let contract_key = StrkeyContract::from_string(contract)
        .map_err(|_| TxError::InvalidAddress(contract.to_owned()))?;
    let args = InvokeContractArgs {
        contract_address: ScAddress::Contract(ContractId(Hash(contract_key.0))),
        function_name: ScSymbol(
            "transfer"
                .try_into()
                .map_err(|_| TxError::InvalidXdr("symbol too long".to_owned()))?,
        ),
        args: vec![
            ScVal::Address(sc_address(source)?),
            ScVal::Address(sc_address(destination)?),
            ScVal::I128(parts_from_i128(amount)),
        ]
        .try_into()
        .map_err(|_| TxError::InvalidXdr("argument vector".to_owned()))?,
    };
    let operation = Operation {
        source_account: None,
        body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
            host_function: HostFunction::InvokeContract(args),
            auth: VecM::default(),
        }),
    };
    Ok(Transaction {
        source_account: account_to_muxed(source)?,
        fee: 100,
        seq_num: SequenceNumber(sequence),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(max_time),
        }),
        memo: Memo::None,
        operations: single_operation(operation)?,
        ext: TransactionExt::V0,
    })
}

/// Attaches simulation output to a contract transaction: authorization
/// entries on the invoke operation and resource data in the extension.
///
/// # Errors
///
/// Returns [`TxError::InvalidXdr`] if the auth entries do not fit or the
/// transaction is not an invocation.
pub fn apply_simulation(
    tx: &mut Transaction,
    auth: Vec<SorobanAuthorizationEntry>,
    soroban_data_xdr: &str,
    resource_fee: u32,
) -> Result<(), TxError> {
    let data_bytes = BASE64
        .decode(soroban_data_xdr)
        .map_err(|e| TxError::InvalidXdr(format!("soroban data base64: {e}")))?;
    let soroban_data = stellar_xdr::curr::SorobanTransactionData::from_xdr(
        data_bytes,
        Limits::none(),
    )
    .map_err(|e| TxError::InvalidXdr(format!("soroban data decode: {e}")))?;

    let mut operations: Vec<Operation> = tx.operations.to_vec();
    let Some(Operation {
        body: OperationBody::InvokeHostFunction(invoke),
        ..
    }) = operations.first_mut()
    else {
        return Err(TxError::NotAPayment);
    };
    invoke.auth = auth
        .try_into()
        .map_err(|_| TxError::InvalidXdr("auth vector".to_owned()))?;

    tx.operations = operations
        .try_into()
        .map_err(|_| TxError::InvalidXdr("operations vector".to_owned()))?;
    tx.ext = TransactionExt::V1(soroban_data);
    tx.fee = tx.fee.saturating_add(resource_fee);
    Ok(())
}

/// Wraps a signed transaction into an envelope.
///
/// # Errors
///
/// Returns [`TxError::InvalidXdr`] if the signature vector overflows.
pub fn envelope_with_signatures(
    tx: Transaction,
    signatures: Vec<DecoratedSignature>,
) -> Result<TransactionEnvelope, TxError> {
    Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: signatures
            .try_into()
            .map_err(|_| TxError::InvalidXdr("signature vector".to_owned()))?,
    }))
}

/// Wraps a caller-signed envelope in a fee-bump paid by `fee_source`.
///
/// The inner envelope is embedded byte-for-byte; only the outer envelope
/// carries the sponsor's signature, added by the caller after hashing.
///
/// # Errors
///
/// Returns [`TxError`] on a malformed sponsor address.
pub fn fee_bump_wrap(
    inner: TransactionV1Envelope,
    fee_source: &str,
) -> Result<FeeBumpTransaction, TxError> {
    // The outer fee must cover the inner fee plus one extra base fee; double
    // the inner declared fee with a floor of 200 stroops.
    let fee = i64::from(inner.tx.fee).saturating_mul(2).max(200);
    Ok(FeeBumpTransaction {
        fee_source: account_to_muxed(fee_source)?,
        fee,
        inner_tx: FeeBumpTransactionInnerTx::Tx(inner),
        ext: FeeBumpTransactionExt::V0,
    })
}

/// Builds the fee-bump envelope once the sponsor signature exists.
///
/// # Errors
///
/// Returns [`TxError::InvalidXdr`] if the signature vector overflows.
pub fn fee_bump_envelope(
    tx: FeeBumpTransaction,
    signature: DecoratedSignature,
) -> Result<TransactionEnvelope, TxError> {
    Ok(TransactionEnvelope::TxFeeBump(FeeBumpTransactionEnvelope {
        tx,
        signatures: vec![signature]
            .try_into()
            .map_err(|_| TxError::InvalidXdr("signature vector".to_owned()))?,
    }))
}

fn single_operation(operation: Operation) -> Result<VecM<Operation, 100>, TxError> {
    vec![operation]
        .try_into()
        .map_err(|_| TxError::InvalidXdr("operations vector".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "GDQNY3PBOJOKYZSRMK2S7LHHGWZIUISD4QORETLMXEWXBI7KFZZMKTL3";
    const DESTINATION: &str = "GB3KJPLFUYN5VL6R3GU3EGCGVCKFDSD7BEDX42HWG5BWFKB3KQGJJRMA";
    const CONTRACT: &str = "CDLZFC3SYJYDZT7K67VZ75HPJVIEUVNIXF47ZG2FB2RMQQVU2HHGCYSC";

    #[test]
    fn payment_envelope_round_trip() {
        let tx = build_payment_transaction(SOURCE, DESTINATION, 10_000_000, 42, 1_800_000_000)
            .unwrap();
        let envelope = envelope_with_signatures(tx, vec![]).unwrap();
        let b64 = envelope_to_base64(&envelope).unwrap();
        let parsed = parse_envelope(&b64).unwrap();

        let (inner, details) = extract_payment(&parsed, Network::StellarTestnet).unwrap();
        assert_eq!(inner.tx.seq_num.0, 42);
        assert_eq!(details.source, SOURCE);
        assert_eq!(details.destination, DESTINATION);
        assert_eq!(details.amount, 10_000_000);
        assert_eq!(details.asset, PaymentAsset::Native);
    }

    #[test]
    fn transfer_invocation_round_trip() {
        let tx =
            build_transfer_transaction(SOURCE, DESTINATION, CONTRACT, 500_000, 7, 0).unwrap();
        let envelope = envelope_with_signatures(tx, vec![]).unwrap();
        let b64 = envelope_to_base64(&envelope).unwrap();
        let parsed = parse_envelope(&b64).unwrap();

        let (_, details) = extract_payment(&parsed, Network::StellarTestnet).unwrap();
        assert_eq!(details.destination, DESTINATION);
        assert_eq!(details.amount, 500_000);
        assert_eq!(details.asset, PaymentAsset::Contract(CONTRACT.to_owned()));
    }

    #[test]
    fn rejects_multi_operation_envelopes() {
        let tx = build_payment_transaction(SOURCE, DESTINATION, 1, 1, 0).unwrap();
        let mut doubled = tx.clone();
        let op = tx.operations.as_slice()[0].clone();
        doubled.operations = vec![op.clone(), op].try_into().unwrap();
        let envelope = envelope_with_signatures(doubled, vec![]).unwrap();
        assert!(matches!(
            extract_payment(&envelope, Network::StellarTestnet),
            Err(TxError::NotAPayment)
        ));
    }

    #[test]
    fn hash_depends_on_network() {
        let tx = build_payment_transaction(SOURCE, DESTINATION, 1, 1, 0).unwrap();
        let testnet = transaction_hash(&tx, Network::StellarTestnet).unwrap();
        let mainnet = transaction_hash(&tx, Network::Stellar).unwrap();
        assert_ne!(testnet, mainnet);
    }

    #[test]
    fn fee_bump_preserves_inner_transaction() {
        let tx = build_payment_transaction(SOURCE, DESTINATION, 5, 9, 0).unwrap();
        let inner_hash = transaction_hash(&tx, Network::StellarTestnet).unwrap();
        let inner = TransactionV1Envelope {
            tx,
            signatures: VecM::default(),
        };

        let bump = fee_bump_wrap(inner.clone(), DESTINATION).unwrap();
        assert!(bump.fee >= 200);
        let FeeBumpTransactionInnerTx::Tx(wrapped) = &bump.inner_tx;
        assert_eq!(wrapped, &inner);
        assert_eq!(
            transaction_hash(&wrapped.tx, Network::StellarTestnet).unwrap(),
            inner_hash
        );
    }

    #[test]
    fn time_bounds_checks() {
        let tx = build_payment_transaction(SOURCE, DESTINATION, 1, 1, 1_000).unwrap();
        assert!(!time_bounds_elapsed(&tx, 999));
        assert!(!time_bounds_elapsed(&tx, 1_000));
        assert!(time_bounds_elapsed(&tx, 1_001));

        let open = build_payment_transaction(SOURCE, DESTINATION, 1, 1, 0).unwrap();
        assert!(!time_bounds_elapsed(&open, u64::MAX));
    }

    #[test]
    fn i128_parts_round_trip() {
        for value in [0, 1, -1, i128::from(i64::MAX) + 1, i128::MAX, i128::MIN] {
            assert_eq!(i128_from_parts(&parts_from_i128(value)), value);
        }
    }

    #[test]
    fn derives_asset_contract_ids_deterministically() {
        let usdc = Asset::CreditAlphanum4(stellar_xdr::curr::AlphaNum4 {
            asset_code: stellar_xdr::curr::AssetCode4(*b"USDC"),
            issuer: account_id(DESTINATION).unwrap(),
        });
        let id1 = asset_contract_id(&usdc, Network::StellarTestnet);
        let id2 = asset_contract_id(&usdc, Network::StellarTestnet);
        assert_eq!(id1, id2);
        assert!(id1.starts_with('C'));
        assert_ne!(id1, asset_contract_id(&usdc, Network::Stellar));
    }
}
