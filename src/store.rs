//! Sled-backed ledger with optimistic read-validate-write transactions.
//!
//! Records share the default tree under distinct key shapes:
//! `order/<group id>`, `entry/<group id>/<vendor id>` and
//! `settlement/<sha256 digest>`. A [`LedgerTxn`] buffers the bytes it
//! observed on every read and its pending writes; `commit` replays both
//! inside sled's transactional closure and aborts if any observed key
//! changed underneath it. The abort surfaces as [`CommitError::Contention`]
//! so concurrent mutations of one group order are linearized instead of
//! losing updates.
use crate::group::{GroupOrder, ParticipantEntry};
use crate::settlement::Settlement;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::sync::Arc;

const ORDER_PREFIX: &str = "order/";
const ENTRY_PREFIX: &str = "entry/";
const SETTLEMENT_PREFIX: &str = "settlement/";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Backend(#[from] sled::Error),
    #[error("codec failure: {0}")]
    Codec(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CommitError {
    #[error("transaction contention, safe to retry")]
    Contention,
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn order_key(id: &str) -> Vec<u8> {
    format!("{ORDER_PREFIX}{id}").into_bytes()
}

// bech32 ids never contain '/', so the separator is unambiguous
fn entry_key(group_order_id: &str, vendor_id: &str) -> Vec<u8> {
    format!("{ENTRY_PREFIX}{group_order_id}/{vendor_id}").into_bytes()
}

fn settlement_key(digest: &str) -> Vec<u8> {
    format!("{SETTLEMENT_PREFIX}{digest}").into_bytes()
}

fn encode_record<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode_record<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, StoreError> {
    minicbor::decode(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

pub struct Ledger {
    db: Arc<sled::Db>,
}

impl Ledger {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self { db }
    }

    /// Start a transaction. Reads record what they saw, writes are
    /// buffered until [`LedgerTxn::commit`].
    pub fn begin(&self) -> LedgerTxn<'_> {
        LedgerTxn {
            db: &self.db,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Unscoped point read, for callers that do not go on to write.
    pub fn read_group_order(&self, id: &str) -> Result<Option<GroupOrder>, StoreError> {
        match self.db.get(order_key(id))? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All entries for a group order, withdrawn ones included.
    pub fn read_participants(&self, id: &str) -> Result<Vec<ParticipantEntry>, StoreError> {
        let prefix = format!("{ENTRY_PREFIX}{id}/");
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            entries.push(decode_record(&bytes)?);
        }
        Ok(entries)
    }

    pub fn read_settlement(&self, digest: &str) -> Result<Option<Settlement>, StoreError> {
        match self.db.get(settlement_key(digest))? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every group order in the store, for the expiry sweep.
    pub fn scan_group_orders(&self) -> Result<Vec<GroupOrder>, StoreError> {
        let mut orders = Vec::new();
        for item in self.db.scan_prefix(ORDER_PREFIX.as_bytes()) {
            let (_, bytes) = item?;
            orders.push(decode_record(&bytes)?);
        }
        Ok(orders)
    }
}

pub struct LedgerTxn<'a> {
    db: &'a sled::Db,
    reads: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    writes: Vec<(Vec<u8>, Vec<u8>)>,
}

impl LedgerTxn<'_> {
    fn observe(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.db.get(&key)?.map(|ivec| ivec.to_vec());
        self.reads.push((key, value.clone()));
        Ok(value)
    }

    pub fn read_group_order(&mut self, id: &str) -> Result<Option<GroupOrder>, StoreError> {
        match self.observe(order_key(id))? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn read_participant(
        &mut self,
        group_order_id: &str,
        vendor_id: &str,
    ) -> Result<Option<ParticipantEntry>, StoreError> {
        match self.observe(entry_key(group_order_id, vendor_id))? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn write_group_order(&mut self, order: &GroupOrder) -> Result<(), StoreError> {
        let bytes = encode_record(order)?;
        self.writes.push((order_key(&order.id), bytes));
        Ok(())
    }

    /// Inserts and updates share one path; the duplicate-join guard is the
    /// observed read of the entry key.
    pub fn write_participant(&mut self, entry: &ParticipantEntry) -> Result<(), StoreError> {
        let bytes = encode_record(entry)?;
        self.writes
            .push((entry_key(&entry.group_order_id, &entry.vendor_id), bytes));
        Ok(())
    }

    /// Content-addressed: the key is the sha256 digest of the encoded
    /// record, returned so the group order can reference it.
    pub fn write_settlement(&mut self, settlement: &Settlement) -> Result<String, StoreError> {
        let bytes = encode_record(settlement)?;
        let digest = sha256::digest(&bytes);
        self.writes.push((settlement_key(&digest), bytes));
        Ok(digest)
    }

    pub fn commit(self) -> Result<(), CommitError> {
        let LedgerTxn { db, reads, writes } = self;

        let outcome = db.transaction(|tx| {
            for (key, observed) in &reads {
                let live = tx.get(key)?;
                if live.as_deref() != observed.as_deref() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
            }
            for (key, value) in &writes {
                tx.insert(key.as_slice(), value.as_slice())?;
            }
            Ok(())
        });

        match outcome {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(())) => Err(CommitError::Contention),
            Err(TransactionError::Storage(e)) => Err(CommitError::Store(StoreError::Backend(e))),
        }
    }
}
