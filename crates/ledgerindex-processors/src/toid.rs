//! Total order ids: one `i64` that sorts ledgers, transactions and
//! operations in application order.
//!
//! ```text
//!  63        32 31           12 11        0
//! ┌────────────┬───────────────┬───────────┐
//! │  ledger    │  transaction  │ operation │
//! └────────────┴───────────────┴───────────┘
//! ```

const TX_BITS: u32 = 20;
const OP_BITS: u32 = 12;

/// Id of a ledger, transaction (`op == 0`) or operation (`op >= 1`).
pub fn toid(ledger: u32, tx: u32, op: u32) -> i64 {
    ((ledger as i64) << (TX_BITS + OP_BITS))
        | (((tx as i64) & ((1 << TX_BITS) - 1)) << OP_BITS)
        | ((op as i64) & ((1 << OP_BITS) - 1))
}

pub fn transaction_id(ledger: u32, tx: u32) -> i64 {
    toid(ledger, tx, 0)
}

/// `op_index` is 0-based; operation ids are 1-based within the transaction.
pub fn operation_id(ledger: u32, tx: u32, op_index: usize) -> i64 {
    toid(ledger, tx, op_index as u32 + 1)
}
