//! The transaction adapter (§4.G): a per-memory-space strategy object that
//! rewrites one client transaction into a server-side transaction list and
//! collapses the server's response back, plus the trivial pass-through
//! implementation every memory space gets by default.

use std::fmt;

use thiserror::Error;

use crate::codec::value::{Addr, Tx, TxList};

/// Errors raised by a transaction adapter operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The operation has no implementation for this adapter (the default
    /// for `convert_address_to_server`, per §4.G).
    #[error("adapter operation not implemented")]
    NotImplemented,
    /// The server's response list did not match what the adapter expected
    /// (wrong transaction count, byte-count mismatch, or a transaction
    /// that did not complete fully OK).
    #[error("transaction list mismatch: {0}")]
    TxListMismatch(String),
    /// A callback installed by `grant_server_access` failed when invoked
    /// from inside `yield_server_request`.
    #[error("adapter callback failed: {0}")]
    CallbackFailed(String),
}

/// The re-entrant hook a memory space's adapter may use from inside
/// `yield_server_request` to read or restore prerequisite registers before
/// it can finish building the server-side transaction list (§4.G, §9
/// "Re-entrant adapter callbacks").
///
/// Implementations stage their transaction list in owned memory and
/// perform exactly one `execute_txlist` round-trip; per §9, the enclosing
/// call must not yet have written its own outgoing request into the shared
/// buffer when this runs.
pub trait ServerAccess {
    /// Executes `txlist` against `core_uid` and returns the server's
    /// response list.
    ///
    /// # Errors
    /// Returns [`AdapterError::CallbackFailed`] if the round-trip fails.
    fn execute_txlist(&mut self, core_uid: u32, txlist: TxList) -> Result<TxList, AdapterError>;
}

/// Per-memory-space strategy mediating between the client's view of a
/// transaction and the server's (§4.G).
pub trait TransactionAdapter: fmt::Debug {
    /// Produces an owned copy, used when the owning memory space is
    /// copied.
    fn clone_box(&self) -> Box<dyn TransactionAdapter>;

    /// Installs re-entrant server access for adapters that declared a
    /// requirement for it. A no-op for adapters that never need a
    /// callback (including the pass-through adapter).
    fn grant_server_access(&mut self, core_uid: u32) {
        let _ = core_uid;
    }

    /// Expands one client transaction into the server-side transaction
    /// list to send. May invoke the callback installed by
    /// `grant_server_access` to read prerequisite register values the
    /// expansion depends on.
    ///
    /// # Errors
    /// Returns an [`AdapterError`] describing why the expansion failed;
    /// per §4.G the façade then marks the client transaction complete
    /// with zero bytes and continues the batch rather than aborting it.
    fn yield_server_request(&mut self, client_tx: &Tx) -> Result<TxList, AdapterError>;

    /// Reclaims any state the adapter allocated in `yield_server_request`.
    /// A no-op in this implementation: Rust's ownership model already
    /// frees the [`TxList`] when it is dropped, so there is nothing left
    /// to reclaim by the time the façade would call this.
    fn free_server_request(&mut self, _list: TxList) {}

    /// Consumes the server's response list and produces the client-visible
    /// response for the one client transaction that `yield_server_request`
    /// expanded.
    ///
    /// # Errors
    /// Returns [`AdapterError::TxListMismatch`] if the response does not
    /// contain exactly one fully-OK transaction whose byte counts match
    /// `client_tx`'s expectations.
    fn collect_client_response(
        &mut self,
        client_tx: &Tx,
        server_response: TxList,
    ) -> Result<Tx, AdapterError>;

    /// Transforms a client-side address into the server-side address this
    /// adapter's memory space expects. The default implementation forces
    /// implementers to opt in explicitly (§4.G).
    fn convert_address_to_server(&self, addr: Addr) -> Result<Addr, AdapterError> {
        let _ = addr;
        Err(AdapterError::NotImplemented)
    }
}

/// The trivial adapter: points the server-side list at the single client
/// transaction unchanged, allocates nothing, and collects by validating
/// and returning the server's matching transaction (§4.G).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassThroughAdapter;

impl TransactionAdapter for PassThroughAdapter {
    fn clone_box(&self) -> Box<dyn TransactionAdapter> {
        Box::new(*self)
    }

    fn yield_server_request(&mut self, client_tx: &Tx) -> Result<TxList, AdapterError> {
        Ok(TxList {
            tx: vec![client_tx.clone()],
            num_tx_ok: 0,
        })
    }

    fn collect_client_response(
        &mut self,
        client_tx: &Tx,
        mut server_response: TxList,
    ) -> Result<Tx, AdapterError> {
        if server_response.tx.len() != 1 {
            return Err(AdapterError::TxListMismatch(format!(
                "expected exactly 1 server transaction, got {}",
                server_response.tx.len()
            )));
        }
        #[allow(
            clippy::indexing_slicing,
            reason = "length was just checked to be exactly 1"
        )]
        let server_tx = server_response.tx.remove(0);
        #[allow(
            clippy::cast_possible_truncation,
            reason = "client transactions are bounded by the 65 KB frame cap"
        )]
        let expected_ok = client_tx.data.len() as u32;
        if server_tx.num_bytes_ok != expected_ok {
            return Err(AdapterError::TxListMismatch(format!(
                "expected {expected_ok} bytes ok, server reported {}",
                server_tx.num_bytes_ok
            )));
        }
        Ok(server_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::{AddrSpaceType, TxAccessOpt, TxAccessType};

    fn sample_tx(data: Vec<u8>) -> Tx {
        Tx {
            addr: Addr {
                address: 0x1000,
                mem_space_id: 1,
                addr_space_id: 0,
                addr_space_type: AddrSpaceType::Mem,
            },
            access_type: TxAccessType::Read,
            options: TxAccessOpt::NONE,
            access_width: 4,
            core_mode: 0,
            data,
            num_bytes_ok: 0,
        }
    }

    #[test]
    fn pass_through_identity_modulo_data_pointer() {
        let tx = sample_tx(vec![0; 4]);
        let mut adapter = PassThroughAdapter;
        let server_list = adapter.yield_server_request(&tx).unwrap();
        let mut server_tx = tx.clone();
        server_tx.num_bytes_ok = 4;
        server_tx.data = vec![1, 2, 3, 4];
        let response = TxList {
            tx: vec![server_tx.clone()],
            num_tx_ok: 1,
        };
        assert_eq!(server_list.tx.len(), 1);
        let collected = adapter.collect_client_response(&tx, response).unwrap();
        assert_eq!(collected, server_tx);
    }

    #[test]
    fn rejects_more_than_one_server_transaction() {
        let tx = sample_tx(vec![0; 4]);
        let mut adapter = PassThroughAdapter;
        let response = TxList {
            tx: vec![tx.clone(), tx.clone()],
            num_tx_ok: 2,
        };
        assert!(matches!(
            adapter.collect_client_response(&tx, response),
            Err(AdapterError::TxListMismatch(_))
        ));
    }

    #[test]
    fn rejects_byte_count_mismatch() {
        let tx = sample_tx(vec![0; 4]);
        let mut adapter = PassThroughAdapter;
        let mut server_tx = tx.clone();
        server_tx.num_bytes_ok = 2;
        let response = TxList {
            tx: vec![server_tx],
            num_tx_ok: 1,
        };
        assert!(matches!(
            adapter.collect_client_response(&tx, response),
            Err(AdapterError::TxListMismatch(_))
        ));
    }

    #[test]
    fn default_address_conversion_is_not_implemented() {
        let adapter = PassThroughAdapter;
        let addr = Addr {
            address: 0,
            mem_space_id: 1,
            addr_space_id: 0,
            addr_space_type: AddrSpaceType::Mem,
        };
        assert_eq!(
            adapter.convert_address_to_server(addr),
            Err(AdapterError::NotImplemented)
        );
    }

    #[test]
    fn clone_box_produces_a_usable_independent_copy() {
        let adapter = PassThroughAdapter;
        let mut cloned = adapter.clone_box();
        let tx = sample_tx(vec![0; 2]);
        let list = cloned.yield_server_request(&tx).unwrap();
        assert_eq!(list.tx, vec![tx]);
    }
}
