//! The core database adapter (§4.F): the per-opened-core cache of
//! server-reported memory spaces and register groups, the pluggable
//! server-to-client view conversion, and transaction-adapter lookup by
//! memory-space id.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::adapter::{PassThroughAdapter, TransactionAdapter};
use crate::codec::value::{Addr, MemSpace, RegisterGroup, RegisterInfo};

/// Errors raised while populating or querying a [`CoreDatabase`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatabaseError {
    /// A count/start-index/id combination was out of range or otherwise
    /// invalid (§4.F "Query operations").
    #[error("parameter error: {0}")]
    Param(String),
    /// `query_reg_map` was called with a register-group id that does not
    /// exist in the client view.
    #[error("unknown register group id {0}")]
    RegGroupId(u32),
    /// A register's memory-space id did not resolve within its own view
    /// (§3 "Core database" invariants).
    #[error("register {regname:?} references unresolved memory space {mem_space_id}")]
    UnresolvedMemSpace {
        /// The offending register's name.
        regname: String,
        /// The memory-space id it referenced.
        mem_space_id: u32,
    },
    /// A memory space id was not unique within a single view (client or
    /// server), violating the lookup-uniqueness invariant that by-id
    /// lookups rely on across both views.
    #[error("duplicate memory space id {0} within one view")]
    DuplicateMemSpaceId(u32),
    /// No memory space with the given id exists in either view.
    #[error("no memory space with id {0}")]
    UnknownMemSpace(u32),
}

/// Converts a server-reported view into the client-visible view and
/// supplies the transaction adapter for each memory space (§3, §4.F, §9
/// "Pluggable core-view conversion"). The default, used unless an
/// architecture-specific adapter is configured, is the identity
/// conversion paired with [`PassThroughAdapter`].
pub trait ViewConverter {
    /// Produces the client-view memory spaces from the server-reported
    /// ones.
    fn convert_mem_spaces(&self, server: &[MemSpace]) -> Vec<MemSpace>;

    /// Produces the client-view register groups from the server-reported
    /// ones.
    fn convert_reg_groups(
        &self,
        server: &[(RegisterGroup, Vec<RegisterInfo>)],
    ) -> Vec<(RegisterGroup, Vec<RegisterInfo>)>;

    /// Builds the transaction adapter a given memory space should own.
    fn make_adapter(&self, mem_space: &MemSpace) -> Box<dyn TransactionAdapter>;
}

/// The trivial identity conversion: copies both sequences unchanged and
/// gives every memory space a [`PassThroughAdapter`].
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityConverter;

impl ViewConverter for IdentityConverter {
    fn convert_mem_spaces(&self, server: &[MemSpace]) -> Vec<MemSpace> {
        server.to_vec()
    }

    fn convert_reg_groups(
        &self,
        server: &[(RegisterGroup, Vec<RegisterInfo>)],
    ) -> Vec<(RegisterGroup, Vec<RegisterInfo>)> {
        server.to_vec()
    }

    fn make_adapter(&self, _mem_space: &MemSpace) -> Box<dyn TransactionAdapter> {
        Box::new(PassThroughAdapter)
    }
}

/// The per-opened-core cache populated once by `open_core` (§3, §4.F).
/// Immutable thereafter for the lifetime of the owning core handle, except
/// for the adapters' own interior callback state.
pub struct CoreDatabase {
    /// Server-assigned uid for the opened core.
    pub server_uid: u32,
    mem_spaces_server: Vec<MemSpace>,
    mem_spaces_client: Vec<MemSpace>,
    reg_groups_server: Vec<(RegisterGroup, Vec<RegisterInfo>)>,
    reg_groups_client: Vec<(RegisterGroup, Vec<RegisterInfo>)>,
    adapters: HashMap<u32, Box<dyn TransactionAdapter>>,
}

impl fmt::Debug for CoreDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreDatabase")
            .field("server_uid", &self.server_uid)
            .field("mem_spaces_server", &self.mem_spaces_server)
            .field("mem_spaces_client", &self.mem_spaces_client)
            .field("reg_groups_server", &self.reg_groups_server)
            .field("reg_groups_client", &self.reg_groups_client)
            .finish_non_exhaustive()
    }
}

/// Rejects a view whose memory spaces do not have pairwise-distinct ids;
/// a repeated id would make `adapter_for`'s by-id lookup ambiguous within
/// this view (§3 "Core database" invariants).
fn check_unique_mem_space_ids(spaces: &[MemSpace]) -> Result<(), DatabaseError> {
    let mut seen = std::collections::HashSet::with_capacity(spaces.len());
    for space in spaces {
        if !seen.insert(space.mem_space_id) {
            return Err(DatabaseError::DuplicateMemSpaceId(space.mem_space_id));
        }
    }
    Ok(())
}

fn validate_reg_group_mem_spaces(
    groups: &[(RegisterGroup, Vec<RegisterInfo>)],
    known_ids: &std::collections::HashSet<u32>,
) -> Result<(), DatabaseError> {
    for (_, registers) in groups {
        for reg in registers {
            if !known_ids.contains(&reg.addr.mem_space_id) {
                return Err(DatabaseError::UnresolvedMemSpace {
                    regname: reg.regname.clone(),
                    mem_space_id: reg.addr.mem_space_id,
                });
            }
        }
    }
    Ok(())
}

impl CoreDatabase {
    /// Populates a new core database from the server-reported views,
    /// running `converter` once to derive the client view and build each
    /// memory space's transaction adapter (§4.F "update_core_database").
    ///
    /// # Errors
    /// Returns a [`DatabaseError`] if either view violates the invariants
    /// in §3 (an unresolved memory-space reference, or a memory-space id
    /// repeated within one view).
    pub fn populate(
        server_uid: u32,
        mem_spaces_server: Vec<MemSpace>,
        reg_groups_server: Vec<(RegisterGroup, Vec<RegisterInfo>)>,
        converter: &dyn ViewConverter,
    ) -> Result<Self, DatabaseError> {
        let mem_spaces_client = converter.convert_mem_spaces(&mem_spaces_server);
        let reg_groups_client = converter.convert_reg_groups(&reg_groups_server);

        check_unique_mem_space_ids(&mem_spaces_server)?;
        check_unique_mem_space_ids(&mem_spaces_client)?;

        let server_ids: std::collections::HashSet<u32> =
            mem_spaces_server.iter().map(|m| m.mem_space_id).collect();
        validate_reg_group_mem_spaces(&reg_groups_server, &server_ids)?;
        let client_ids: std::collections::HashSet<u32> =
            mem_spaces_client.iter().map(|m| m.mem_space_id).collect();
        validate_reg_group_mem_spaces(&reg_groups_client, &client_ids)?;

        let mut adapters: HashMap<u32, Box<dyn TransactionAdapter>> = HashMap::new();
        for space in mem_spaces_client.iter().chain(mem_spaces_server.iter()) {
            adapters
                .entry(space.mem_space_id)
                .or_insert_with(|| converter.make_adapter(space));
        }

        Ok(Self {
            server_uid,
            mem_spaces_server,
            mem_spaces_client,
            reg_groups_server,
            reg_groups_client,
            adapters,
        })
    }

    fn two_mode_slice<T: Clone>(
        items: &[T],
        start_index: u32,
        count: &mut u32,
    ) -> Result<Vec<T>, DatabaseError> {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "database contents are bounded by the 65 KB frame cap per RPC"
        )]
        let total = items.len() as u32;
        if *count == 0 {
            *count = total;
            return Ok(Vec::new());
        }
        let start = start_index as usize;
        let end = start
            .checked_add(*count as usize)
            .ok_or_else(|| DatabaseError::Param("start_index + count overflowed".to_string()))?;
        let Some(slice) = items.get(start..end) else {
            return Err(DatabaseError::Param(format!(
                "requested [{start}..{end}) out of range for {total} entries"
            )));
        };
        Ok(slice.to_vec())
    }

    /// `query_mem_spaces` (§4.F): the two-mode count/fetch contract over
    /// the client-view memory spaces.
    ///
    /// # Errors
    /// Returns [`DatabaseError::Param`] for an out-of-range request.
    pub fn query_mem_spaces(
        &self,
        start_index: u32,
        count: &mut u32,
    ) -> Result<Vec<MemSpace>, DatabaseError> {
        Self::two_mode_slice(&self.mem_spaces_client, start_index, count)
    }

    /// `query_reg_groups` (§4.F): the two-mode count/fetch contract over
    /// the client-view register groups.
    ///
    /// # Errors
    /// Returns [`DatabaseError::Param`] for an out-of-range request.
    pub fn query_reg_groups(
        &self,
        start_index: u32,
        count: &mut u32,
    ) -> Result<Vec<RegisterGroup>, DatabaseError> {
        let groups: Vec<RegisterGroup> = self
            .reg_groups_client
            .iter()
            .map(|(g, _)| g.clone())
            .collect();
        Self::two_mode_slice(&groups, start_index, count)
    }

    /// `query_reg_map` (§4.F): `reg_group_id == 0` enumerates registers
    /// across every group in declared order; a non-zero id restricts to
    /// that group alone.
    ///
    /// # Errors
    /// Returns [`DatabaseError::RegGroupId`] for an unknown group id, or
    /// [`DatabaseError::Param`] for an out-of-range request.
    pub fn query_reg_map(
        &self,
        reg_group_id: u32,
        start_index: u32,
        count: &mut u32,
    ) -> Result<Vec<RegisterInfo>, DatabaseError> {
        let registers: Vec<RegisterInfo> = if reg_group_id == 0 {
            self.reg_groups_client
                .iter()
                .flat_map(|(_, regs)| regs.iter().cloned())
                .collect()
        } else {
            let Some((_, regs)) = self
                .reg_groups_client
                .iter()
                .find(|(g, _)| g.reg_group_id == reg_group_id)
            else {
                return Err(DatabaseError::RegGroupId(reg_group_id));
            };
            regs.clone()
        };
        Self::two_mode_slice(&registers, start_index, count)
    }

    /// Looks up the transaction adapter owning `mem_space_id`, scanning
    /// the client view first and then the server view (§4.F "Transaction
    /// adapter lookup").
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownMemSpace`] on a miss.
    pub fn adapter_for(
        &mut self,
        mem_space_id: u32,
    ) -> Result<&mut (dyn TransactionAdapter + 'static), DatabaseError> {
        let exists = self
            .mem_spaces_client
            .iter()
            .any(|m| m.mem_space_id == mem_space_id)
            || self
                .mem_spaces_server
                .iter()
                .any(|m| m.mem_space_id == mem_space_id);
        if !exists {
            return Err(DatabaseError::UnknownMemSpace(mem_space_id));
        }
        self.adapters
            .get_mut(&mem_space_id)
            .map(std::convert::AsMut::as_mut)
            .ok_or(DatabaseError::UnknownMemSpace(mem_space_id))
    }

    /// Delegates address conversion to the owning client-view memory
    /// space's adapter (§4.F "Address conversion").
    ///
    /// # Errors
    /// Returns [`DatabaseError::UnknownMemSpace`] if `addr.mem_space_id`
    /// does not resolve in the client view, or propagates the adapter's
    /// own conversion error via [`DatabaseError::Param`].
    pub fn convert_address_to_server(&mut self, addr: Addr) -> Result<Addr, DatabaseError> {
        if !self
            .mem_spaces_client
            .iter()
            .any(|m| m.mem_space_id == addr.mem_space_id)
        {
            return Err(DatabaseError::UnknownMemSpace(addr.mem_space_id));
        }
        let adapter = self.adapter_for(addr.mem_space_id)?;
        adapter
            .convert_address_to_server(addr)
            .map_err(|e| DatabaseError::Param(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::{AddrSpaceType, Endian, MemType, TxAccessOpt};

    fn sample_mem_space(id: u32) -> MemSpace {
        MemSpace {
            mem_space_id: id,
            mem_space_name: format!("space{id}"),
            mem_type: MemType::Mem,
            bits_per_mau: 8,
            invariance: true,
            endian: Endian::Little,
            min_addr: 0,
            max_addr: 0xFFFF,
            num_mem_blocks: 1,
            supported_access_options: TxAccessOpt::NONE,
            core_mode_mask_read: 0xFFFF_FFFF,
            core_mode_mask_write: 0xFFFF_FFFF,
        }
    }

    fn sample_register(mem_space_id: u32, reg_group_id: u32, name: &str) -> RegisterInfo {
        RegisterInfo {
            addr: Addr {
                address: 0,
                mem_space_id,
                addr_space_id: 0,
                addr_space_type: AddrSpaceType::Mem,
            },
            reg_group_id,
            regname: name.to_string(),
            regsize: 32,
            core_mode_mask_read: 0xFFFF_FFFF,
            core_mode_mask_write: 0xFFFF_FFFF,
            has_side_effects_read: false,
            has_side_effects_write: false,
            reg_type: crate::codec::value::RegType::Simple,
            hw_thread_id: 0,
        }
    }

    fn sample_database() -> CoreDatabase {
        let mem_spaces = vec![sample_mem_space(1)];
        let groups = vec![(
            RegisterGroup {
                reg_group_id: 1,
                reg_group_name: "core".to_string(),
                n_registers: 2,
            },
            vec![
                sample_register(1, 1, "r0"),
                sample_register(1, 1, "r1"),
            ],
        )];
        CoreDatabase::populate(7, mem_spaces, groups, &IdentityConverter).unwrap()
    }

    #[test]
    fn zero_count_reports_total_without_entries() {
        let db = sample_database();
        let mut count = 0;
        let spaces = db.query_mem_spaces(0, &mut count).unwrap();
        assert_eq!(count, 1);
        assert!(spaces.is_empty());
    }

    #[test]
    fn nonzero_count_fills_requested_slice() {
        let db = sample_database();
        let mut count = 1;
        let spaces = db.query_mem_spaces(0, &mut count).unwrap();
        assert_eq!(spaces.len(), 1);
        assert_eq!(spaces[0].mem_space_id, 1);
    }

    #[test]
    fn out_of_range_start_index_is_a_param_error() {
        let db = sample_database();
        let mut count = 1;
        assert!(db.query_mem_spaces(5, &mut count).is_err());
    }

    #[test]
    fn reg_map_group_zero_enumerates_across_groups() {
        let db = sample_database();
        let mut count = 0;
        db.query_reg_map(0, 0, &mut count).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn reg_map_unknown_group_id_is_an_error() {
        let db = sample_database();
        let mut count = 1;
        assert!(matches!(
            db.query_reg_map(99, 0, &mut count),
            Err(DatabaseError::RegGroupId(99))
        ));
    }

    #[test]
    fn unresolved_mem_space_reference_is_rejected_at_populate_time() {
        let mem_spaces = vec![sample_mem_space(1)];
        let groups = vec![(
            RegisterGroup {
                reg_group_id: 1,
                reg_group_name: "core".to_string(),
                n_registers: 1,
            },
            vec![sample_register(99, 1, "bad")],
        )];
        let err = CoreDatabase::populate(1, mem_spaces, groups, &IdentityConverter).unwrap_err();
        assert!(matches!(err, DatabaseError::UnresolvedMemSpace { .. }));
    }

    #[test]
    fn duplicate_mem_space_id_within_server_view_is_rejected_at_populate_time() {
        let mem_spaces = vec![sample_mem_space(1), sample_mem_space(1)];
        let err = CoreDatabase::populate(1, mem_spaces, Vec::new(), &IdentityConverter).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateMemSpaceId(1)));
    }

    #[test]
    fn adapter_lookup_succeeds_for_known_space_and_fails_for_unknown() {
        let mut db = sample_database();
        assert!(db.adapter_for(1).is_ok());
        assert!(matches!(
            db.adapter_for(42),
            Err(DatabaseError::UnknownMemSpace(42))
        ));
    }
}
