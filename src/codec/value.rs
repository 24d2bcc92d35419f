//! Encode/decode for every MCD value type: addresses, memory spaces,
//! register groups and info, transactions and transaction lists, the
//! tagged trigger union, trigger/trigger-set state, core state, error
//! info, and connection info (§4.B).
//!
//! Enums that appear on the wire as a bare `u32` discriminant follow the
//! same `From<u32>`/`Into<u32>` plus catch-all `Other(u32)` pattern used
//! throughout this codebase for forward-compatible numeric enums: an
//! unrecognized discriminant round-trips instead of becoming a decode
//! error, since the server may be a newer protocol revision than this
//! client knows about.

use crate::codec::fixed_string::FixedString;
use crate::codec::primitive::{Cursor, write_bool, write_u8, write_u32, write_u64};
use crate::codec::CodecError;

macro_rules! numeric_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            /// A discriminant this client does not recognize, preserved
            /// verbatim for forward compatibility with newer servers.
            Other(u32),
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                match value {
                    $($value => Self::$variant,)+
                    other => Self::Other(other),
                }
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => $value,)+
                    $name::Other(other) => other,
                }
            }
        }

        impl $name {
            fn marshal(self, buf: &mut Vec<u8>) {
                write_u32(buf, self.into());
            }

            fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
                Ok(Self::from(cursor.read_u32()?))
            }
        }
    };
}

numeric_enum!(
    /// `mcd_return_et` — the outcome of an RPC or local operation.
    McdReturn {
        Ok = 0,
        ActHandleError = 1,
        ActHandleEvent = 2,
    }
);

numeric_enum!(
    /// `mcd_error_code_et` — the detailed reason behind a non-OK return.
    ErrorCode {
        None = 0,
        General = 1,
        Connection = 2,
        TimedOut = 3,
        Param = 4,
        RegGroupId = 5,
        RpcMarshal = 0x2000_0000,
        RpcUnmarshal = 0x2000_0001,
    }
);

bitflags::bitflags! {
    /// `mcd_error_event_et` — event bits accompanying an error.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ErrorEvent: u32 {
        /// No event accompanies this error.
        const NONE = 0;
        /// The target powered down; idempotent teardown may proceed.
        const PWRDN = 1 << 0;
        /// The target reset.
        const RESET = 1 << 1;
    }
}

bitflags::bitflags! {
    /// `mcd_core_event_et` — event bits reported alongside core state.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CoreEvent: u32 {
        /// No event.
        const NONE = 0;
        /// The core stopped due to a breakpoint/trigger.
        const BREAKPOINT = 1 << 0;
        /// The core halted at the end of a trace.
        const TRACE = 1 << 1;
        /// The core powered down.
        const PWRDN = 1 << 2;
    }
}

numeric_enum!(
    /// `mcd_core_state_et`.
    CoreState {
        Running = 0,
        Halted = 1,
        Debug = 2,
        Unknown = 3,
    }
);

numeric_enum!(
    /// `mcd_mem_type_et`.
    MemType {
        Mem = 0,
        Reg = 1,
        Cache = 2,
    }
);

numeric_enum!(
    /// `mcd_endian_et`.
    Endian {
        Little = 0,
        Big = 1,
    }
);

numeric_enum!(
    /// `mcd_reg_type_et`.
    RegType {
        Simple = 0,
        Compound = 1,
        Pseudo = 2,
    }
);

numeric_enum!(
    /// `mcd_addr_space_type_et`.
    AddrSpaceType {
        Mem = 0,
        Alternate = 1,
        Custom = 2,
    }
);

numeric_enum!(
    /// `mcd_tx_access_type_et`.
    TxAccessType {
        Read = 0,
        Write = 1,
    }
);

bitflags::bitflags! {
    /// `mcd_tx_access_opt_et`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TxAccessOpt: u32 {
        /// No special access option.
        const NONE = 0;
        /// Side effects are acceptable for this access.
        const SIDE_EFFECTS = 1 << 0;
    }
}

numeric_enum!(
    /// `mcd_trig_type_et`.
    TrigType {
        InstructionHit = 0,
        DataHit = 1,
        TriggerBus = 2,
        Counter = 3,
        Custom = 4,
    }
);

numeric_enum!(
    /// `mcd_trig_opt_et`.
    TrigOption {
        None = 0,
        DataIsConditional = 1,
    }
);

numeric_enum!(
    /// `mcd_trig_action_et`.
    TrigAction {
        Debug = 0,
        SwBreakpoint = 1,
    }
);

/// `mcd_addr_st` — an address within a memory space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Addr {
    /// The address within the memory space.
    pub address: u64,
    /// The memory space this address belongs to.
    pub mem_space_id: u32,
    /// The address space qualifier.
    pub addr_space_id: u32,
    /// The kind of address space (`addr_space_id` refers to).
    pub addr_space_type: AddrSpaceType,
}

impl Addr {
    /// Appends the wire form of this address.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u64(buf, self.address);
        write_u32(buf, self.mem_space_id);
        write_u32(buf, self.addr_space_id);
        self.addr_space_type.marshal(buf);
    }

    /// Parses an address from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            address: cursor.read_u64()?,
            mem_space_id: cursor.read_u32()?,
            addr_space_id: cursor.read_u32()?,
            addr_space_type: AddrSpaceType::unmarshal(cursor)?,
        })
    }
}

/// `mcd_error_info_st`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    /// The return status this error accompanies.
    pub return_status: McdReturn,
    /// The detailed error code.
    pub error_code: ErrorCode,
    /// Event bits accompanying the error.
    pub error_events: ErrorEvent,
    /// A human-readable description.
    pub error_str: String,
}

impl ErrorInfo {
    /// The canonical "no error" value.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            return_status: McdReturn::Ok,
            error_code: ErrorCode::None,
            error_events: ErrorEvent::NONE,
            error_str: String::new(),
        }
    }

    /// Appends the wire form of this error info.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        self.return_status.marshal(buf);
        self.error_code.marshal(buf);
        write_u32(buf, self.error_events.bits());
        write_u32(buf, len_u32(&self.error_str));
        buf.extend_from_slice(self.error_str.as_bytes());
    }

    /// Parses error info from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let return_status = McdReturn::unmarshal(cursor)?;
        let error_code = ErrorCode::unmarshal(cursor)?;
        let error_events = ErrorEvent::from_bits_truncate(cursor.read_u32()?);
        let error_str = read_string(cursor)?;
        Ok(Self {
            return_status,
            error_code,
            error_events,
            error_str,
        })
    }
}

/// `mcd_core_con_info_st` — how to reach a system/device/core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreConInfo {
    /// Server hostname.
    pub host: FixedString<64>,
    /// Server TCP port.
    pub server_port: u32,
    /// Server authentication key.
    pub server_key: FixedString<32>,
    /// System authentication key.
    pub system_key: FixedString<32>,
    /// Device authentication key.
    pub device_key: FixedString<32>,
    /// System name.
    pub system: FixedString<32>,
    /// System instance name.
    pub system_instance: FixedString<32>,
    /// Hardware accelerator name.
    pub acc_hw: FixedString<32>,
    /// Device type.
    pub device_type: u32,
    /// Device name.
    pub device: FixedString<32>,
    /// Device id.
    pub device_id: u32,
    /// Core name.
    pub core: FixedString<32>,
    /// Core type.
    pub core_type: u32,
    /// Core id.
    pub core_id: u32,
}

impl CoreConInfo {
    /// Appends the wire form of this connection info, field order matching
    /// the reference implementation's `marshal_mcd_core_con_info_st`.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        self.host.marshal(buf);
        write_u32(buf, self.server_port);
        self.server_key.marshal(buf);
        self.system_key.marshal(buf);
        self.device_key.marshal(buf);
        self.system.marshal(buf);
        self.system_instance.marshal(buf);
        self.acc_hw.marshal(buf);
        write_u32(buf, self.device_type);
        self.device.marshal(buf);
        write_u32(buf, self.device_id);
        self.core.marshal(buf);
        write_u32(buf, self.core_type);
        write_u32(buf, self.core_id);
    }

    /// Parses connection info from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            host: FixedString::unmarshal(cursor)?,
            server_port: cursor.read_u32()?,
            server_key: FixedString::unmarshal(cursor)?,
            system_key: FixedString::unmarshal(cursor)?,
            device_key: FixedString::unmarshal(cursor)?,
            system: FixedString::unmarshal(cursor)?,
            system_instance: FixedString::unmarshal(cursor)?,
            acc_hw: FixedString::unmarshal(cursor)?,
            device_type: cursor.read_u32()?,
            device: FixedString::unmarshal(cursor)?,
            device_id: cursor.read_u32()?,
            core: FixedString::unmarshal(cursor)?,
            core_type: cursor.read_u32()?,
            core_id: cursor.read_u32()?,
        })
    }
}

/// `mcd_memspace_st` — a named, typed address space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemSpace {
    /// Server-assigned memory space id.
    pub mem_space_id: u32,
    /// Memory space name.
    pub mem_space_name: String,
    /// The kind of memory space.
    pub mem_type: MemType,
    /// Bits per minimum addressable unit.
    pub bits_per_mau: u32,
    /// Whether successive accesses to the same address are guaranteed to
    /// observe the same value (invariance).
    pub invariance: bool,
    /// Byte order of multi-MAU values in this space.
    pub endian: Endian,
    /// Lowest addressable location.
    pub min_addr: u64,
    /// Highest addressable location.
    pub max_addr: u64,
    /// Number of memory blocks (sub-regions) within this space.
    pub num_mem_blocks: u32,
    /// Access options supported in this space.
    pub supported_access_options: TxAccessOpt,
    /// Core-mode mask permitting reads.
    pub core_mode_mask_read: u32,
    /// Core-mode mask permitting writes.
    pub core_mode_mask_write: u32,
}

impl MemSpace {
    /// Parses a memory space from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            mem_space_id: cursor.read_u32()?,
            mem_space_name: read_string(cursor)?,
            mem_type: MemType::unmarshal(cursor)?,
            bits_per_mau: cursor.read_u32()?,
            invariance: cursor.read_bool()?,
            endian: Endian::unmarshal(cursor)?,
            min_addr: cursor.read_u64()?,
            max_addr: cursor.read_u64()?,
            num_mem_blocks: cursor.read_u32()?,
            supported_access_options: TxAccessOpt::from_bits_truncate(cursor.read_u32()?),
            core_mode_mask_read: cursor.read_u32()?,
            core_mode_mask_write: cursor.read_u32()?,
        })
    }

    /// Appends the wire form of this memory space.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.mem_space_id);
        write_string(buf, &self.mem_space_name);
        self.mem_type.marshal(buf);
        write_u32(buf, self.bits_per_mau);
        write_bool(buf, self.invariance);
        self.endian.marshal(buf);
        write_u64(buf, self.min_addr);
        write_u64(buf, self.max_addr);
        write_u32(buf, self.num_mem_blocks);
        write_u32(buf, self.supported_access_options.bits());
        write_u32(buf, self.core_mode_mask_read);
        write_u32(buf, self.core_mode_mask_write);
    }
}

/// `mcd_register_group_st` — a named collection of registers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterGroup {
    /// Server-assigned register group id.
    pub reg_group_id: u32,
    /// Register group name.
    pub reg_group_name: String,
    /// Number of registers in this group.
    pub n_registers: u32,
}

impl RegisterGroup {
    /// Parses a register group from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            reg_group_id: cursor.read_u32()?,
            reg_group_name: read_string(cursor)?,
            n_registers: cursor.read_u32()?,
        })
    }

    /// Appends the wire form of this register group.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.reg_group_id);
        write_string(buf, &self.reg_group_name);
        write_u32(buf, self.n_registers);
    }
}

/// `mcd_register_info_st` — a single register's description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterInfo {
    /// The register's address.
    pub addr: Addr,
    /// The register group it belongs to.
    pub reg_group_id: u32,
    /// Register name.
    pub regname: String,
    /// Register width in bits.
    pub regsize: u32,
    /// Core-mode mask permitting reads.
    pub core_mode_mask_read: u32,
    /// Core-mode mask permitting writes.
    pub core_mode_mask_write: u32,
    /// Whether reading has side effects.
    pub has_side_effects_read: bool,
    /// Whether writing has side effects.
    pub has_side_effects_write: bool,
    /// The kind of register.
    pub reg_type: RegType,
    /// Hardware thread this register belongs to.
    pub hw_thread_id: u32,
}

impl RegisterInfo {
    /// Parses register info from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            addr: Addr::unmarshal(cursor)?,
            reg_group_id: cursor.read_u32()?,
            regname: read_string(cursor)?,
            regsize: cursor.read_u32()?,
            core_mode_mask_read: cursor.read_u32()?,
            core_mode_mask_write: cursor.read_u32()?,
            has_side_effects_read: cursor.read_bool()?,
            has_side_effects_write: cursor.read_bool()?,
            reg_type: RegType::unmarshal(cursor)?,
            hw_thread_id: cursor.read_u32()?,
        })
    }

    /// Appends the wire form of this register info.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        self.addr.marshal(buf);
        write_u32(buf, self.reg_group_id);
        write_string(buf, &self.regname);
        write_u32(buf, self.regsize);
        write_u32(buf, self.core_mode_mask_read);
        write_u32(buf, self.core_mode_mask_write);
        write_bool(buf, self.has_side_effects_read);
        write_bool(buf, self.has_side_effects_write);
        self.reg_type.marshal(buf);
        write_u32(buf, self.hw_thread_id);
    }
}

/// `mcd_tx_st` — a single read or write transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tx {
    /// Target address.
    pub addr: Addr,
    /// Read or write.
    pub access_type: TxAccessType,
    /// Access options requested.
    pub options: TxAccessOpt,
    /// Access width in bytes (0 means "use the space's natural width").
    pub access_width: u8,
    /// Core-mode filter for this access.
    pub core_mode: u8,
    /// Requested byte count, and the data buffer itself (for writes, the
    /// bytes to send; for reads, filled in on return).
    pub data: Vec<u8>,
    /// Bytes actually transferred successfully.
    pub num_bytes_ok: u32,
}

impl Tx {
    /// Appends the wire form of this transaction: address, access fields,
    /// then the byte count/data/byte-count-again/ok-count quad described
    /// in `SPEC_FULL.md` §4.B.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        self.addr.marshal(buf);
        self.access_type.marshal(buf);
        write_u32(buf, self.options.bits());
        write_u8(buf, self.access_width);
        write_u8(buf, self.core_mode);
        #[allow(
            clippy::cast_possible_truncation,
            reason = "transactions are bounded well under u32::MAX by the 65 KB frame cap"
        )]
        let num_bytes = self.data.len() as u32;
        write_u32(buf, num_bytes);
        buf.extend_from_slice(&self.data);
        write_u32(buf, num_bytes);
        write_u32(buf, self.num_bytes_ok);
    }

    /// Parses a transaction from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let addr = Addr::unmarshal(cursor)?;
        let access_type = TxAccessType::unmarshal(cursor)?;
        let options = TxAccessOpt::from_bits_truncate(cursor.read_u32()?);
        let access_width = cursor.read_u8()?;
        let core_mode = cursor.read_u8()?;
        let num_bytes = cursor.read_u32()?;
        #[allow(
            clippy::cast_possible_truncation,
            reason = "buffer is already bounded to 65535 bytes by the frame cap"
        )]
        let data = cursor.read_bytes(num_bytes as usize)?.to_vec();
        let num_bytes_again = cursor.read_u32()?;
        if num_bytes_again != num_bytes {
            return Err(CodecError::LengthMismatch {
                expected: num_bytes,
                actual: num_bytes_again,
            });
        }
        let num_bytes_ok = cursor.read_u32()?;
        Ok(Self {
            addr,
            access_type,
            options,
            access_width,
            core_mode,
            data,
            num_bytes_ok,
        })
    }
}

/// `mcd_txlist_st` — an ordered bundle of transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxList {
    /// The transactions, in order.
    pub tx: Vec<Tx>,
    /// How many of `tx` completed fully OK.
    pub num_tx_ok: u32,
}

impl TxList {
    /// Appends the wire form of this transaction list.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "transaction lists are bounded by the 65 KB frame cap"
        )]
        let num_tx = self.tx.len() as u32;
        write_u32(buf, num_tx);
        for tx in &self.tx {
            tx.marshal(buf);
        }
        write_u32(buf, num_tx);
        write_u32(buf, self.num_tx_ok);
    }

    /// Parses a transaction list from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let num_tx = cursor.read_u32()?;
        let mut tx = Vec::new();
        for _ in 0..num_tx {
            tx.push(Tx::unmarshal(cursor)?);
        }
        let num_tx_again = cursor.read_u32()?;
        if num_tx_again != num_tx {
            return Err(CodecError::LengthMismatch {
                expected: num_tx,
                actual: num_tx_again,
            });
        }
        let num_tx_ok = cursor.read_u32()?;
        Ok(Self { tx, num_tx_ok })
    }
}

/// `mcd_trig_simple_core_st`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrigSimpleCore {
    /// Trigger type.
    pub trig_type: TrigType,
    /// Trigger option.
    pub option: TrigOption,
    /// Action taken when the trigger fires.
    pub action: TrigAction,
    /// Parameter for the action (e.g. sub-event).
    pub action_param: u32,
    /// Whether the server modified this trigger from the caller's request.
    pub modified: bool,
    /// Core-mode mask this trigger is sensitive to.
    pub state_mask: u32,
    /// Start of the address range.
    pub addr_start: Addr,
    /// Width of the address range.
    pub addr_range: u64,
}

impl TrigSimpleCore {
    fn marshal_payload(&self, buf: &mut Vec<u8>) {
        self.trig_type.marshal(buf);
        self.option.marshal(buf);
        self.action.marshal(buf);
        write_u32(buf, self.action_param);
        write_bool(buf, self.modified);
        write_u32(buf, self.state_mask);
        self.addr_start.marshal(buf);
        write_u64(buf, self.addr_range);
    }

    fn unmarshal_payload(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            trig_type: TrigType::unmarshal(cursor)?,
            option: TrigOption::unmarshal(cursor)?,
            action: TrigAction::unmarshal(cursor)?,
            action_param: cursor.read_u32()?,
            modified: cursor.read_bool()?,
            state_mask: cursor.read_u32()?,
            addr_start: Addr::unmarshal(cursor)?,
            addr_range: cursor.read_u64()?,
        })
    }
}

/// `mcd_trig_complex_core_st`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrigComplexCore {
    /// The simple-core fields this variant extends.
    pub base: TrigSimpleCore,
    /// Start of the data range to match.
    pub data_start: u64,
    /// Width of the data range.
    pub data_range: u64,
    /// Bitmask applied to data before comparison.
    pub data_mask: u64,
    /// Width in bytes of the data comparison.
    pub data_size: u32,
    /// Hardware thread this trigger is scoped to.
    pub hw_thread_id: u32,
    /// Software thread this trigger is scoped to.
    pub sw_thread_id: u64,
    /// Core-mode mask this trigger is sensitive to.
    pub core_mode_mask: u32,
}

impl TrigComplexCore {
    fn marshal_payload(&self, buf: &mut Vec<u8>) {
        self.base.marshal_payload(buf);
        write_u64(buf, self.data_start);
        write_u64(buf, self.data_range);
        write_u64(buf, self.data_mask);
        write_u32(buf, self.data_size);
        write_u32(buf, self.hw_thread_id);
        write_u64(buf, self.sw_thread_id);
        write_u32(buf, self.core_mode_mask);
    }

    fn unmarshal_payload(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let base = TrigSimpleCore::unmarshal_payload(cursor)?;
        Ok(Self {
            base,
            data_start: cursor.read_u64()?,
            data_range: cursor.read_u64()?,
            data_mask: cursor.read_u64()?,
            data_size: cursor.read_u32()?,
            hw_thread_id: cursor.read_u32()?,
            sw_thread_id: cursor.read_u64()?,
            core_mode_mask: cursor.read_u32()?,
        })
    }
}

/// The tagged trigger union (`mcd_rpc_trig_st`), one variant of which may
/// be present per value. `TriggerBus`, `Counter`, and `Custom` are
/// reserved wire slots: the reference server never populates them, but
/// this client can encode and decode them should a future server start
/// to (see `SPEC_FULL.md` §9).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// A simple address-range trigger.
    SimpleCore(TrigSimpleCore),
    /// An address-and-data-range trigger.
    ComplexCore(TrigComplexCore),
    /// A trigger-bus trigger (reserved; no payload is currently defined).
    TriggerBus,
    /// A counter trigger (reserved; no payload is currently defined).
    Counter,
    /// A custom trigger (reserved; no payload is currently defined).
    Custom,
}

impl Trigger {
    /// Appends the wire form: five `(outer-flag, inner-flag, payload?)`
    /// triples in the fixed order complex-core, simple-core, trig-bus,
    /// counter, custom.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        let is_complex = matches!(self, Self::ComplexCore(_));
        write_bool(buf, is_complex);
        write_bool(buf, is_complex);
        if let Self::ComplexCore(complex) = self {
            complex.marshal_payload(buf);
        }

        let is_simple = matches!(self, Self::SimpleCore(_));
        write_bool(buf, is_simple);
        write_bool(buf, is_simple);
        if let Self::SimpleCore(simple) = self {
            simple.marshal_payload(buf);
        }

        let is_trig_bus = matches!(self, Self::TriggerBus);
        write_bool(buf, is_trig_bus);
        write_bool(buf, is_trig_bus);

        let is_counter = matches!(self, Self::Counter);
        write_bool(buf, is_counter);
        write_bool(buf, is_counter);

        let is_custom = matches!(self, Self::Custom);
        write_bool(buf, is_custom);
        write_bool(buf, is_custom);
    }

    /// Parses the tagged trigger union, raising
    /// [`CodecError::UnionNotExclusive`] if zero or more than one inner
    /// flag was set.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let _outer_complex = cursor.read_bool()?;
        let inner_complex = cursor.read_bool()?;
        let complex = if inner_complex {
            Some(TrigComplexCore::unmarshal_payload(cursor)?)
        } else {
            None
        };

        let _outer_simple = cursor.read_bool()?;
        let inner_simple = cursor.read_bool()?;
        let simple = if inner_simple {
            Some(TrigSimpleCore::unmarshal_payload(cursor)?)
        } else {
            None
        };

        let _outer_trig_bus = cursor.read_bool()?;
        let inner_trig_bus = cursor.read_bool()?;

        let _outer_counter = cursor.read_bool()?;
        let inner_counter = cursor.read_bool()?;

        let _outer_custom = cursor.read_bool()?;
        let inner_custom = cursor.read_bool()?;

        let set_flags = u32::from(inner_complex)
            + u32::from(inner_simple)
            + u32::from(inner_trig_bus)
            + u32::from(inner_counter)
            + u32::from(inner_custom);
        if set_flags != 1 {
            return Err(CodecError::UnionNotExclusive { set_flags });
        }

        if let Some(complex) = complex {
            return Ok(Self::ComplexCore(complex));
        }
        if let Some(simple) = simple {
            return Ok(Self::SimpleCore(simple));
        }
        if inner_trig_bus {
            return Ok(Self::TriggerBus);
        }
        if inner_counter {
            return Ok(Self::Counter);
        }
        Ok(Self::Custom)
    }
}

/// `mcd_trig_state_st`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrigState {
    /// Whether the trigger is currently active.
    pub active: bool,
    /// Whether the trigger has captured data.
    pub captured: bool,
    /// Whether `count_value` is meaningful.
    pub captured_valid: bool,
    /// The captured count, if any.
    pub count_value: u64,
    /// Whether `count_value` is meaningful.
    pub count_valid: bool,
}

impl TrigState {
    /// Parses trigger state from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            active: cursor.read_bool()?,
            captured: cursor.read_bool()?,
            captured_valid: cursor.read_bool()?,
            count_value: cursor.read_u64()?,
            count_valid: cursor.read_bool()?,
        })
    }
}

/// `mcd_trig_set_state_st`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrigSetState {
    /// Whether the trigger set is active.
    pub active: bool,
    /// Combined state of the set.
    pub state: u32,
    /// Whether `state` is meaningful.
    pub state_valid: bool,
    /// Trigger-bus value.
    pub trig_bus: u32,
    /// Whether `trig_bus` is meaningful.
    pub trig_bus_valid: bool,
    /// Whether trace is running.
    pub trace: bool,
    /// Whether `trace` is meaningful.
    pub trace_valid: bool,
    /// Whether analysis is running.
    pub analysis: bool,
    /// Whether `analysis` is meaningful.
    pub analysis_valid: bool,
}

impl TrigSetState {
    /// Parses trigger-set state from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            active: cursor.read_bool()?,
            state: cursor.read_u32()?,
            state_valid: cursor.read_bool()?,
            trig_bus: cursor.read_u32()?,
            trig_bus_valid: cursor.read_bool()?,
            trace: cursor.read_bool()?,
            trace_valid: cursor.read_bool()?,
            analysis: cursor.read_bool()?,
            analysis_valid: cursor.read_bool()?,
        })
    }
}

/// `mcd_core_state_st`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreStateInfo {
    /// The core's run state.
    pub state: CoreState,
    /// Event bits accompanying the state.
    pub event: CoreEvent,
    /// Hardware thread that caused the stop.
    pub hw_thread_id: u32,
    /// The trigger that fired, or 0 if none.
    pub trig_id: u32,
    /// A short description of the stop reason.
    pub stop_str: String,
    /// Additional free-form information.
    pub info_str: String,
}

impl CoreStateInfo {
    /// Parses core state from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            state: CoreState::unmarshal(cursor)?,
            event: CoreEvent::from_bits_truncate(cursor.read_u32()?),
            hw_thread_id: cursor.read_u32()?,
            trig_id: cursor.read_u32()?,
            stop_str: read_string(cursor)?,
            info_str: read_string(cursor)?,
        })
    }
}

/// `mcd_rst_info_st` — a reset class description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RstInfo {
    /// Bitmask identifying which reset class(es) this describes.
    pub class_vector: u32,
    /// Human-readable description.
    pub info_str: String,
}

impl RstInfo {
    /// Parses reset-class info from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            class_vector: cursor.read_u32()?,
            info_str: read_string(cursor)?,
        })
    }
}

/// `mcd_ctrig_info_st` — a custom trigger description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CtrigInfo {
    /// Server-assigned custom-trigger id.
    pub ctrig_id: u32,
    /// Human-readable description.
    pub info_str: String,
}

impl CtrigInfo {
    /// Parses custom-trigger info from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ctrig_id: cursor.read_u32()?,
            info_str: read_string(cursor)?,
        })
    }
}

/// `mcd_api_version_st` / `mcd_impl_version_info_st` — client/server
/// implementation identity exchanged by `initialize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiVersion {
    /// Major version.
    pub v_api_major: u16,
    /// Minor version.
    pub v_api_minor: u16,
}

fn len_u32(s: &str) -> u32 {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "string fields are bounded by the 65 KB frame cap"
    )]
    let len = s.len() as u32;
    len
}

/// Reads a `length: u32, bytes: length×u8` variable-length string, the form
/// used for every non-fixed-length text field in the struct codec. Invalid
/// UTF-8 is replaced lossily rather than rejected, since description
/// strings are diagnostic, not protocol-critical.
pub fn read_string(cursor: &mut Cursor<'_>) -> Result<String, CodecError> {
    let len = cursor.read_u32()?;
    #[allow(
        clippy::cast_possible_truncation,
        reason = "buffer is already bounded to 65535 bytes by the frame cap"
    )]
    let bytes = cursor.read_bytes(len as usize)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Appends a `length: u32, bytes: length×u8` variable-length string.
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_u32(buf, len_u32(s));
    buf.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn addr_round_trips() {
        let addr = Addr {
            address: 0xDEAD_BEEF_0000_1234,
            mem_space_id: 7,
            addr_space_id: 1,
            addr_space_type: AddrSpaceType::Mem,
        };
        let mut buf = Vec::new();
        addr.marshal(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(Addr::unmarshal(&mut cursor).unwrap(), addr);
    }

    #[test]
    fn unknown_enum_discriminant_round_trips_as_other() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 999);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(CoreState::unmarshal(&mut cursor).unwrap(), CoreState::Other(999));
    }

    #[test]
    fn tx_round_trips_with_data() {
        let tx = Tx {
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
            data: vec![1, 2, 3, 4],
            num_bytes_ok: 4,
        };
        let mut buf = Vec::new();
        tx.marshal(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(Tx::unmarshal(&mut cursor).unwrap(), tx);
    }

    #[test]
    fn txlist_round_trips_empty() {
        let list = TxList::default();
        let mut buf = Vec::new();
        list.marshal(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(TxList::unmarshal(&mut cursor).unwrap(), list);
    }

    #[rstest]
    fn trigger_simple_core_round_trips() {
        let trig = Trigger::SimpleCore(TrigSimpleCore {
            trig_type: TrigType::InstructionHit,
            option: TrigOption::None,
            action: TrigAction::Debug,
            action_param: 0,
            modified: false,
            state_mask: 0xFFFF_FFFF,
            addr_start: Addr {
                address: 0x1000,
                mem_space_id: 1,
                addr_space_id: 0,
                addr_space_type: AddrSpaceType::Mem,
            },
            addr_range: 1,
        });
        let mut buf = Vec::new();
        trig.marshal(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(Trigger::unmarshal(&mut cursor).unwrap(), trig);
    }

    #[test]
    fn trigger_reserved_variants_round_trip() {
        for trig in [Trigger::TriggerBus, Trigger::Counter, Trigger::Custom] {
            let mut buf = Vec::new();
            trig.marshal(&mut buf);
            let mut cursor = Cursor::new(&buf);
            assert_eq!(Trigger::unmarshal(&mut cursor).unwrap(), trig);
        }
    }

    #[test]
    fn trigger_union_rejects_zero_flags_set() {
        let buf = vec![0_u8; 12];
        let mut cursor = Cursor::new(&buf);
        assert_eq!(
            Trigger::unmarshal(&mut cursor).unwrap_err(),
            CodecError::UnionNotExclusive { set_flags: 0 }
        );
    }

    #[test]
    fn trigger_union_rejects_two_flags_set() {
        let mut buf = Vec::new();
        write_bool(&mut buf, true); // outer complex-core
        write_bool(&mut buf, true); // inner complex-core
        buf.extend_from_slice(&[0_u8; 93]); // complex-core payload
        write_bool(&mut buf, true); // outer simple-core
        write_bool(&mut buf, true); // inner simple-core
        buf.extend_from_slice(&[0_u8; 49]); // simple-core payload
        buf.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // trig-bus, counter, custom

        let mut cursor = Cursor::new(&buf);
        assert_eq!(
            Trigger::unmarshal(&mut cursor).unwrap_err(),
            CodecError::UnionNotExclusive { set_flags: 2 }
        );
    }

    #[test]
    fn error_info_round_trips() {
        let err = ErrorInfo {
            return_status: McdReturn::ActHandleError,
            error_code: ErrorCode::Connection,
            error_events: ErrorEvent::PWRDN,
            error_str: "connection lost".to_string(),
        };
        let mut buf = Vec::new();
        err.marshal(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(ErrorInfo::unmarshal(&mut cursor).unwrap(), err);
    }

    #[test]
    fn core_con_info_matches_known_byte_layout() {
        let info = CoreConInfo {
            host: FixedString::from_str_lossy("127.0.0.1"),
            server_port: 0x0102_0304,
            server_key: FixedString::empty(),
            system_key: FixedString::empty(),
            device_key: FixedString::empty(),
            system: FixedString::empty(),
            system_instance: FixedString::empty(),
            acc_hw: FixedString::empty(),
            device_type: 0,
            device: FixedString::empty(),
            device_id: 0,
            core: FixedString::empty(),
            core_type: 0,
            core_id: 0,
        };
        let mut buf = Vec::new();
        info.marshal(&mut buf);
        // host field: length prefix (4) + 64 bytes, then server_port.
        let port_offset = 4 + 64;
        let port_bytes = &buf[port_offset..port_offset + 4];
        assert_eq!(u32::from_le_bytes(port_bytes.try_into().unwrap()), 0x0102_0304);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(CoreConInfo::unmarshal(&mut cursor).unwrap(), info);
    }
}
