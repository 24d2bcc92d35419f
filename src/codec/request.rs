//! Per-RPC request/response wrappers (§4.C): the stable opcode table, the
//! `length/uid/args` and `length/result` frame layouts, and the
//! marshal-args/unmarshal-result pair for every MCD entry point.

use thiserror::Error;

use crate::codec::CodecError;
use crate::codec::fixed_string::FixedString;
use crate::codec::primitive::{Cursor, write_bool, write_u8, write_u32};
use crate::codec::value::{
    Addr, CoreConInfo, CoreStateInfo, CtrigInfo, ErrorInfo, McdReturn, MemSpace, RegisterGroup,
    RegisterInfo, RstInfo, Trigger, TrigSetState, TrigState, TxList, read_string, write_string,
};

/// Hard cap on a single serialized frame, including its 4-byte length
/// prefix (§4.D).
pub const MAX_FRAME_LEN: usize = 65_535;

/// Errors raised while framing a request or parsing a response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The serialized args body would make the frame exceed
    /// [`MAX_FRAME_LEN`].
    #[error("request body of {body_len} bytes exceeds the {max} byte frame cap")]
    BodyTooLarge {
        /// The args body length that was rejected.
        body_len: usize,
        /// The cap it exceeded.
        max: usize,
    },
    /// The inbound length prefix exceeded [`MAX_FRAME_LEN`].
    #[error("inbound length prefix {declared} exceeds the {max} byte frame cap")]
    ReplyTooLarge {
        /// The length prefix read from the wire.
        declared: u32,
        /// The cap it exceeded.
        max: usize,
    },
    /// Decoding the result body consumed a different number of bytes than
    /// the length prefix declared.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// The stable RPC opcode table (1..54), carried as the request frame's
/// `uid` byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// `UID_MCD_INITIALIZE`.
    Initialize = 1,
    /// `UID_MCD_EXIT`. No reply is ever sent for this opcode.
    Exit = 2,
    /// `UID_MCD_QRY_SERVERS`.
    QryServers = 3,
    /// `UID_MCD_OPEN_SERVER`.
    OpenServer = 4,
    /// `UID_MCD_CLOSE_SERVER`.
    CloseServer = 5,
    /// `UID_MCD_SET_SERVER_CONFIG`.
    SetServerConfig = 6,
    /// `UID_MCD_QRY_SERVER_CONFIG`.
    QryServerConfig = 7,
    /// `UID_MCD_QRY_SYSTEMS`.
    QrySystems = 8,
    /// `UID_MCD_QRY_DEVICES`.
    QryDevices = 9,
    /// `UID_MCD_QRY_CORES`.
    QryCores = 10,
    /// `UID_MCD_QRY_CORE_MODES`.
    QryCoreModes = 11,
    /// `UID_MCD_OPEN_CORE`.
    OpenCore = 12,
    /// `UID_MCD_CLOSE_CORE`.
    CloseCore = 13,
    /// `UID_MCD_QRY_ERROR_INFO`.
    QryErrorInfo = 14,
    /// `UID_MCD_QRY_DEVICE_DESCRIPTION`.
    QryDeviceDescription = 15,
    /// `UID_MCD_QRY_MAX_PAYLOAD_SIZE`.
    QryMaxPayloadSize = 16,
    /// `UID_MCD_QRY_INPUT_HANDLE`.
    QryInputHandle = 17,
    /// `UID_MCD_QRY_MEM_SPACES`.
    QryMemSpaces = 18,
    /// `UID_MCD_QRY_MEM_BLOCKS`.
    QryMemBlocks = 19,
    /// `UID_MCD_QRY_ACTIVE_OVERLAYS`.
    QryActiveOverlays = 20,
    /// `UID_MCD_QRY_REG_GROUPS`.
    QryRegGroups = 21,
    /// `UID_MCD_QRY_REG_MAP`.
    QryRegMap = 22,
    /// `UID_MCD_QRY_REG_COMPOUND`.
    QryRegCompound = 23,
    /// `UID_MCD_QRY_TRIG_INFO`.
    QryTrigInfo = 24,
    /// `UID_MCD_QRY_CTRIGS`.
    QryCtrigs = 25,
    /// `UID_MCD_CREATE_TRIG`.
    CreateTrig = 26,
    /// `UID_MCD_QRY_TRIG`.
    QryTrig = 27,
    /// `UID_MCD_REMOVE_TRIG`.
    RemoveTrig = 28,
    /// `UID_MCD_QRY_TRIG_STATE`.
    QryTrigState = 29,
    /// `UID_MCD_ACTIVATE_TRIG_SET`.
    ActivateTrigSet = 30,
    /// `UID_MCD_REMOVE_TRIG_SET`.
    RemoveTrigSet = 31,
    /// `UID_MCD_QRY_TRIG_SET`.
    QryTrigSet = 32,
    /// `UID_MCD_QRY_TRIG_SET_STATE`.
    QryTrigSetState = 33,
    /// `UID_MCD_EXECUTE_TXLIST`.
    ExecuteTxlist = 34,
    /// `UID_MCD_RUN`.
    Run = 35,
    /// `UID_MCD_STOP`.
    Stop = 36,
    /// `UID_MCD_RUN_UNTIL`.
    RunUntil = 37,
    /// `UID_MCD_QRY_CURRENT_TIME`.
    QryCurrentTime = 38,
    /// `UID_MCD_STEP`.
    Step = 39,
    /// `UID_MCD_SET_GLOBAL`.
    SetGlobal = 40,
    /// `UID_MCD_QRY_STATE`.
    QryState = 41,
    /// `UID_MCD_EXECUTE_COMMAND`.
    ExecuteCommand = 42,
    /// `UID_MCD_QRY_RST_CLASSES`.
    QryRstClasses = 43,
    /// `UID_MCD_QRY_RST_CLASS_INFO`.
    QryRstClassInfo = 44,
    /// `UID_MCD_RST`.
    Rst = 45,
    /// `UID_MCD_CHL_OPEN`.
    ChlOpen = 46,
    /// `UID_MCD_SEND_MSG`.
    SendMsg = 47,
    /// `UID_MCD_RECEIVE_MSG`.
    ReceiveMsg = 48,
    /// `UID_MCD_CHL_RESET`.
    ChlReset = 49,
    /// `UID_MCD_CHL_CLOSE`.
    ChlClose = 50,
    /// `UID_MCD_QRY_TRACES`.
    QryTraces = 51,
    /// `UID_MCD_QRY_TRACE_STATE`.
    QryTraceState = 52,
    /// `UID_MCD_SET_TRACE_STATE`.
    SetTraceState = 53,
    /// `UID_MCD_READ_TRACE`.
    ReadTrace = 54,
}

/// Appends `length: u32, uid: u8, args_body` to `buf`, where `length`
/// counts `args_body.len() + 1` (the `uid` byte). Fails before writing
/// anything if the resulting frame (including the 4-byte length prefix)
/// would exceed [`MAX_FRAME_LEN`].
pub fn encode_request_frame(
    opcode: Opcode,
    args_body: &[u8],
    buf: &mut Vec<u8>,
) -> Result<(), RequestError> {
    let frame_len = 4 + 1 + args_body.len();
    if frame_len > MAX_FRAME_LEN {
        return Err(RequestError::BodyTooLarge {
            body_len: args_body.len(),
            max: MAX_FRAME_LEN - 5,
        });
    }
    #[allow(
        clippy::cast_possible_truncation,
        reason = "frame_len was just checked against MAX_FRAME_LEN"
    )]
    let length = (args_body.len() + 1) as u32;
    write_u32(buf, length);
    write_u8(buf, opcode as u8);
    buf.extend_from_slice(args_body);
    Ok(())
}

/// Validates an inbound length prefix against [`MAX_FRAME_LEN`] before any
/// payload bytes are read, matching the "no buffer read beyond the prefix"
/// testable property.
pub fn check_reply_length(declared: u32) -> Result<(), RequestError> {
    if declared as usize > MAX_FRAME_LEN - 4 {
        return Err(RequestError::ReplyTooLarge {
            declared,
            max: MAX_FRAME_LEN - 4,
        });
    }
    Ok(())
}

/// Validates that decoding a result body consumed exactly `declared` bytes.
pub fn check_consumed(declared: u32, actual: usize) -> Result<(), CodecError> {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "actual is bounded by the already-validated declared length"
    )]
    let actual = actual as u32;
    if actual != declared {
        return Err(CodecError::LengthMismatch {
            expected: declared,
            actual,
        });
    }
    Ok(())
}

fn write_optional(buf: &mut Vec<u8>, present: bool, payload: impl FnOnce(&mut Vec<u8>)) {
    write_bool(buf, present);
    if present {
        payload(buf);
    }
}

fn read_optional<T>(
    cursor: &mut Cursor<'_>,
    decode: impl FnOnce(&mut Cursor<'_>) -> Result<T, CodecError>,
) -> Result<Option<T>, CodecError> {
    if cursor.read_bool()? {
        Ok(Some(decode(cursor)?))
    } else {
        Ok(None)
    }
}

fn write_vec<T>(buf: &mut Vec<u8>, items: &[T], marshal: impl Fn(&T, &mut Vec<u8>)) {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "arrays are bounded by the 65 KB frame cap"
    )]
    let len = items.len() as u32;
    write_u32(buf, len);
    for item in items {
        marshal(item, buf);
    }
}

fn read_vec<T>(
    cursor: &mut Cursor<'_>,
    decode: impl Fn(&mut Cursor<'_>) -> Result<T, CodecError>,
) -> Result<Vec<T>, CodecError> {
    let len = cursor.read_u32()?;
    let mut items = Vec::new();
    for _ in 0..len {
        items.push(decode(cursor)?);
    }
    Ok(items)
}

/// `mcd_initialize_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitializeArgs {
    /// The API version the caller is requesting.
    pub version_req: (u16, u16),
}

/// `mcd_initialize_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitializeResult {
    /// Outcome of the version negotiation.
    pub ret: McdReturn,
    /// Implementer version/vendor info, present iff `ret == Ok`.
    pub impl_info: Option<(u16, u16, String)>,
}

/// The two-mode count/fetch shape shared by every "enumerate N starting at
/// an index" RPC (`qry_servers`, `qry_systems`, `qry_devices`,
/// `qry_cores`, `qry_core_modes`, `qry_mem_spaces`, `qry_reg_groups`,
/// `qry_active_overlays`, `qry_trig_info`, `qry_ctrigs`,
/// `qry_rst_classes`, `qry_traces`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountQueryArgs {
    /// First index to return, when `count > 0`.
    pub start_index: u32,
    /// `0` to request the total count; `>0` to request that many entries.
    pub count: u32,
}

impl CountQueryArgs {
    /// Appends the wire form of a count-query args struct.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.start_index);
        write_u32(buf, self.count);
    }

    /// Parses a count-query args struct from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            start_index: cursor.read_u32()?,
            count: cursor.read_u32()?,
        })
    }
}

/// `mcd_open_server_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenServerArgs {
    /// Opaque system authentication key, may be empty.
    pub system_key: String,
    /// Server configuration string (unused beyond the `<host>:<port>`
    /// grammar resolved before the transport opened; carried for servers
    /// that accept additional directives).
    pub config_string: String,
}

impl OpenServerArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_string(buf, &self.system_key);
        write_string(buf, &self.config_string);
    }
}

/// `mcd_open_server_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenServerResult {
    /// Outcome of the open.
    pub ret: McdReturn,
    /// Server-assigned uid, present iff `ret == Ok`.
    pub server_uid: Option<u32>,
    /// The host the server reports back, present iff `ret == Ok`.
    pub host: Option<String>,
    /// The config string the server reports back, present iff
    /// `ret == Ok`.
    pub config_string: Option<String>,
}

impl OpenServerResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let server_uid = read_optional(cursor, |c| c.read_u32())?;
        let host = read_optional(cursor, read_string)?;
        let config_string = read_optional(cursor, read_string)?;
        Ok(Self {
            ret,
            server_uid,
            host,
            config_string,
        })
    }
}

/// `mcd_close_server_args` / `mcd_close_core_args` — both name only a
/// server or core uid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UidArgs {
    /// The server- or core-uid the operation targets.
    pub uid: u32,
}

impl UidArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.uid);
    }
}

/// Result shape shared by every RPC that reports only a return status
/// (`close_server`, `close_core`, `remove_trig`, `activate_trig_set`,
/// `remove_trig_set`, `run`, `stop`, `step`, `set_global`, `rst`,
/// `chl_reset`, `chl_close`, `set_trace_state`, `execute_command`,
/// `set_server_config`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusResult {
    /// Outcome of the call.
    pub ret: McdReturn,
}

impl StatusResult {
    /// Parses a bare status result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
        })
    }
}

/// `mcd_open_core_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenCoreArgs {
    /// Connection info identifying the core to open.
    pub core_con_info: CoreConInfo,
}

impl OpenCoreArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        self.core_con_info.marshal(buf);
    }
}

/// `mcd_open_core_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenCoreResult {
    /// Outcome of the open.
    pub ret: McdReturn,
    /// Server-assigned core uid, present iff `ret == Ok`.
    pub core_uid: Option<u32>,
}

impl OpenCoreResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let core_uid = read_optional(cursor, |c| c.read_u32())?;
        Ok(Self { ret, core_uid })
    }
}

/// `mcd_qry_error_info_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryErrorInfoArgs {
    /// Core uid to scope the query to, or `0` for the server at large.
    pub core_uid: u32,
}

impl QryErrorInfoArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
    }
}

/// `mcd_qry_error_info_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryErrorInfoResult {
    /// The server's error info.
    pub error_info: ErrorInfo,
}

impl QryErrorInfoResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            error_info: ErrorInfo::unmarshal(cursor)?,
        })
    }
}

/// `mcd_qry_mem_spaces_args` / `mcd_qry_reg_groups_args` share the
/// `(core_uid, start_index, count)` shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreCountQueryArgs {
    /// The core this query targets.
    pub core_uid: u32,
    /// The underlying count-query parameters.
    pub query: CountQueryArgs,
}

impl CoreCountQueryArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        self.query.marshal(buf);
    }
}

/// Result shape for `qry_mem_spaces`: a count, or the requested slice of
/// memory spaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryMemSpacesResult {
    /// Outcome of the query.
    pub ret: McdReturn,
    /// Total memory space count, always present.
    pub num_mem_spaces: u32,
    /// The requested slice, present iff the caller asked for entries
    /// (`count > 0` on the request) and `ret == Ok`.
    pub mem_spaces: Vec<MemSpace>,
}

impl QryMemSpacesResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_mem_spaces: cursor.read_u32()?,
            mem_spaces: read_vec(cursor, MemSpace::unmarshal)?,
        })
    }
}

/// `mcd_qry_reg_groups_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryRegGroupsResult {
    /// Outcome of the query.
    pub ret: McdReturn,
    /// Total register group count, always present.
    pub num_reg_groups: u32,
    /// The requested slice.
    pub reg_groups: Vec<RegisterGroup>,
}

impl QryRegGroupsResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_reg_groups: cursor.read_u32()?,
            reg_groups: read_vec(cursor, RegisterGroup::unmarshal)?,
        })
    }
}

/// `mcd_qry_reg_map_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryRegMapArgs {
    /// The core this query targets.
    pub core_uid: u32,
    /// `0` enumerates across all groups in declared order; non-zero
    /// restricts to one group.
    pub reg_group_id: u32,
    /// The underlying count-query parameters.
    pub query: CountQueryArgs,
}

impl QryRegMapArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.reg_group_id);
        self.query.marshal(buf);
    }
}

/// `mcd_qry_reg_map_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryRegMapResult {
    /// Outcome of the query.
    pub ret: McdReturn,
    /// Total register count for the request's scope, always present.
    pub num_regs: u32,
    /// The requested slice.
    pub reg_info: Vec<RegisterInfo>,
}

impl QryRegMapResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_regs: cursor.read_u32()?,
            reg_info: read_vec(cursor, RegisterInfo::unmarshal)?,
        })
    }
}

/// `mcd_execute_txlist_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecuteTxlistArgs {
    /// The core this transaction list targets.
    pub core_uid: u32,
    /// The transactions to execute.
    pub txlist: TxList,
}

impl ExecuteTxlistArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        self.txlist.marshal(buf);
    }
}

/// `mcd_execute_txlist_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecuteTxlistResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The server's (possibly partially completed) transaction list,
    /// present iff `ret == Ok`.
    pub txlist: Option<TxList>,
}

impl ExecuteTxlistResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let txlist = read_optional(cursor, TxList::unmarshal)?;
        Ok(Self { ret, txlist })
    }
}

/// `mcd_create_trig_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTrigArgs {
    /// The core to install the trigger on.
    pub core_uid: u32,
    /// The trigger to create.
    pub trigger: Trigger,
}

impl CreateTrigArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        self.trigger.marshal(buf);
    }
}

/// `mcd_create_trig_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTrigResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Server-assigned trigger id, present iff `ret == Ok`.
    pub trig_id: Option<u32>,
    /// The trigger as accepted (possibly modified) by the server, present
    /// iff `ret == Ok`.
    pub trigger: Option<Trigger>,
}

impl CreateTrigResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let trig_id = read_optional(cursor, |c| c.read_u32())?;
        let trigger = read_optional(cursor, Trigger::unmarshal)?;
        Ok(Self {
            ret,
            trig_id,
            trigger,
        })
    }
}

/// `mcd_qry_trig_args` / `mcd_remove_trig_args` / `mcd_qry_trig_state_args`
/// share the `(core_uid, trig_id)` shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrigIdArgs {
    /// The core the trigger belongs to.
    pub core_uid: u32,
    /// The trigger's id.
    pub trig_id: u32,
}

impl TrigIdArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.trig_id);
    }
}

/// `mcd_qry_trig_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryTrigResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The trigger, present iff `ret == Ok` and it fit the caller's
    /// declared maximum size.
    pub trigger: Option<Trigger>,
}

impl QryTrigResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let trigger = read_optional(cursor, Trigger::unmarshal)?;
        Ok(Self { ret, trigger })
    }
}

/// `mcd_qry_trig_state_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryTrigStateResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The trigger's state, present iff `ret == Ok`.
    pub state: Option<TrigState>,
}

impl QryTrigStateResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let state = read_optional(cursor, TrigState::unmarshal)?;
        Ok(Self { ret, state })
    }
}

/// `mcd_activate_trig_set_args` / `mcd_remove_trig_set_args` share the
/// bare `core_uid` shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreUidArgs {
    /// The core the trigger set belongs to.
    pub core_uid: u32,
}

impl CoreUidArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
    }
}

/// `mcd_qry_trig_set_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryTrigSetArgs {
    /// The core the trigger set belongs to.
    pub core_uid: u32,
    /// The underlying count-query parameters.
    pub query: CountQueryArgs,
}

impl QryTrigSetArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        self.query.marshal(buf);
    }
}

/// `mcd_qry_trig_set_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryTrigSetResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total installed trigger count, always present.
    pub num_trigs: u32,
    /// The requested slice of trigger ids.
    pub trig_ids: Vec<u32>,
}

impl QryTrigSetResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_trigs: cursor.read_u32()?,
            trig_ids: read_vec(cursor, |c| c.read_u32())?,
        })
    }
}

/// `mcd_qry_trig_set_state_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryTrigSetStateResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The trigger set's state, present iff `ret == Ok`.
    pub state: Option<TrigSetState>,
}

impl QryTrigSetStateResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let state = read_optional(cursor, TrigSetState::unmarshal)?;
        Ok(Self { ret, state })
    }
}

/// `mcd_run_args` / `mcd_step_args` share the `(core_uid, global)` shape;
/// `step` additionally carries a step type and count, modeled separately
/// as [`StepArgs`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunArgs {
    /// The core to run.
    pub core_uid: u32,
    /// Whether this affects every core in the system (`true`) or only
    /// `core_uid` (`false`).
    pub global: bool,
}

impl RunArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_bool(buf, self.global);
    }
}

/// `mcd_stop_args`. Unlike the reference implementation (which always
/// sends `global = true`; see `SPEC_FULL.md` §9), this marshals the
/// caller's own `global` flag unchanged.
pub type StopArgs = RunArgs;

/// `mcd_step_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepArgs {
    /// The core to step.
    pub core_uid: u32,
    /// Whether every core steps together.
    pub global: bool,
    /// The kind of step (instruction, cycle, …), left as a raw code since
    /// `mcd_core_step_type_et` has no fixed-meaning variants this client
    /// needs to branch on.
    pub step_type: u32,
    /// Number of steps to take.
    pub n_steps: u32,
}

impl StepArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_bool(buf, self.global);
        write_u32(buf, self.step_type);
        write_u32(buf, self.n_steps);
    }
}

/// `mcd_qry_state_args`.
pub type QryStateArgs = CoreUidArgs;

/// `mcd_qry_state_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryStateResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The core's state, present iff `ret == Ok`.
    pub state: Option<CoreStateInfo>,
}

impl QryStateResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let state = read_optional(cursor, CoreStateInfo::unmarshal)?;
        Ok(Self { ret, state })
    }
}

/// `mcd_qry_rst_classes_result`: a bitmask of available reset classes, not
/// a count/list (reset classes are identified by bit position, not
/// index).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryRstClassesResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Bitmask of available reset classes.
    pub rst_class_vector: u32,
}

impl QryRstClassesResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            rst_class_vector: cursor.read_u32()?,
        })
    }
}

/// `mcd_qry_rst_class_info_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryRstClassInfoArgs {
    /// The core this query targets.
    pub core_uid: u32,
    /// Which single reset class bit to describe.
    pub rst_class: u8,
}

impl QryRstClassInfoArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u8(buf, self.rst_class);
    }
}

/// `mcd_qry_rst_class_info_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryRstClassInfoResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The reset class's description, present iff `ret == Ok`.
    pub info: Option<RstInfo>,
}

impl QryRstClassInfoResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let info = read_optional(cursor, RstInfo::unmarshal)?;
        Ok(Self { ret, info })
    }
}

/// `mcd_rst_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RstArgs {
    /// The core to reset.
    pub core_uid: u32,
    /// Which reset class bit(s) to apply.
    pub rst_class_vector: u32,
    /// Whether every core in the system resets together.
    pub global: bool,
}

impl RstArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.rst_class_vector);
        write_bool(buf, self.global);
    }
}

/// `mcd_chl_open_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChlOpenArgs {
    /// The core to open a channel on.
    pub core_uid: u32,
    /// Requested channel id (server may substitute its own).
    pub chl_id: u32,
}

impl ChlOpenArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.chl_id);
    }
}

/// `mcd_chl_open_result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChlOpenResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The channel id assigned by the server, present iff `ret == Ok`.
    pub chl_id: Option<u32>,
}

impl ChlOpenResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let chl_id = read_optional(cursor, |c| c.read_u32())?;
        Ok(Self { ret, chl_id })
    }
}

/// `mcd_send_msg_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendMsgArgs {
    /// The core the channel belongs to.
    pub core_uid: u32,
    /// The channel to send on.
    pub chl_id: u32,
    /// Message bytes.
    pub msg: Vec<u8>,
}

impl SendMsgArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.chl_id);
        write_vec(buf, &self.msg, |byte, buf| write_u8(buf, *byte));
    }
}

/// `mcd_receive_msg_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiveMsgArgs {
    /// The core the channel belongs to.
    pub core_uid: u32,
    /// The channel to receive on.
    pub chl_id: u32,
    /// Maximum bytes to return.
    pub max_len: u32,
}

impl ReceiveMsgArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.chl_id);
        write_u32(buf, self.max_len);
    }
}

/// `mcd_receive_msg_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiveMsgResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The received bytes, present iff `ret == Ok`.
    pub msg: Option<Vec<u8>>,
}

impl ReceiveMsgResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let msg = read_optional(cursor, |c| read_vec(c, |c2| c2.read_u8()))?;
        Ok(Self { ret, msg })
    }
}

/// `mcd_qry_traces_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryTracesResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total trace-source count, always present.
    pub num_traces: u32,
    /// The requested slice of trace source ids.
    pub trace_ids: Vec<u32>,
}

impl QryTracesResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_traces: cursor.read_u32()?,
            trace_ids: read_vec(cursor, |c| c.read_u32())?,
        })
    }
}

/// `mcd_qry_trace_state_args` / `mcd_set_trace_state_args` share the
/// `(core_uid, trace_id)` prefix; `set_trace_state` additionally carries
/// the desired state, modeled in [`SetTraceStateArgs`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceIdArgs {
    /// The core the trace source belongs to.
    pub core_uid: u32,
    /// The trace source's id.
    pub trace_id: u32,
}

impl TraceIdArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.trace_id);
    }
}

/// `mcd_qry_trace_state_result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryTraceStateResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Whether the trace source is currently enabled, present iff
    /// `ret == Ok`.
    pub enabled: Option<bool>,
}

impl QryTraceStateResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let enabled = read_optional(cursor, |c| c.read_bool())?;
        Ok(Self { ret, enabled })
    }
}

/// `mcd_set_trace_state_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetTraceStateArgs {
    /// The core the trace source belongs to.
    pub core_uid: u32,
    /// The trace source's id.
    pub trace_id: u32,
    /// The desired enabled state.
    pub enabled: bool,
}

impl SetTraceStateArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.trace_id);
        write_bool(buf, self.enabled);
    }
}

/// Maximum trace frames a single `read_trace` RPC may request, per §4.H.
pub const MAX_TRACE_FRAMES_PER_CALL: u32 = 100;

/// `mcd_read_trace_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadTraceArgs {
    /// The core the trace source belongs to.
    pub core_uid: u32,
    /// The trace source to read from.
    pub trace_id: u32,
    /// First frame to return.
    pub start_index: u32,
    /// Number of frames requested; callers must chunk requests to at most
    /// [`MAX_TRACE_FRAMES_PER_CALL`].
    pub num_frames: u32,
}

impl ReadTraceArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.trace_id);
        write_u32(buf, self.start_index);
        write_u32(buf, self.num_frames);
    }
}

/// A single generic trace frame: an address plus its sampled value. The
/// reference protocol's cycle/counter/custom trace variants all share
/// this shape once reduced to an (address, data) pair; `read_trace`
/// reports whichever of the three arrays the trace source populated as a
/// uniform sequence here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceFrame {
    /// The address (or cycle count) this frame samples.
    pub address: u64,
    /// The sampled bytes.
    pub data: Vec<u8>,
}

impl TraceFrame {
    fn marshal(&self, buf: &mut Vec<u8>) {
        crate::codec::primitive::write_u64(buf, self.address);
        write_vec(buf, &self.data, |byte, buf| write_u8(buf, *byte));
    }

    fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            address: cursor.read_u64()?,
            data: read_vec(cursor, |c| c.read_u8())?,
        })
    }
}

/// `mcd_read_trace_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadTraceResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The frames returned, present iff `ret == Ok`. A server returning
    /// fewer frames than requested signals end-of-trace; returning more
    /// is a protocol error the façade rejects (§4.H).
    pub frames: Option<Vec<TraceFrame>>,
}

impl ReadTraceResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let frames = read_optional(cursor, |c| read_vec(c, TraceFrame::unmarshal))?;
        Ok(Self { ret, frames })
    }
}

/// `mcd_qry_device_description_args`.
pub type QryDeviceDescriptionArgs = CoreUidArgs;

/// `mcd_qry_device_description_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryDeviceDescriptionResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// URL or path to the device description, present iff `ret == Ok`.
    pub url: Option<String>,
}

impl QryDeviceDescriptionResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let url = read_optional(cursor, read_string)?;
        Ok(Self { ret, url })
    }
}

/// `mcd_qry_max_payload_size_args`.
pub type QryMaxPayloadSizeArgs = CoreUidArgs;

/// `mcd_qry_max_payload_size_result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryMaxPayloadSizeResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Maximum single-transaction payload size, present iff `ret == Ok`.
    pub max_payload: Option<u32>,
}

impl QryMaxPayloadSizeResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let max_payload = read_optional(cursor, |c| c.read_u32())?;
        Ok(Self { ret, max_payload })
    }
}

/// `mcd_qry_input_handle_args`.
pub type QryInputHandleArgs = CoreUidArgs;

/// `mcd_qry_input_handle_result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryInputHandleResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// OS-level input handle/descriptor, present iff `ret == Ok`.
    pub input_handle: Option<u32>,
}

impl QryInputHandleResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let input_handle = read_optional(cursor, |c| c.read_u32())?;
        Ok(Self { ret, input_handle })
    }
}

/// `mcd_qry_mem_blocks_args`.
pub type QryMemBlocksArgs = CoreCountQueryArgs;

/// `mcd_qry_mem_blocks_result`: reported as (start, end) address pairs per
/// block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryMemBlocksResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total block count, always present.
    pub num_blocks: u32,
    /// The requested slice of `(start, end)` address pairs.
    pub blocks: Vec<(u64, u64)>,
}

impl QryMemBlocksResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_blocks: cursor.read_u32()?,
            blocks: read_vec(cursor, |c| Ok((c.read_u64()?, c.read_u64()?)))?,
        })
    }
}

/// `mcd_qry_active_overlays_args`.
pub type QryActiveOverlaysArgs = CoreCountQueryArgs;

/// `mcd_qry_active_overlays_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryActiveOverlaysResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total active-overlay count, always present.
    pub num_overlays: u32,
    /// The requested slice of overlay ids.
    pub overlays: Vec<u32>,
}

impl QryActiveOverlaysResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_overlays: cursor.read_u32()?,
            overlays: read_vec(cursor, |c| c.read_u32())?,
        })
    }
}

/// `mcd_qry_reg_compound_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryRegCompoundArgs {
    /// The core this query targets.
    pub core_uid: u32,
    /// The compound register whose parts are being enumerated.
    pub compound_reg_id: u32,
    /// The underlying count-query parameters.
    pub query: CountQueryArgs,
}

impl QryRegCompoundArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.compound_reg_id);
        self.query.marshal(buf);
    }
}

/// `mcd_qry_reg_compound_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryRegCompoundResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total part count, always present.
    pub num_parts: u32,
    /// The requested slice of part register ids.
    pub part_reg_ids: Vec<u32>,
}

impl QryRegCompoundResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_parts: cursor.read_u32()?,
            part_reg_ids: read_vec(cursor, |c| c.read_u32())?,
        })
    }
}

/// `mcd_qry_trig_info_result`: the trigger types this core supports, not
/// installed triggers (those are `qry_trig_set`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryTrigInfoResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total supported-type count, always present.
    pub num_types: u32,
    /// The requested slice, as raw `mcd_trig_type_et` discriminants.
    pub types: Vec<u32>,
}

impl QryTrigInfoResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_types: cursor.read_u32()?,
            types: read_vec(cursor, |c| c.read_u32())?,
        })
    }
}

/// `mcd_qry_ctrigs_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryCtrigsResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total custom-trigger count, always present.
    pub num_ctrigs: u32,
    /// The requested slice.
    pub ctrigs: Vec<CtrigInfo>,
}

impl QryCtrigsResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_ctrigs: cursor.read_u32()?,
            ctrigs: read_vec(cursor, CtrigInfo::unmarshal)?,
        })
    }
}

/// `mcd_qry_servers_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryServersArgs {
    /// Restricts the search to a specific host, or all hosts if empty.
    pub host: String,
    /// Restrict the search to already-running servers.
    pub running: bool,
    /// The underlying count-query parameters.
    pub query: CountQueryArgs,
}

impl QryServersArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_string(buf, &self.host);
        write_bool(buf, self.running);
        self.query.marshal(buf);
    }
}

/// A server discoverable via `qry_servers`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server host.
    pub host: FixedString<64>,
    /// Server acquisition/system key.
    pub system_key: FixedString<32>,
}

impl ServerInfo {
    fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            host: FixedString::unmarshal(cursor)?,
            system_key: FixedString::unmarshal(cursor)?,
        })
    }
}

/// `mcd_qry_servers_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryServersResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total discoverable server count, always present.
    pub num_servers: u32,
    /// The requested slice.
    pub server_info: Vec<ServerInfo>,
}

impl QryServersResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_servers: cursor.read_u32()?,
            server_info: read_vec(cursor, ServerInfo::unmarshal)?,
        })
    }
}

/// `mcd_qry_systems_args` / `mcd_qry_devices_args` / `mcd_qry_cores_args`
/// / `mcd_qry_core_modes_args` share the `(query_info, query)` shape,
/// where `query_info` narrows the search to children of an
/// already-identified parent (empty fields mean "search all").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumerateArgs {
    /// Connection info narrowing the search (system/device fields set by
    /// callers enumerating devices/cores under a known parent).
    pub query_info: CoreConInfo,
    /// The underlying count-query parameters.
    pub query: CountQueryArgs,
}

impl EnumerateArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        self.query_info.marshal(buf);
        self.query.marshal(buf);
    }
}

/// Result shape shared by `qry_systems`/`qry_devices`/`qry_cores`: a count,
/// or the requested slice of connection-info entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumerateResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total matching count, always present.
    pub num_found: u32,
    /// The requested slice.
    pub info: Vec<CoreConInfo>,
}

impl EnumerateResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_found: cursor.read_u32()?,
            info: read_vec(cursor, CoreConInfo::unmarshal)?,
        })
    }
}

/// `mcd_qry_core_modes_result`: core execution modes are reported by name
/// and numeric code rather than a structured type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryCoreModesResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Total mode count, always present.
    pub num_modes: u32,
    /// The requested slice of `(code, name)` pairs.
    pub modes: Vec<(u32, String)>,
}

impl QryCoreModesResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            ret: McdReturn::unmarshal_pub(cursor)?,
            num_modes: cursor.read_u32()?,
            modes: read_vec(cursor, |c| Ok((c.read_u32()?, read_string(c)?)))?,
        })
    }
}

/// `mcd_execute_command_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecuteCommandArgs {
    /// The core the command targets, or `0` for the server at large.
    pub core_uid: u32,
    /// The vendor-defined command string.
    pub command: String,
}

impl ExecuteCommandArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_string(buf, &self.command);
    }
}

/// `mcd_set_global_args`.
pub type SetGlobalArgs = RunArgs;

/// `mcd_set_server_config_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetServerConfigArgs {
    /// The server this config applies to.
    pub server_uid: u32,
    /// Vendor-defined configuration string.
    pub config_string: String,
}

impl SetServerConfigArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.server_uid);
        write_string(buf, &self.config_string);
    }
}

/// `mcd_qry_server_config_args`.
pub type QryServerConfigArgs = UidArgs;

/// `mcd_qry_server_config_result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QryServerConfigResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// The server's current configuration string, present iff
    /// `ret == Ok`.
    pub config_string: Option<String>,
}

impl QryServerConfigResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let config_string = read_optional(cursor, read_string)?;
        Ok(Self { ret, config_string })
    }
}

/// `mcd_qry_current_time_args`.
pub type QryCurrentTimeArgs = CoreUidArgs;

/// `mcd_qry_current_time_result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QryCurrentTimeResult {
    /// Outcome of the call.
    pub ret: McdReturn,
    /// Current target time, present iff `ret == Ok`.
    pub current_time: Option<u64>,
}

impl QryCurrentTimeResult {
    /// Parses this result from the wire.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let ret = McdReturn::unmarshal_pub(cursor)?;
        let current_time = read_optional(cursor, |c| c.read_u64())?;
        Ok(Self { ret, current_time })
    }
}

/// `mcd_run_until_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunUntilArgs {
    /// The core to run.
    pub core_uid: u32,
    /// Whether every core runs together.
    pub global: bool,
    /// Target time to run until.
    pub run_until_time: u64,
}

impl RunUntilArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_bool(buf, self.global);
        crate::codec::primitive::write_u64(buf, self.run_until_time);
    }
}

/// `mcd_chl_reset_args` / `mcd_chl_close_args` share the
/// `(core_uid, chl_id)` shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChlIdArgs {
    /// The core the channel belongs to.
    pub core_uid: u32,
    /// The channel's id.
    pub chl_id: u32,
}

impl ChlIdArgs {
    /// Appends the wire form of this request's args.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.core_uid);
        write_u32(buf, self.chl_id);
    }
}

// `McdReturn::unmarshal` is private to `value`; re-expose a crate-visible
// wrapper so `request` (a sibling module) can decode the leading return
// status shared by almost every result type without duplicating it.
trait McdReturnExt {
    fn unmarshal_pub(cursor: &mut Cursor<'_>) -> Result<McdReturn, CodecError>;
}

impl McdReturnExt for McdReturn {
    fn unmarshal_pub(cursor: &mut Cursor<'_>) -> Result<McdReturn, CodecError> {
        Ok(McdReturn::from(cursor.read_u32()?))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[test]
    fn exit_frame_has_no_args() {
        let mut buf = Vec::new();
        encode_request_frame(Opcode::Exit, &[], &mut buf).unwrap();
        assert_eq!(buf, vec![1, 0, 0, 0, 2]);
    }

    #[test]
    fn open_server_args_round_trip_through_a_frame() {
        let args = OpenServerArgs {
            system_key: String::new(),
            config_string: "127.0.0.1:1235".to_string(),
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let mut buf = Vec::new();
        encode_request_frame(Opcode::OpenServer, &body, &mut buf).unwrap();
        let mut cursor = Cursor::new(&buf);
        let length = cursor.read_u32().unwrap();
        let uid = cursor.read_u8().unwrap();
        assert_eq!(uid, Opcode::OpenServer as u8);
        assert_eq!(length as usize, body.len() + 1);
    }

    #[test]
    fn body_exceeding_cap_is_rejected_before_sending() {
        let huge = vec![0_u8; MAX_FRAME_LEN];
        let mut buf = Vec::new();
        let err = encode_request_frame(Opcode::SendMsg, &huge, &mut buf).unwrap_err();
        assert!(matches!(err, RequestError::BodyTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[rstest]
    #[case(65535, false)]
    #[case(65536, true)]
    fn reply_length_cap_is_enforced(#[case] declared: u32, #[case] should_fail: bool) {
        assert_eq!(check_reply_length(declared).is_err(), should_fail);
    }

    #[test]
    fn open_server_result_optional_fields_absent_on_error() {
        let mut buf = Vec::new();
        write_u32(&mut buf, u32::from(McdReturn::ActHandleError));
        write_bool(&mut buf, false); // server_uid absent
        write_bool(&mut buf, false); // host absent
        write_bool(&mut buf, false); // config_string absent
        let mut cursor = Cursor::new(&buf);
        let result = OpenServerResult::unmarshal(&mut cursor).unwrap();
        assert_eq!(result.ret, McdReturn::ActHandleError);
        assert!(result.server_uid.is_none());
        assert!(result.host.is_none());
        assert!(result.config_string.is_none());
    }

    #[test]
    fn execute_txlist_zero_count_result_has_no_txlist() {
        let mut buf = Vec::new();
        write_u32(&mut buf, u32::from(McdReturn::ActHandleError));
        write_bool(&mut buf, false);
        let mut cursor = Cursor::new(&buf);
        let result = ExecuteTxlistResult::unmarshal(&mut cursor).unwrap();
        assert!(result.txlist.is_none());
    }

    proptest! {
        /// Any body that fits under the cap produces a frame exactly
        /// `body.len() + 5` bytes long (1 uid byte + 4 length bytes);
        /// anything past it is rejected before a byte is written.
        #[test]
        fn frame_length_tracks_body_length_exactly_at_the_cap(len in 0_usize..=MAX_FRAME_LEN + 16) {
            let body = vec![0_u8; len];
            let mut buf = Vec::new();
            let result = encode_request_frame(Opcode::SendMsg, &body, &mut buf);
            if len <= MAX_FRAME_LEN - 5 {
                result.unwrap();
                prop_assert_eq!(buf.len(), len + 5);
            } else {
                let is_body_too_large = matches!(result, Err(RequestError::BodyTooLarge { .. }));
                prop_assert!(is_body_too_large);
                prop_assert!(buf.is_empty());
            }
        }
    }
}
