//! The API façade (§4.H): the public entry points a caller actually drives,
//! each validating inputs, routing to the core database (§4.F) when the
//! answer is already cached, otherwise building args, round-tripping
//! through the transport (§4.D) via the request/response codec (§4.C), and
//! updating the process-wide error slot (§4.E) before returning.

use std::collections::HashMap;

use thiserror::Error;

use crate::adapter::{AdapterError, TransactionAdapter};
use crate::codec::CodecError;
use crate::codec::primitive::Cursor;
use crate::codec::request::{
    ChlIdArgs, ChlOpenArgs, ChlOpenResult, CoreCountQueryArgs, CoreUidArgs, CountQueryArgs,
    CreateTrigArgs, CreateTrigResult, EnumerateArgs, EnumerateResult, ExecuteCommandArgs,
    ExecuteTxlistArgs, ExecuteTxlistResult, MAX_TRACE_FRAMES_PER_CALL, Opcode,
    OpenCoreArgs, OpenCoreResult, OpenServerArgs, OpenServerResult, QryCoreModesResult,
    QryCtrigsResult, QryCurrentTimeResult, QryDeviceDescriptionResult, QryErrorInfoArgs,
    QryErrorInfoResult, QryInputHandleResult, QryMaxPayloadSizeResult, QryMemBlocksResult,
    QryActiveOverlaysResult, QryRegCompoundArgs, QryRegCompoundResult, QryRstClassInfoArgs,
    QryRstClassInfoResult, QryRstClassesResult, QryServerConfigResult, QryServersArgs,
    QryServersResult, QryStateResult, QryTraceStateResult, QryTracesResult, QryTrigInfoResult,
    QryTrigResult, QryTrigSetArgs, QryTrigSetResult, QryTrigSetStateResult, ReadTraceArgs,
    ReadTraceResult, ReceiveMsgArgs, ReceiveMsgResult, RequestError, RstArgs, RunArgs,
    RunUntilArgs, SendMsgArgs, SetServerConfigArgs, SetTraceStateArgs, StatusResult, StepArgs,
    TraceFrame, TraceIdArgs, TrigIdArgs, UidArgs, check_consumed,
};
use crate::codec::value::{
    ApiVersion, CoreConInfo, CoreStateInfo, ErrorCode, ErrorEvent, ErrorInfo, McdReturn, MemSpace,
    RegisterGroup, RegisterInfo, RstInfo, Trigger, TrigSetState, TrigState, Tx, TxList,
};
use crate::database::{CoreDatabase, DatabaseError, IdentityConverter, ViewConverter};
use crate::error::{self, LastError};
use crate::transport::binary::BinaryTransport;
use crate::transport::{ConfigError, TransportError, parse_config_string};

/// The crate's declared API version; `initialize` accepts only an exact
/// match (§4.H "initialize is purely local").
pub const CLIENT_API_VERSION: ApiVersion = ApiVersion {
    v_api_major: 1,
    v_api_minor: 0,
};

const CLIENT_VENDOR: &str = "mcd-client";

/// Composed façade error (§10 "Error handling"): wraps every layer's own
/// error type plus the handful of purely façade-level failure modes.
#[derive(Debug, Error)]
pub enum McdError {
    /// A transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A wire-codec failure decoding a reply.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A request-framing failure.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// A core-database failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// A transaction-adapter failure.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// A malformed server configuration string.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The server reported a non-OK status with no payload to act on.
    #[error("server reported {0:?} with no payload")]
    ServerReported(McdReturn),
    /// The caller named a core uid this handle never opened.
    #[error("no open core with uid {0}")]
    UnknownCore(u32),
    /// The server violated a protocol invariant this client enforces
    /// locally (e.g. `read_trace` returning more frames than requested).
    #[error("protocol error: {0}")]
    Protocol(String),
    /// `qry_trig` declined to write back a trigger exceeding the caller's
    /// declared maximum size (§4.H).
    #[error("trigger of {declared} bytes exceeds the caller's declared maximum of {max}")]
    TriggerTooLarge {
        /// The trigger's actual marshalled size.
        declared: usize,
        /// The caller's declared maximum.
        max: usize,
    },
}

/// Records a decode failure in the process-wide error slot before handing
/// the error back to the caller (§4.E "set by every API entry point").
fn record_codec_err(e: CodecError) -> McdError {
    error::set(LastError::UnmarshalError(e.to_string()));
    McdError::Codec(e)
}

/// Records a transport failure in the process-wide error slot, setting the
/// power-down event bit when the failure tore down the connection (§4.D,
/// §7 scenario 5), before handing the error back to the caller.
///
/// A body that failed `encode_request_frame`'s own size check surfaces here
/// as [`TransportError::Io`] with [`std::io::ErrorKind::InvalidInput`]
/// (binary.rs's `send_frame`); that is a local marshalling failure, not a
/// connection loss, so it is recorded as [`LastError::MarshalError`]
/// instead.
fn record_transport_err(e: TransportError) -> McdError {
    if let TransportError::Io(io_err) = &e
        && io_err.kind() == std::io::ErrorKind::InvalidInput
    {
        error::set(LastError::MarshalError(e.to_string()));
    } else {
        error::set(LastError::Connection {
            message: e.to_string(),
            events: if e.disconnects() {
                ErrorEvent::PWRDN
            } else {
                ErrorEvent::NONE
            },
        });
    }
    McdError::Transport(e)
}

/// Records a core-database failure in the process-wide error slot before
/// handing the error back to the caller (§4.E "set by every API entry
/// point"); these are purely local lookups, so there is no server round
/// trip to blame and [`LastError::Custom`] is the closest static case.
fn record_database_err(e: DatabaseError) -> McdError {
    let error_code = match &e {
        DatabaseError::RegGroupId(_) => ErrorCode::RegGroupId,
        DatabaseError::Param(_)
        | DatabaseError::UnresolvedMemSpace { .. }
        | DatabaseError::DuplicateMemSpaceId(_)
        | DatabaseError::UnknownMemSpace(_) => ErrorCode::Param,
    };
    error::set(LastError::Custom(ErrorInfo {
        return_status: McdReturn::ActHandleError,
        error_code,
        error_events: ErrorEvent::NONE,
        error_str: e.to_string(),
    }));
    McdError::Database(e)
}

fn decode<T>(
    bytes: &[u8],
    f: impl FnOnce(&mut Cursor<'_>) -> Result<T, CodecError>,
) -> Result<T, McdError> {
    let mut cursor = Cursor::new(bytes);
    let value = f(&mut cursor).map_err(record_codec_err)?;
    #[allow(
        clippy::cast_possible_truncation,
        reason = "bytes originate from a reply already bounded by MAX_FRAME_LEN"
    )]
    let declared = bytes.len() as u32;
    check_consumed(declared, cursor.position()).map_err(record_codec_err)?;
    Ok(value)
}

fn set_from_ret(ret: McdReturn) {
    error::set(if ret == McdReturn::Ok {
        LastError::Ok
    } else {
        LastError::AskServer
    });
}

fn trigger_fits(trigger: &Trigger, max_size: usize) -> bool {
    let mut scratch = Vec::new();
    trigger.marshal(&mut scratch);
    scratch.len() <= max_size
}

/// One open server connection plus the core databases opened under it
/// (§4.F, §5 "Scheduling model": one client owns at most one live server
/// connection at a time per handle).
#[derive(Debug)]
pub struct ServerHandle {
    transport: BinaryTransport,
    server_uid: u32,
    cores: HashMap<u32, CoreDatabase>,
}

impl ServerHandle {
    /// The host this handle is connected to.
    #[must_use]
    pub fn host(&self) -> &str {
        self.transport.host()
    }

    /// `initialize` (§4.H): purely local version negotiation. Returns the
    /// client's own version/vendor info iff `version_req` matches
    /// [`CLIENT_API_VERSION`] exactly.
    #[must_use]
    pub fn initialize(version_req: (u16, u16)) -> (McdReturn, Option<(u16, u16, String)>) {
        let matches = version_req == (CLIENT_API_VERSION.v_api_major, CLIENT_API_VERSION.v_api_minor);
        error::set(if matches {
            LastError::Ok
        } else {
            LastError::NotImplemented
        });
        let ret = if matches {
            McdReturn::Ok
        } else {
            McdReturn::ActHandleError
        };
        let impl_info = matches.then(|| {
            (
                CLIENT_API_VERSION.v_api_major,
                CLIENT_API_VERSION.v_api_minor,
                CLIENT_VENDOR.to_string(),
            )
        });
        (ret, impl_info)
    }

    /// `open-server` (§4.H): parses `<host>:<port>` (defaulting to
    /// `127.0.0.1:1235`), connects, and issues open-server.
    ///
    /// # Errors
    /// Returns [`McdError::Config`] for a malformed configuration string,
    /// or a transport/codec error for a failed connect or round-trip.
    pub async fn open_server(config_string: &str, system_key: &str) -> Result<Self, McdError> {
        let (host, port) = parse_config_string(config_string).map_err(|e| {
            error::set(LastError::Connection {
                message: e.to_string(),
                events: ErrorEvent::NONE,
            });
            McdError::Config(e)
        })?;
        let mut transport = BinaryTransport::new(host, port);
        transport
            .ensure_connected()
            .await
            .map_err(record_transport_err)?;
        let args = OpenServerArgs {
            system_key: system_key.to_string(),
            config_string: config_string.to_string(),
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = transport
            .request(Opcode::OpenServer, &body)
            .await
            .map_err(record_transport_err)?;
        let result: OpenServerResult = decode(&bytes, OpenServerResult::unmarshal)?;
        set_from_ret(result.ret);
        let Some(server_uid) = result.server_uid else {
            return Err(McdError::ServerReported(result.ret));
        };
        Ok(Self {
            transport,
            server_uid,
            cores: HashMap::new(),
        })
    }

    /// `close-server` (§4.H): symmetric with `open_server`.
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn close_server(mut self) -> Result<(), McdError> {
        let args = UidArgs {
            uid: self.server_uid,
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self
            .transport
            .request(Opcode::CloseServer, &body)
            .await
            .map_err(record_transport_err)?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        self.transport.close().await.map_err(record_transport_err)?;
        Ok(())
    }

    /// `exit` (§4.H): sends the no-reply exit opcode and drops the server.
    ///
    /// # Errors
    /// Returns a transport error if the send itself fails.
    pub async fn exit(mut self) -> Result<(), McdError> {
        self.transport.send_exit().await.map_err(record_transport_err)?;
        error::set(LastError::Ok);
        Ok(())
    }

    async fn rpc_bytes(&mut self, opcode: Opcode, body: Vec<u8>) -> Result<Vec<u8>, McdError> {
        self.transport
            .request(opcode, &body)
            .await
            .map_err(record_transport_err)
    }

    /// `qry-servers` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_servers(
        &mut self,
        host: &str,
        running: bool,
        start_index: u32,
        count: u32,
    ) -> Result<QryServersResult, McdError> {
        let args = QryServersArgs {
            host: host.to_string(),
            running,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryServers, body).await?;
        let result: QryServersResult = decode(&bytes, QryServersResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `set-server-config` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn set_server_config(&mut self, config_string: &str) -> Result<McdReturn, McdError> {
        let args = SetServerConfigArgs {
            server_uid: self.server_uid,
            config_string: config_string.to_string(),
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::SetServerConfig, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `qry-server-config` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_server_config(&mut self) -> Result<QryServerConfigResult, McdError> {
        let args = UidArgs {
            uid: self.server_uid,
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryServerConfig, body).await?;
        let result: QryServerConfigResult = decode(&bytes, QryServerConfigResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    async fn enumerate(
        &mut self,
        opcode: Opcode,
        query_info: CoreConInfo,
        start_index: u32,
        count: u32,
    ) -> Result<EnumerateResult, McdError> {
        let args = EnumerateArgs {
            query_info,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(opcode, body).await?;
        let result: EnumerateResult = decode(&bytes, EnumerateResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-systems` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_systems(
        &mut self,
        query_info: CoreConInfo,
        start_index: u32,
        count: u32,
    ) -> Result<EnumerateResult, McdError> {
        self.enumerate(Opcode::QrySystems, query_info, start_index, count)
            .await
    }

    /// `qry-devices` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_devices(
        &mut self,
        query_info: CoreConInfo,
        start_index: u32,
        count: u32,
    ) -> Result<EnumerateResult, McdError> {
        self.enumerate(Opcode::QryDevices, query_info, start_index, count)
            .await
    }

    /// `qry-cores` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_cores(
        &mut self,
        query_info: CoreConInfo,
        start_index: u32,
        count: u32,
    ) -> Result<EnumerateResult, McdError> {
        self.enumerate(Opcode::QryCores, query_info, start_index, count)
            .await
    }

    /// `qry-core-modes` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_core_modes(
        &mut self,
        core_uid: u32,
        start_index: u32,
        count: u32,
    ) -> Result<QryCoreModesResult, McdError> {
        let args = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryCoreModes, body).await?;
        let result: QryCoreModesResult = decode(&bytes, QryCoreModesResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    async fn fetch_mem_spaces_server(&mut self, core_uid: u32) -> Result<Vec<MemSpace>, McdError> {
        let probe = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs {
                start_index: 0,
                count: 0,
            },
        };
        let mut body = Vec::new();
        probe.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryMemSpaces, body).await?;
        let probed: crate::codec::request::QryMemSpacesResult =
            decode(&bytes, crate::codec::request::QryMemSpacesResult::unmarshal)?;
        set_from_ret(probed.ret);
        if probed.num_mem_spaces == 0 {
            return Ok(Vec::new());
        }
        let fetch = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs {
                start_index: 0,
                count: probed.num_mem_spaces,
            },
        };
        let mut body = Vec::new();
        fetch.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryMemSpaces, body).await?;
        let result: crate::codec::request::QryMemSpacesResult =
            decode(&bytes, crate::codec::request::QryMemSpacesResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.mem_spaces)
    }

    async fn fetch_reg_groups_server(
        &mut self,
        core_uid: u32,
    ) -> Result<Vec<RegisterGroup>, McdError> {
        let probe = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs {
                start_index: 0,
                count: 0,
            },
        };
        let mut body = Vec::new();
        probe.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryRegGroups, body).await?;
        let probed: crate::codec::request::QryRegGroupsResult =
            decode(&bytes, crate::codec::request::QryRegGroupsResult::unmarshal)?;
        set_from_ret(probed.ret);
        if probed.num_reg_groups == 0 {
            return Ok(Vec::new());
        }
        let fetch = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs {
                start_index: 0,
                count: probed.num_reg_groups,
            },
        };
        let mut body = Vec::new();
        fetch.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryRegGroups, body).await?;
        let result: crate::codec::request::QryRegGroupsResult =
            decode(&bytes, crate::codec::request::QryRegGroupsResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.reg_groups)
    }

    async fn fetch_reg_map_server(
        &mut self,
        core_uid: u32,
        reg_group_id: u32,
    ) -> Result<Vec<RegisterInfo>, McdError> {
        let probe = crate::codec::request::QryRegMapArgs {
            core_uid,
            reg_group_id,
            query: CountQueryArgs {
                start_index: 0,
                count: 0,
            },
        };
        let mut body = Vec::new();
        probe.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryRegMap, body).await?;
        let probed: crate::codec::request::QryRegMapResult =
            decode(&bytes, crate::codec::request::QryRegMapResult::unmarshal)?;
        set_from_ret(probed.ret);
        if probed.num_regs == 0 {
            return Ok(Vec::new());
        }
        let fetch = crate::codec::request::QryRegMapArgs {
            core_uid,
            reg_group_id,
            query: CountQueryArgs {
                start_index: 0,
                count: probed.num_regs,
            },
        };
        let mut body = Vec::new();
        fetch.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryRegMap, body).await?;
        let result: crate::codec::request::QryRegMapResult =
            decode(&bytes, crate::codec::request::QryRegMapResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.reg_info)
    }

    async fn update_core_database(
        &mut self,
        core_uid: u32,
        converter: &dyn ViewConverter,
    ) -> Result<CoreDatabase, McdError> {
        let mem_spaces = self.fetch_mem_spaces_server(core_uid).await?;
        let reg_groups = self.fetch_reg_groups_server(core_uid).await?;
        let mut reg_groups_with_regs = Vec::with_capacity(reg_groups.len());
        for group in reg_groups {
            let regs = self.fetch_reg_map_server(core_uid, group.reg_group_id).await?;
            reg_groups_with_regs.push((group, regs));
        }
        CoreDatabase::populate(core_uid, mem_spaces, reg_groups_with_regs, converter)
            .map_err(record_database_err)
    }

    /// `open-core` (§4.H): opens the core, then populates its database; a
    /// failure in the latter triggers an automatic `close-core`.
    ///
    /// # Errors
    /// Returns a transport, codec, or database error.
    pub async fn open_core(&mut self, core_con_info: CoreConInfo) -> Result<u32, McdError> {
        let args = OpenCoreArgs { core_con_info };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::OpenCore, body).await?;
        let result: OpenCoreResult = decode(&bytes, OpenCoreResult::unmarshal)?;
        set_from_ret(result.ret);
        let Some(core_uid) = result.core_uid else {
            return Err(McdError::ServerReported(result.ret));
        };
        match self.update_core_database(core_uid, &IdentityConverter).await {
            Ok(database) => {
                self.cores.insert(core_uid, database);
                Ok(core_uid)
            }
            Err(e) => {
                let _ = self.close_core(core_uid).await;
                Err(e)
            }
        }
    }

    /// `close-core` (§4.H): tolerates a connection power-down, treating it
    /// as a successful idempotent teardown.
    ///
    /// # Errors
    /// Returns a transport or codec error other than a disconnect.
    pub async fn close_core(&mut self, core_uid: u32) -> Result<(), McdError> {
        let args = UidArgs { uid: core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        match self.transport.request(Opcode::CloseCore, &body).await {
            Ok(bytes) => {
                let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
                set_from_ret(result.ret);
                self.cores.remove(&core_uid);
                Ok(())
            }
            Err(e) if e.disconnects() => {
                error::set(LastError::Connection {
                    message: e.to_string(),
                    events: ErrorEvent::PWRDN,
                });
                self.cores.remove(&core_uid);
                Ok(())
            }
            Err(e) => Err(record_transport_err(e)),
        }
    }

    /// `qry-mem-spaces` (§4.H): served from the cached client-view core
    /// database rather than a round-trip.
    ///
    /// # Errors
    /// Returns [`McdError::UnknownCore`] if `core_uid` was never opened, or
    /// a database error for an out-of-range request.
    pub fn qry_mem_spaces(
        &self,
        core_uid: u32,
        start_index: u32,
        count: &mut u32,
    ) -> Result<Vec<MemSpace>, McdError> {
        let database = self.cores.get(&core_uid).ok_or_else(|| {
            error::set(LastError::UnknownServer);
            McdError::UnknownCore(core_uid)
        })?;
        let result = database
            .query_mem_spaces(start_index, count)
            .map_err(record_database_err)?;
        error::set(LastError::Ok);
        Ok(result)
    }

    /// `qry-reg-groups` (§4.H): served from the cached core database.
    ///
    /// # Errors
    /// Returns [`McdError::UnknownCore`] or a database error.
    pub fn qry_reg_groups(
        &self,
        core_uid: u32,
        start_index: u32,
        count: &mut u32,
    ) -> Result<Vec<RegisterGroup>, McdError> {
        let database = self.cores.get(&core_uid).ok_or_else(|| {
            error::set(LastError::UnknownServer);
            McdError::UnknownCore(core_uid)
        })?;
        let result = database
            .query_reg_groups(start_index, count)
            .map_err(record_database_err)?;
        error::set(LastError::Ok);
        Ok(result)
    }

    /// `qry-reg-map` (§4.H): served from the cached core database.
    ///
    /// # Errors
    /// Returns [`McdError::UnknownCore`] or a database error.
    pub fn qry_reg_map(
        &self,
        core_uid: u32,
        reg_group_id: u32,
        start_index: u32,
        count: &mut u32,
    ) -> Result<Vec<RegisterInfo>, McdError> {
        let database = self.cores.get(&core_uid).ok_or_else(|| {
            error::set(LastError::UnknownServer);
            McdError::UnknownCore(core_uid)
        })?;
        let result = database
            .query_reg_map(reg_group_id, start_index, count)
            .map_err(record_database_err)?;
        error::set(LastError::Ok);
        Ok(result)
    }

    /// `qry-error-info` (§4.E, §4.H): if the error slot holds the
    /// ask-server sentinel, issues the RPC; otherwise returns the local
    /// record directly.
    ///
    /// # Errors
    /// Returns a transport or codec error if the RPC path is taken.
    pub async fn qry_error_info(&mut self, core_uid: u32) -> Result<ErrorInfo, McdError> {
        if matches!(error::current(), LastError::AskServer) {
            let args = QryErrorInfoArgs { core_uid };
            let mut body = Vec::new();
            args.marshal(&mut body);
            let bytes = self.rpc_bytes(Opcode::QryErrorInfo, body).await?;
            let result: QryErrorInfoResult = decode(&bytes, QryErrorInfoResult::unmarshal)?;
            Ok(result.error_info)
        } else {
            Ok(error::current().to_error_info())
        }
    }

    /// `qry-device-description` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_device_description(
        &mut self,
        core_uid: u32,
    ) -> Result<QryDeviceDescriptionResult, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryDeviceDescription, body).await?;
        let result: QryDeviceDescriptionResult =
            decode(&bytes, QryDeviceDescriptionResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-max-payload-size` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_max_payload_size(
        &mut self,
        core_uid: u32,
    ) -> Result<QryMaxPayloadSizeResult, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryMaxPayloadSize, body).await?;
        let result: QryMaxPayloadSizeResult = decode(&bytes, QryMaxPayloadSizeResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-input-handle` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_input_handle(
        &mut self,
        core_uid: u32,
    ) -> Result<QryInputHandleResult, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryInputHandle, body).await?;
        let result: QryInputHandleResult = decode(&bytes, QryInputHandleResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-mem-blocks` (§4.H): not part of the cached database; always a
    /// round-trip.
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_mem_blocks(
        &mut self,
        core_uid: u32,
        start_index: u32,
        count: u32,
    ) -> Result<QryMemBlocksResult, McdError> {
        let args = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryMemBlocks, body).await?;
        let result: QryMemBlocksResult = decode(&bytes, QryMemBlocksResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-active-overlays` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_active_overlays(
        &mut self,
        core_uid: u32,
        start_index: u32,
        count: u32,
    ) -> Result<QryActiveOverlaysResult, McdError> {
        let args = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryActiveOverlays, body).await?;
        let result: QryActiveOverlaysResult = decode(&bytes, QryActiveOverlaysResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-reg-compound` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_reg_compound(
        &mut self,
        core_uid: u32,
        compound_reg_id: u32,
        start_index: u32,
        count: u32,
    ) -> Result<QryRegCompoundResult, McdError> {
        let args = QryRegCompoundArgs {
            core_uid,
            compound_reg_id,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryRegCompound, body).await?;
        let result: QryRegCompoundResult = decode(&bytes, QryRegCompoundResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-trig-info` (§4.H): the trigger types this core supports.
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_trig_info(
        &mut self,
        core_uid: u32,
        start_index: u32,
        count: u32,
    ) -> Result<QryTrigInfoResult, McdError> {
        let args = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryTrigInfo, body).await?;
        let result: QryTrigInfoResult = decode(&bytes, QryTrigInfoResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-ctrigs` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_ctrigs(
        &mut self,
        core_uid: u32,
        start_index: u32,
        count: u32,
    ) -> Result<QryCtrigsResult, McdError> {
        let args = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryCtrigs, body).await?;
        let result: QryCtrigsResult = decode(&bytes, QryCtrigsResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `create-trig` (§4.H). Unlike the reference implementation, which
    /// deduces the trigger variant from a raw `struct_size` field, this
    /// client's [`Trigger`] is a typed enum the caller already selected;
    /// there is no untyped payload to disambiguate (see DESIGN.md).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn create_trig(
        &mut self,
        core_uid: u32,
        trigger: Trigger,
    ) -> Result<CreateTrigResult, McdError> {
        let args = CreateTrigArgs { core_uid, trigger };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::CreateTrig, body).await?;
        let result: CreateTrigResult = decode(&bytes, CreateTrigResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-trig` (§4.H): refuses to hand back a trigger larger than
    /// `max_trig_size`.
    ///
    /// # Errors
    /// Returns [`McdError::TriggerTooLarge`] if the decoded trigger exceeds
    /// `max_trig_size`, or a transport/codec error.
    pub async fn qry_trig(
        &mut self,
        core_uid: u32,
        trig_id: u32,
        max_trig_size: usize,
    ) -> Result<Option<Trigger>, McdError> {
        let args = TrigIdArgs { core_uid, trig_id };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryTrig, body).await?;
        let result: QryTrigResult = decode(&bytes, QryTrigResult::unmarshal)?;
        set_from_ret(result.ret);
        let Some(trigger) = result.trigger else {
            return Ok(None);
        };
        if !trigger_fits(&trigger, max_trig_size) {
            let mut scratch = Vec::new();
            trigger.marshal(&mut scratch);
            let declared = scratch.len();
            error::set(LastError::Custom(ErrorInfo {
                return_status: McdReturn::ActHandleError,
                error_code: ErrorCode::Param,
                error_events: ErrorEvent::NONE,
                error_str: format!(
                    "trigger of {declared} bytes exceeds the caller's declared maximum of {max_trig_size}"
                ),
            }));
            return Err(McdError::TriggerTooLarge {
                declared,
                max: max_trig_size,
            });
        }
        Ok(Some(trigger))
    }

    /// `remove-trig` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn remove_trig(&mut self, core_uid: u32, trig_id: u32) -> Result<McdReturn, McdError> {
        let args = TrigIdArgs { core_uid, trig_id };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::RemoveTrig, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `qry-trig-state` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_trig_state(
        &mut self,
        core_uid: u32,
        trig_id: u32,
    ) -> Result<Option<TrigState>, McdError> {
        let args = TrigIdArgs { core_uid, trig_id };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryTrigState, body).await?;
        let result: crate::codec::request::QryTrigStateResult =
            decode(&bytes, crate::codec::request::QryTrigStateResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.state)
    }

    /// `activate-trig-set` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn activate_trig_set(&mut self, core_uid: u32) -> Result<McdReturn, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::ActivateTrigSet, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `remove-trig-set` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn remove_trig_set(&mut self, core_uid: u32) -> Result<McdReturn, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::RemoveTrigSet, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `qry-trig-set` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_trig_set(
        &mut self,
        core_uid: u32,
        start_index: u32,
        count: u32,
    ) -> Result<QryTrigSetResult, McdError> {
        let args = QryTrigSetArgs {
            core_uid,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryTrigSet, body).await?;
        let result: QryTrigSetResult = decode(&bytes, QryTrigSetResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-trig-set-state` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_trig_set_state(
        &mut self,
        core_uid: u32,
    ) -> Result<Option<TrigSetState>, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryTrigSetState, body).await?;
        let result: QryTrigSetStateResult = decode(&bytes, QryTrigSetStateResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.state)
    }

    /// `execute-txlist` (§4.G, §4.H): batches transaction-by-transaction
    /// through each transaction's owning adapter. A failed expansion or
    /// collection marks that transaction complete with zero bytes and
    /// continues the batch rather than aborting it.
    ///
    /// # Errors
    /// Returns [`McdError::UnknownCore`], or a transport/codec/database
    /// error from the round-trip itself.
    pub async fn execute_txlist(&mut self, core_uid: u32, txlist: TxList) -> Result<TxList, McdError> {
        if txlist.tx.is_empty() {
            error::set(LastError::Ok);
            return Ok(TxList::default());
        }
        let mut results = Vec::with_capacity(txlist.tx.len());
        for client_tx in &txlist.tx {
            let mem_space_id = client_tx.addr.mem_space_id;
            let server_list = {
                let database = self.cores.get_mut(&core_uid).ok_or_else(|| {
                    error::set(LastError::UnknownServer);
                    McdError::UnknownCore(core_uid)
                })?;
                let adapter = database
                    .adapter_for(mem_space_id)
                    .map_err(record_database_err)?;
                adapter.yield_server_request(client_tx)
            };
            let Ok(server_list) = server_list else {
                results.push(zero_bytes_ok(client_tx));
                continue;
            };
            let args = ExecuteTxlistArgs {
                core_uid,
                txlist: server_list,
            };
            let mut body = Vec::new();
            args.marshal(&mut body);
            let bytes = self.rpc_bytes(Opcode::ExecuteTxlist, body).await?;
            let result: ExecuteTxlistResult = decode(&bytes, ExecuteTxlistResult::unmarshal)?;
            set_from_ret(result.ret);
            let Some(server_response) = result.txlist else {
                results.push(zero_bytes_ok(client_tx));
                continue;
            };
            let database = self.cores.get_mut(&core_uid).ok_or_else(|| {
                error::set(LastError::UnknownServer);
                McdError::UnknownCore(core_uid)
            })?;
            let adapter = database
                .adapter_for(mem_space_id)
                .map_err(record_database_err)?;
            match adapter.collect_client_response(client_tx, server_response) {
                Ok(collected) => results.push(collected),
                Err(_) => results.push(zero_bytes_ok(client_tx)),
            }
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "batches are bounded by the 65 KB frame cap"
        )]
        let num_tx_ok = results.iter().filter(|tx| tx.num_bytes_ok > 0).count() as u32;
        Ok(TxList {
            tx: results,
            num_tx_ok,
        })
    }

    /// `run` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn run(&mut self, core_uid: u32, global: bool) -> Result<McdReturn, McdError> {
        self.run_like(Opcode::Run, core_uid, global).await
    }

    /// `stop` (§4.H). Forwards the caller's own `global` flag, unlike the
    /// reference implementation which always sends `global = true` (§9,
    /// DESIGN.md Open Question resolution).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn stop(&mut self, core_uid: u32, global: bool) -> Result<McdReturn, McdError> {
        self.run_like(Opcode::Stop, core_uid, global).await
    }

    /// `set-global` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn set_global(&mut self, core_uid: u32, global: bool) -> Result<McdReturn, McdError> {
        self.run_like(Opcode::SetGlobal, core_uid, global).await
    }

    async fn run_like(&mut self, opcode: Opcode, core_uid: u32, global: bool) -> Result<McdReturn, McdError> {
        let args = RunArgs { core_uid, global };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(opcode, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `run-until` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn run_until(
        &mut self,
        core_uid: u32,
        global: bool,
        run_until_time: u64,
    ) -> Result<McdReturn, McdError> {
        let args = RunUntilArgs {
            core_uid,
            global,
            run_until_time,
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::RunUntil, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `qry-current-time` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_current_time(&mut self, core_uid: u32) -> Result<Option<u64>, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryCurrentTime, body).await?;
        let result: QryCurrentTimeResult = decode(&bytes, QryCurrentTimeResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.current_time)
    }

    /// `step` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn step(
        &mut self,
        core_uid: u32,
        global: bool,
        step_type: u32,
        n_steps: u32,
    ) -> Result<McdReturn, McdError> {
        let args = StepArgs {
            core_uid,
            global,
            step_type,
            n_steps,
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::Step, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `qry-state` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_state(&mut self, core_uid: u32) -> Result<Option<CoreStateInfo>, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryState, body).await?;
        let result: QryStateResult = decode(&bytes, QryStateResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.state)
    }

    /// `execute-command` (§4.H): vendor-defined command dispatch.
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn execute_command(
        &mut self,
        core_uid: u32,
        command: &str,
    ) -> Result<McdReturn, McdError> {
        let args = ExecuteCommandArgs {
            core_uid,
            command: command.to_string(),
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::ExecuteCommand, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `qry-rst-classes` (§4.H): a bitmask, not an indexed list.
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_rst_classes(&mut self, core_uid: u32) -> Result<u32, McdError> {
        let args = CoreUidArgs { core_uid };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryRstClasses, body).await?;
        let result: QryRstClassesResult = decode(&bytes, QryRstClassesResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.rst_class_vector)
    }

    /// `qry-rst-class-info` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_rst_class_info(
        &mut self,
        core_uid: u32,
        rst_class: u8,
    ) -> Result<Option<RstInfo>, McdError> {
        let args = QryRstClassInfoArgs { core_uid, rst_class };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryRstClassInfo, body).await?;
        let result: QryRstClassInfoResult = decode(&bytes, QryRstClassInfoResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.info)
    }

    /// `rst` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn rst(
        &mut self,
        core_uid: u32,
        rst_class_vector: u32,
        global: bool,
    ) -> Result<McdReturn, McdError> {
        let args = RstArgs {
            core_uid,
            rst_class_vector,
            global,
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::Rst, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `chl-open` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn chl_open(&mut self, core_uid: u32, chl_id: u32) -> Result<Option<u32>, McdError> {
        let args = ChlOpenArgs { core_uid, chl_id };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::ChlOpen, body).await?;
        let result: ChlOpenResult = decode(&bytes, ChlOpenResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.chl_id)
    }

    /// `send-msg` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn send_msg(
        &mut self,
        core_uid: u32,
        chl_id: u32,
        msg: Vec<u8>,
    ) -> Result<McdReturn, McdError> {
        let args = SendMsgArgs {
            core_uid,
            chl_id,
            msg,
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::SendMsg, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `receive-msg` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn receive_msg(
        &mut self,
        core_uid: u32,
        chl_id: u32,
        max_len: u32,
    ) -> Result<Option<Vec<u8>>, McdError> {
        let args = ReceiveMsgArgs {
            core_uid,
            chl_id,
            max_len,
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::ReceiveMsg, body).await?;
        let result: ReceiveMsgResult = decode(&bytes, ReceiveMsgResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.msg)
    }

    /// `chl-reset` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn chl_reset(&mut self, core_uid: u32, chl_id: u32) -> Result<McdReturn, McdError> {
        self.chl_id_call(Opcode::ChlReset, core_uid, chl_id).await
    }

    /// `chl-close` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn chl_close(&mut self, core_uid: u32, chl_id: u32) -> Result<McdReturn, McdError> {
        self.chl_id_call(Opcode::ChlClose, core_uid, chl_id).await
    }

    async fn chl_id_call(&mut self, opcode: Opcode, core_uid: u32, chl_id: u32) -> Result<McdReturn, McdError> {
        let args = ChlIdArgs { core_uid, chl_id };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(opcode, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `qry-traces` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_traces(
        &mut self,
        core_uid: u32,
        start_index: u32,
        count: u32,
    ) -> Result<QryTracesResult, McdError> {
        let args = CoreCountQueryArgs {
            core_uid,
            query: CountQueryArgs { start_index, count },
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryTraces, body).await?;
        let result: QryTracesResult = decode(&bytes, QryTracesResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result)
    }

    /// `qry-trace-state` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn qry_trace_state(
        &mut self,
        core_uid: u32,
        trace_id: u32,
    ) -> Result<Option<bool>, McdError> {
        let args = TraceIdArgs { core_uid, trace_id };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::QryTraceState, body).await?;
        let result: QryTraceStateResult = decode(&bytes, QryTraceStateResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.enabled)
    }

    /// `set-trace-state` (§4.H).
    ///
    /// # Errors
    /// Returns a transport or codec error.
    pub async fn set_trace_state(
        &mut self,
        core_uid: u32,
        trace_id: u32,
        enabled: bool,
    ) -> Result<McdReturn, McdError> {
        let args = SetTraceStateArgs {
            core_uid,
            trace_id,
            enabled,
        };
        let mut body = Vec::new();
        args.marshal(&mut body);
        let bytes = self.rpc_bytes(Opcode::SetTraceState, body).await?;
        let result: StatusResult = decode(&bytes, StatusResult::unmarshal)?;
        set_from_ret(result.ret);
        Ok(result.ret)
    }

    /// `read-trace` (§4.H): chunks the request into batches of at most
    /// [`MAX_TRACE_FRAMES_PER_CALL`] frames, stopping early when the
    /// server reports fewer frames than requested (end of trace).
    ///
    /// # Errors
    /// Returns [`McdError::Protocol`] if the server returns more frames
    /// than requested, or a transport/codec error.
    pub async fn read_trace(
        &mut self,
        core_uid: u32,
        trace_id: u32,
        start_index: u32,
        num_frames: u32,
    ) -> Result<Vec<TraceFrame>, McdError> {
        let mut frames = Vec::new();
        let mut remaining = num_frames;
        let mut index = start_index;
        while remaining > 0 {
            let chunk = remaining.min(MAX_TRACE_FRAMES_PER_CALL);
            let args = ReadTraceArgs {
                core_uid,
                trace_id,
                start_index: index,
                num_frames: chunk,
            };
            let mut body = Vec::new();
            args.marshal(&mut body);
            let bytes = self.rpc_bytes(Opcode::ReadTrace, body).await?;
            let result: ReadTraceResult = decode(&bytes, ReadTraceResult::unmarshal)?;
            set_from_ret(result.ret);
            let Some(batch) = result.frames else {
                break;
            };
            #[allow(
                clippy::cast_possible_truncation,
                reason = "a single call is bounded by MAX_TRACE_FRAMES_PER_CALL"
            )]
            let got = batch.len() as u32;
            if got > chunk {
                let message = format!("server returned {got} frames for a {chunk}-frame request");
                error::set(LastError::Connection {
                    message: message.clone(),
                    events: ErrorEvent::NONE,
                });
                return Err(McdError::Protocol(message));
            }
            let reached_end = got < chunk;
            frames.extend(batch);
            index += got;
            remaining -= got;
            if reached_end {
                break;
            }
        }
        Ok(frames)
    }
}

fn zero_bytes_ok(client_tx: &Tx) -> Tx {
    let mut completed = client_tx.clone();
    completed.num_bytes_ok = 0;
    completed
}

// `ServerInfoEntry` stands in for the codec's `ServerInfo` result-row type;
// re-exported here so downstream callers of `qry_servers` don't have to
// reach into `codec::request` for it.
pub use crate::codec::request::ServerInfo as ServerInfoEntry;

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::codec::value::{AddrSpaceType, Addr, TxAccessOpt, TxAccessType};

    #[test]
    fn initialize_matching_version_succeeds_locally() {
        let (ret, info) = ServerHandle::initialize((1, 0));
        assert_eq!(ret, McdReturn::Ok);
        assert!(info.is_some());
    }

    #[test]
    fn initialize_version_mismatch_is_not_implemented() {
        let (ret, info) = ServerHandle::initialize((9, 9));
        assert_eq!(ret, McdReturn::ActHandleError);
        assert!(info.is_none());
    }

    #[test]
    fn trigger_fits_rejects_oversized_trigger() {
        let trigger = Trigger::TriggerBus;
        let mut scratch = Vec::new();
        trigger.marshal(&mut scratch);
        assert!(trigger_fits(&trigger, scratch.len()));
        assert!(!trigger_fits(&trigger, scratch.len() - 1));
    }

    #[tokio::test]
    async fn execute_txlist_with_no_transactions_returns_immediately() {
        let mut handle = ServerHandle {
            transport: BinaryTransport::new("127.0.0.1".to_string(), 0),
            server_uid: 1,
            cores: HashMap::new(),
        };
        let result = handle.execute_txlist(1, TxList::default()).await.unwrap();
        assert!(result.tx.is_empty());
    }

    #[tokio::test]
    async fn execute_txlist_against_unknown_core_is_an_error() {
        let mut handle = ServerHandle {
            transport: BinaryTransport::new("127.0.0.1".to_string(), 0),
            server_uid: 1,
            cores: HashMap::new(),
        };
        let tx = Tx {
            addr: Addr {
                address: 0,
                mem_space_id: 1,
                addr_space_id: 0,
                addr_space_type: AddrSpaceType::Mem,
            },
            access_type: TxAccessType::Read,
            options: TxAccessOpt::NONE,
            access_width: 4,
            core_mode: 0,
            data: vec![0; 4],
            num_bytes_ok: 0,
        };
        let txlist = TxList {
            tx: vec![tx],
            num_tx_ok: 0,
        };
        let err = handle.execute_txlist(99, txlist).await.unwrap_err();
        assert!(matches!(err, McdError::UnknownCore(99)));
    }

    async fn read_frame(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
        let mut len_buf = [0_u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut body = vec![0_u8; len];
        stream.read_exact(&mut body).await.unwrap();
        body
    }

    async fn write_reply(stream: &mut tokio::net::TcpStream, body: &[u8]) {
        #[allow(clippy::cast_possible_truncation)]
        let len = body.len() as u32;
        stream.write_all(&len.to_le_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();
    }

    #[tokio::test]
    async fn open_server_then_close_server_round_trips_over_real_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let open_request = read_frame(&mut stream).await;
            assert_eq!(open_request[0], Opcode::OpenServer as u8);

            let mut open_reply = Vec::new();
            open_reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
            open_reply.push(1); // server_uid present
            open_reply.extend_from_slice(&7_u32.to_le_bytes());
            open_reply.push(0); // host absent
            open_reply.push(0); // config_string absent
            write_reply(&mut stream, &open_reply).await;

            let close_request = read_frame(&mut stream).await;
            assert_eq!(close_request[0], Opcode::CloseServer as u8);
            let mut close_reply = Vec::new();
            close_reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
            write_reply(&mut stream, &close_reply).await;
        });

        let config = format!("{}:{}", addr.ip(), addr.port());
        let handle = ServerHandle::open_server(&config, "").await.unwrap();
        assert_eq!(handle.server_uid, 7);
        handle.close_server().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_trace_stops_early_when_server_reports_fewer_frames_than_requested() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream).await;
            let mut reply = Vec::new();
            reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
            reply.push(1); // frames present
            reply.extend_from_slice(&2_u32.to_le_bytes()); // two frames
            for addr_value in [0x10_u64, 0x20_u64] {
                reply.extend_from_slice(&addr_value.to_le_bytes());
                reply.extend_from_slice(&0_u32.to_le_bytes()); // empty data
            }
            write_reply(&mut stream, &reply).await;
        });

        let config = format!("{}:{}", addr.ip(), addr.port());
        let mut transport = BinaryTransport::new(addr.ip().to_string(), addr.port());
        transport.ensure_connected().await.unwrap();
        let mut handle = ServerHandle {
            transport,
            server_uid: 1,
            cores: HashMap::new(),
        };
        let frames = handle.read_trace(1, 1, 0, 10).await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].address, 0x10);
        server.await.unwrap();
        let _ = config;
    }

    #[tokio::test]
    async fn mid_session_disconnect_records_a_connection_error_with_power_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let open_request = read_frame(&mut stream).await;
            assert_eq!(open_request[0], Opcode::OpenServer as u8);
            let mut open_reply = Vec::new();
            open_reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
            open_reply.push(1);
            open_reply.extend_from_slice(&7_u32.to_le_bytes());
            open_reply.push(0);
            open_reply.push(0);
            write_reply(&mut stream, &open_reply).await;
            // The peer hangs up before replying to the next request.
            let _ = read_frame(&mut stream).await;
            drop(stream);
        });

        let config = format!("{}:{}", addr.ip(), addr.port());
        let mut handle = ServerHandle::open_server(&config, "").await.unwrap();
        let err = handle.qry_server_config().await.unwrap_err();
        assert!(matches!(
            err,
            McdError::Transport(TransportError::Closed)
        ));
        let info = error::current().to_error_info();
        assert_eq!(info.error_code, ErrorCode::Connection);
        assert!(info.error_events.contains(ErrorEvent::PWRDN));
        server.await.unwrap();
    }
}
