//! The process-wide error registry (§4.E): one last-error slot, updated by
//! every API entry point, distinguishing purely local errors from a
//! sentinel that defers to the server's own `qry_error_info` reply.

use std::sync::{Mutex, OnceLock, PoisonError};

use crate::codec::value::{ErrorCode, ErrorEvent, ErrorInfo, McdReturn};

/// The value held in the process-wide last-error slot after an API call
/// returns (§4.E).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LastError {
    /// The call succeeded.
    Ok,
    /// The call targeted an RPC or adapter operation this client does not
    /// implement.
    NotImplemented,
    /// The call required an open server connection and none exists.
    ServerNotOpen,
    /// A required input/output pointer was null, or a count-mode
    /// invariant was violated.
    InvalidNullParameter,
    /// A server/core handle did not refer to a live object.
    UnknownServer,
    /// The outgoing args could not be marshalled (e.g. exceeded the frame
    /// cap).
    MarshalError(String),
    /// The incoming result could not be unmarshalled.
    UnmarshalError(String),
    /// A transport-level failure; `events` may carry the power-down bit
    /// for idempotent-teardown handling (§4.D, §7).
    Connection {
        /// Human-readable description.
        message: String,
        /// Event bits accompanying the failure.
        events: ErrorEvent,
    },
    /// A dynamically formatted local error not covered by a static case.
    Custom(ErrorInfo),
    /// The true error lives server-side; the next `qry_error_info` call
    /// must fetch it with an RPC rather than reading this slot directly.
    AskServer,
}

impl LastError {
    /// Converts this value into the `mcd_error_info_st` shape a caller
    /// would read back from `qry_error_info`. Calling this on
    /// [`LastError::AskServer`] is a logic error in the façade (it must
    /// intercept that sentinel and issue the RPC instead), so it degrades
    /// to a generic connection-error description rather than panicking.
    #[must_use]
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            Self::Ok => ErrorInfo::ok(),
            Self::NotImplemented => local(ErrorCode::General, "not implemented"),
            Self::ServerNotOpen => local(ErrorCode::General, "server not open"),
            Self::InvalidNullParameter => local(ErrorCode::Param, "invalid null parameter"),
            Self::UnknownServer => local(ErrorCode::Param, "unknown server"),
            Self::MarshalError(msg) => local(ErrorCode::RpcMarshal, &format!("marshal error: {msg}")),
            Self::UnmarshalError(msg) => {
                local(ErrorCode::RpcUnmarshal, &format!("unmarshal error: {msg}"))
            }
            Self::Connection { message, events } => ErrorInfo {
                return_status: McdReturn::ActHandleError,
                error_code: ErrorCode::Connection,
                error_events: *events,
                error_str: message.clone(),
            },
            Self::Custom(info) => info.clone(),
            Self::AskServer => local(ErrorCode::Connection, "error detail pending server query"),
        }
    }
}

fn local(error_code: ErrorCode, message: &str) -> ErrorInfo {
    ErrorInfo {
        return_status: McdReturn::ActHandleError,
        error_code,
        error_events: ErrorEvent::NONE,
        error_str: message.to_string(),
    }
}

fn slot() -> &'static Mutex<LastError> {
    static SLOT: OnceLock<Mutex<LastError>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(LastError::Ok))
}

/// Updates the process-wide last-error slot. Every façade function calls
/// this exactly once before returning (§4.E, §4.H).
pub fn set(error: LastError) {
    let mut guard = slot().lock().unwrap_or_else(PoisonError::into_inner);
    *guard = error;
}

/// Reads the current value of the last-error slot.
#[must_use]
pub fn current() -> LastError {
    let guard = slot().lock().unwrap_or_else(PoisonError::into_inner);
    guard.clone()
}

/// Implements `qry_error_info`'s dispatch rule (§4.E): if the slot is not
/// [`LastError::AskServer`], returns the local record directly; otherwise
/// calls `fetch` (an RPC round-trip against the server, optionally scoped
/// to a core) and returns its result without mutating the slot.
///
/// # Errors
/// Propagates whatever `fetch` returns when the sentinel is set.
pub fn query_error_info<E>(
    fetch: impl FnOnce() -> Result<ErrorInfo, E>,
) -> Result<ErrorInfo, E> {
    if matches!(current(), LastError::AskServer) {
        fetch()
    } else {
        Ok(current().to_error_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_round_trips_to_ok_error_info() {
        set(LastError::Ok);
        assert_eq!(current().to_error_info(), ErrorInfo::ok());
    }

    #[test]
    fn ask_server_defers_to_the_fetch_closure() {
        set(LastError::AskServer);
        let fetched = ErrorInfo {
            return_status: McdReturn::ActHandleError,
            error_code: ErrorCode::General,
            error_events: ErrorEvent::NONE,
            error_str: "from server".to_string(),
        };
        let result: Result<ErrorInfo, ()> = query_error_info(|| Ok(fetched.clone()));
        assert_eq!(result.unwrap(), fetched);
    }

    #[test]
    fn non_sentinel_value_is_returned_without_calling_fetch() {
        set(LastError::ServerNotOpen);
        let result: Result<ErrorInfo, ()> =
            query_error_info(|| panic!("fetch must not be called"));
        assert_eq!(result.unwrap().error_str, "server not open");
    }

    #[test]
    fn connection_error_carries_power_down_event() {
        set(LastError::Connection {
            message: "peer closed".to_string(),
            events: ErrorEvent::PWRDN,
        });
        let info = current().to_error_info();
        assert!(info.error_events.contains(ErrorEvent::PWRDN));
    }
}
