//! Callback type and behavior categorization.
//!
//! The instrumented runtime tags each record with the libuv callback type that
//! was invoked (`UV_TIMER_CB`, `UV_READ_CB`, ...) or with a synthetic marker
//! (`MARKER_IO_POLL_BEGIN`, ...) delimiting a stage of the event loop.

use crate::utils::config::{ASYNC_CB_TYPES, MARKER_PREFIX};
use std::fmt;

/// Stage of one `uv_run` iteration, as delimited by marker records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoopStage {
    UvRun,
    RunTimers1,
    RunPending,
    RunIdle,
    RunPrepare,
    IoPoll,
    RunCheck,
    RunClosing,
    RunTimers2,
}

impl LoopStage {
    /// Stages inside a `uv_run` iteration, in the order libuv visits them
    pub const INNER: [LoopStage; 8] = [
        LoopStage::RunTimers1,
        LoopStage::RunPending,
        LoopStage::RunIdle,
        LoopStage::RunPrepare,
        LoopStage::IoPoll,
        LoopStage::RunCheck,
        LoopStage::RunClosing,
        LoopStage::RunTimers2,
    ];

    /// Name used in marker types (`MARKER_<name>_BEGIN`)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UvRun => "UV_RUN",
            Self::RunTimers1 => "RUN_TIMERS_1",
            Self::RunPending => "RUN_PENDING",
            Self::RunIdle => "RUN_IDLE",
            Self::RunPrepare => "RUN_PREPARE",
            Self::IoPoll => "IO_POLL",
            Self::RunCheck => "RUN_CHECK",
            Self::RunClosing => "RUN_CLOSING",
            Self::RunTimers2 => "RUN_TIMERS_2",
        }
    }

    /// True for the stages inside a `uv_run` iteration
    pub fn is_inner(self) -> bool {
        self != Self::UvRun
    }

    /// Inner stage libuv enters after `self`, wrapping from the last
    /// stage of one iteration to the first stage of the next
    ///
    /// `None` for [`LoopStage::UvRun`].
    pub fn next_inner(self) -> Option<Self> {
        let position = Self::INNER.iter().position(|&stage| stage == self)?;
        Some(Self::INNER[(position + 1) % Self::INNER.len()])
    }

    /// Whether a callback of `cb_type` may run while the loop is in this stage
    ///
    /// `UV_RUN` itself admits nothing; callbacks always run inside one of
    /// the inner stages.
    pub fn admits(self, cb_type: &CallbackType) -> bool {
        match self {
            Self::UvRun => false,
            Self::RunTimers1 | Self::RunTimers2 => cb_type.is_run_timers(),
            Self::RunPending => cb_type.is_run_pending(),
            Self::RunIdle => cb_type.is_run_idle(),
            Self::RunPrepare => cb_type.is_run_prepare(),
            Self::IoPoll => cb_type.is_io_poll(),
            Self::RunCheck => cb_type.is_run_check(),
            Self::RunClosing => cb_type.is_run_closing(),
        }
    }

    fn from_marker_stage(s: &str) -> Option<Self> {
        Some(match s {
            "UV_RUN" => Self::UvRun,
            "RUN_TIMERS_1" => Self::RunTimers1,
            "RUN_PENDING" => Self::RunPending,
            "RUN_IDLE" => Self::RunIdle,
            "RUN_PREPARE" => Self::RunPrepare,
            "IO_POLL" => Self::IoPoll,
            "RUN_CHECK" => Self::RunCheck,
            "RUN_CLOSING" => Self::RunClosing,
            "RUN_TIMERS_2" => Self::RunTimers2,
            _ => return None,
        })
    }
}

/// Which end of a loop stage a marker sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerBoundary {
    Begin,
    End,
}

/// Type of callback recorded in the trace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallbackType {
    Alloc,
    Read,
    Write,
    Connect,
    Shutdown,
    Connection,
    Close,
    Poll,
    Timer,
    Async,
    Prepare,
    Check,
    Idle,
    Exit,
    Walk,
    FsWork,
    Fs,
    Work,
    AfterWork,
    GetAddrInfoWork,
    GetAddrInfo,
    GetNameInfoWork,
    GetNameInfo,
    FsEvent,
    FsPoll,
    Signal,
    UdpSend,
    UdpRecv,
    Thread,
    // libuv internal wrappers
    InternalIo,
    InternalAsync,
    InternalWorkWork,
    InternalWorkDone,
    // pseudo-callbacks injected by the tracer
    InitialStack,
    ProcessExit,
    Marker {
        stage: LoopStage,
        boundary: MarkerBoundary,
    },
    /// Any tag not listed above, kept verbatim
    Unknown(String),
}

impl std::str::FromStr for CallbackType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "UV_ALLOC_CB" => Self::Alloc,
            "UV_READ_CB" => Self::Read,
            "UV_WRITE_CB" => Self::Write,
            "UV_CONNECT_CB" => Self::Connect,
            "UV_SHUTDOWN_CB" => Self::Shutdown,
            "UV_CONNECTION_CB" => Self::Connection,
            "UV_CLOSE_CB" => Self::Close,
            "UV_POLL_CB" => Self::Poll,
            "UV_TIMER_CB" => Self::Timer,
            "UV_ASYNC_CB" => Self::Async,
            "UV_PREPARE_CB" => Self::Prepare,
            "UV_CHECK_CB" => Self::Check,
            "UV_IDLE_CB" => Self::Idle,
            "UV_EXIT_CB" => Self::Exit,
            "UV_WALK_CB" => Self::Walk,
            "UV_FS_WORK_CB" => Self::FsWork,
            "UV_FS_CB" => Self::Fs,
            "UV_WORK_CB" => Self::Work,
            "UV_AFTER_WORK_CB" => Self::AfterWork,
            "UV_GETADDRINFO_WORK_CB" => Self::GetAddrInfoWork,
            "UV_GETADDRINFO_CB" => Self::GetAddrInfo,
            "UV_GETNAMEINFO_WORK_CB" => Self::GetNameInfoWork,
            "UV_GETNAMEINFO_CB" => Self::GetNameInfo,
            "UV_FS_EVENT_CB" => Self::FsEvent,
            "UV_FS_POLL_CB" => Self::FsPoll,
            "UV_SIGNAL_CB" => Self::Signal,
            "UV_UDP_SEND_CB" => Self::UdpSend,
            "UV_UDP_RECV_CB" => Self::UdpRecv,
            "UV_THREAD_CB" => Self::Thread,
            "UV__IO_CB" => Self::InternalIo,
            "UV__ASYNC_CB" => Self::InternalAsync,
            "UV__WORK_WORK" => Self::InternalWorkWork,
            "UV__WORK_DONE" => Self::InternalWorkDone,
            "INITIAL_STACK" => Self::InitialStack,
            "EXIT" => Self::ProcessExit,
            other => parse_marker(other).unwrap_or_else(|| Self::Unknown(other.to_string())),
        })
    }
}

/// Parse `MARKER_<STAGE>_BEGIN` / `MARKER_<STAGE>_END`
fn parse_marker(s: &str) -> Option<CallbackType> {
    let rest = s.strip_prefix(MARKER_PREFIX)?;
    let (stage, boundary) = if let Some(stage) = rest.strip_suffix("_BEGIN") {
        (stage, MarkerBoundary::Begin)
    } else if let Some(stage) = rest.strip_suffix("_END") {
        (stage, MarkerBoundary::End)
    } else {
        return None;
    };
    let stage = LoopStage::from_marker_stage(stage)?;
    Some(CallbackType::Marker { stage, boundary })
}

impl fmt::Display for CallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Alloc => "UV_ALLOC_CB",
            Self::Read => "UV_READ_CB",
            Self::Write => "UV_WRITE_CB",
            Self::Connect => "UV_CONNECT_CB",
            Self::Shutdown => "UV_SHUTDOWN_CB",
            Self::Connection => "UV_CONNECTION_CB",
            Self::Close => "UV_CLOSE_CB",
            Self::Poll => "UV_POLL_CB",
            Self::Timer => "UV_TIMER_CB",
            Self::Async => "UV_ASYNC_CB",
            Self::Prepare => "UV_PREPARE_CB",
            Self::Check => "UV_CHECK_CB",
            Self::Idle => "UV_IDLE_CB",
            Self::Exit => "UV_EXIT_CB",
            Self::Walk => "UV_WALK_CB",
            Self::FsWork => "UV_FS_WORK_CB",
            Self::Fs => "UV_FS_CB",
            Self::Work => "UV_WORK_CB",
            Self::AfterWork => "UV_AFTER_WORK_CB",
            Self::GetAddrInfoWork => "UV_GETADDRINFO_WORK_CB",
            Self::GetAddrInfo => "UV_GETADDRINFO_CB",
            Self::GetNameInfoWork => "UV_GETNAMEINFO_WORK_CB",
            Self::GetNameInfo => "UV_GETNAMEINFO_CB",
            Self::FsEvent => "UV_FS_EVENT_CB",
            Self::FsPoll => "UV_FS_POLL_CB",
            Self::Signal => "UV_SIGNAL_CB",
            Self::UdpSend => "UV_UDP_SEND_CB",
            Self::UdpRecv => "UV_UDP_RECV_CB",
            Self::Thread => "UV_THREAD_CB",
            Self::InternalIo => "UV__IO_CB",
            Self::InternalAsync => "UV__ASYNC_CB",
            Self::InternalWorkWork => "UV__WORK_WORK",
            Self::InternalWorkDone => "UV__WORK_DONE",
            Self::InitialStack => "INITIAL_STACK",
            Self::ProcessExit => "EXIT",
            Self::Marker { stage, boundary } => {
                let suffix = match boundary {
                    MarkerBoundary::Begin => "BEGIN",
                    MarkerBoundary::End => "END",
                };
                return write!(f, "{}{}_{}", MARKER_PREFIX, stage.as_str(), suffix);
            }
            Self::Unknown(s) => s.as_str(),
        };
        f.write_str(name)
    }
}

impl CallbackType {
    /// Synthetic loop-stage marker (any tag with the marker prefix)
    pub fn is_marker(&self) -> bool {
        match self {
            Self::Marker { .. } => true,
            Self::Unknown(s) => s.starts_with(MARKER_PREFIX),
            _ => false,
        }
    }

    /// Runs on a threadpool worker rather than the looper thread
    pub fn is_threadpool(&self) -> bool {
        matches!(
            self,
            Self::InternalWorkWork
                | Self::Work
                | Self::FsWork
                | Self::GetAddrInfoWork
                | Self::GetNameInfoWork
        )
    }

    pub fn is_run_timers(&self) -> bool {
        matches!(self, Self::Timer)
    }

    pub fn is_run_pending(&self) -> bool {
        matches!(self, Self::Write)
    }

    pub fn is_run_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_run_prepare(&self) -> bool {
        matches!(self, Self::Prepare)
    }

    pub fn is_run_check(&self) -> bool {
        matches!(self, Self::Check)
    }

    pub fn is_run_closing(&self) -> bool {
        matches!(self, Self::Close)
    }

    /// Could be invoked while the loop polls for I/O
    ///
    /// This is an explicit list of I/O-driven callback types. It is narrower
    /// than "anything but a marker": timer, check, idle, prepare and close
    /// callbacks, threadpool work and the tracer's pseudo-callbacks are
    /// excluded, as are tags this crate does not recognise.
    pub fn is_io_poll(&self) -> bool {
        matches!(
            self,
            Self::Alloc
                | Self::Read
                | Self::Write
                | Self::Connect
                | Self::Shutdown
                | Self::Connection
                | Self::Poll
                | Self::Async
                | Self::Fs
                | Self::AfterWork
                | Self::GetAddrInfo
                | Self::GetNameInfo
                | Self::FsEvent
                | Self::FsPoll
                | Self::Signal
                | Self::UdpSend
                | Self::UdpRecv
                | Self::Exit
                | Self::InternalIo
                | Self::InternalAsync
                | Self::InternalWorkDone
        )
    }

    /// Member of the async set (movable between loop iterations)
    pub fn is_async(&self) -> bool {
        let name = self.to_string();
        ASYNC_CB_TYPES.contains(&name.as_str())
    }

    /// Stage this marker delimits, if it is a recognised marker
    pub fn loop_stage(&self) -> Option<LoopStage> {
        match self {
            Self::Marker { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_begin_marker(&self) -> bool {
        matches!(
            self,
            Self::Marker {
                boundary: MarkerBoundary::Begin,
                ..
            }
        )
    }

    pub fn is_end_marker(&self) -> bool {
        matches!(
            self,
            Self::Marker {
                boundary: MarkerBoundary::End,
                ..
            }
        )
    }
}

/// Whether a callback is a one-shot action or a repeatable response
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallbackBehavior {
    Action,
    Response,
    Unknown,
    /// Tag not produced by current runtimes, kept verbatim
    Other(String),
}

impl std::str::FromStr for CallbackBehavior {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ACTION" => Self::Action,
            "RESPONSE" => Self::Response,
            "UNKNOWN" => Self::Unknown,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for CallbackBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => f.write_str("ACTION"),
            Self::Response => f.write_str("RESPONSE"),
            Self::Unknown => f.write_str("UNKNOWN"),
            Self::Other(s) => f.write_str(s),
        }
    }
}
