//! Per-type PDU bodies (RFC 2741 Section 6.2).
//!
//! Each body encodes and decodes its payload only; the 20-byte header is
//! handled by [`Pdu`](super::Pdu). Bodies that may carry a non-default
//! context take the header flags on decode and report their flag
//! contribution for encode.

use bytes::Bytes;

use crate::error::Result;
use crate::oid::Oid;
use crate::varbind::VarBind;

use super::wire::{Reader, Writer};
use super::{Flags, SearchRange};

fn read_context(r: &mut Reader<'_>, flags: Flags) -> Result<Option<Bytes>> {
    if flags.contains(Flags::NON_DEFAULT_CONTEXT) {
        Ok(Some(r.read_octet_string()?))
    } else {
        Ok(None)
    }
}

fn write_context(w: &mut Writer, context: &Option<Bytes>) {
    if let Some(ctx) = context {
        w.put_octet_string(ctx);
    }
}

fn context_flags(context: &Option<Bytes>) -> Flags {
    if context.is_some() {
        Flags::NON_DEFAULT_CONTEXT
    } else {
        Flags::empty()
    }
}

fn read_varbinds(r: &mut Reader<'_>) -> Result<Vec<VarBind>> {
    let mut varbinds = Vec::new();
    while !r.is_empty() {
        varbinds.push(VarBind::decode(r)?);
    }
    Ok(varbinds)
}

fn read_ranges(r: &mut Reader<'_>) -> Result<Vec<SearchRange>> {
    let mut ranges = Vec::new();
    while !r.is_empty() {
        ranges.push(SearchRange::decode(r)?);
    }
    Ok(ranges)
}

/// agentx-Open-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPdu {
    /// Session-wide request timeout hint, in seconds.
    pub timeout: u8,
    /// An OID identifying the subagent.
    pub id: Oid,
    /// Human-readable subagent description.
    pub description: Bytes,
}

impl OpenPdu {
    pub fn new(timeout: u8, id: Oid, description: impl Into<Bytes>) -> Self {
        Self {
            timeout,
            id,
            description: description.into(),
        }
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        w.put_u8(self.timeout);
        w.put_raw(&[0u8; 3]); // reserved
        w.put_oid(&self.id, false);
        w.put_octet_string(&self.description);
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let timeout = r.read_u8()?;
        r.read_bytes(3)?; // reserved
        let (id, _) = r.read_oid()?;
        let description = r.read_octet_string()?;
        Ok(Self {
            timeout,
            id,
            description,
        })
    }
}

/// Reason carried in an agentx-Close-PDU (RFC 2741 Section 6.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CloseReason {
    Other = 1,
    ParseError = 2,
    ProtocolError = 3,
    Timeouts = 4,
    Shutdown = 5,
    ByManager = 6,
}

impl CloseReason {
    pub fn from_u8(v: u8) -> Self {
        match v {
            2 => Self::ParseError,
            3 => Self::ProtocolError,
            4 => Self::Timeouts,
            5 => Self::Shutdown,
            6 => Self::ByManager,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other => write!(f, "reasonOther"),
            Self::ParseError => write!(f, "reasonParseError"),
            Self::ProtocolError => write!(f, "reasonProtocolError"),
            Self::Timeouts => write!(f, "reasonTimeouts"),
            Self::Shutdown => write!(f, "reasonShutdown"),
            Self::ByManager => write!(f, "reasonByManager"),
        }
    }
}

/// agentx-Close-PDU body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePdu {
    pub reason: CloseReason,
}

impl ClosePdu {
    pub fn new(reason: CloseReason) -> Self {
        Self { reason }
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        w.put_u8(self.reason as u8);
        w.put_raw(&[0u8; 3]); // reserved
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let reason = CloseReason::from_u8(r.read_u8()?);
        r.read_bytes(3)?;
        Ok(Self { reason })
    }
}

/// agentx-Register-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterPdu {
    pub context: Option<Bytes>,
    /// Per-region request timeout override, in seconds (0 = session default).
    pub timeout: u8,
    pub priority: u8,
    /// When nonzero, the subidentifier at this position ranges from its
    /// value in `subtree` up to `upper_bound`.
    pub range_subid: u8,
    pub subtree: Oid,
    /// Present exactly when `range_subid` is nonzero.
    pub upper_bound: Option<u32>,
    /// INSTANCE_REGISTRATION: `subtree` names a single instance.
    pub instance: bool,
}

impl RegisterPdu {
    pub fn new(subtree: Oid, priority: u8, timeout: u8) -> Self {
        Self {
            context: None,
            timeout,
            priority,
            range_subid: 0,
            subtree,
            upper_bound: None,
            instance: false,
        }
    }

    pub fn with_range(mut self, range_subid: u8, upper_bound: u32) -> Self {
        self.range_subid = range_subid;
        self.upper_bound = Some(upper_bound);
        self
    }

    pub(crate) fn flags(&self) -> Flags {
        let mut flags = context_flags(&self.context);
        if self.instance {
            flags |= Flags::INSTANCE_REGISTRATION;
        }
        flags
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        w.put_u8(self.timeout);
        w.put_u8(self.priority);
        w.put_u8(self.range_subid);
        w.put_u8(0); // reserved
        w.put_oid(&self.subtree, false);
        if self.range_subid != 0 {
            w.put_u32(self.upper_bound.unwrap_or(0));
        }
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let timeout = r.read_u8()?;
        let priority = r.read_u8()?;
        let range_subid = r.read_u8()?;
        r.read_u8()?; // reserved
        let (subtree, _) = r.read_oid()?;
        let upper_bound = if range_subid != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        Ok(Self {
            context,
            timeout,
            priority,
            range_subid,
            subtree,
            upper_bound,
            instance: flags.contains(Flags::INSTANCE_REGISTRATION),
        })
    }
}

/// agentx-Unregister-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnregisterPdu {
    pub context: Option<Bytes>,
    pub priority: u8,
    pub range_subid: u8,
    pub subtree: Oid,
    pub upper_bound: Option<u32>,
}

impl UnregisterPdu {
    pub fn new(subtree: Oid, priority: u8) -> Self {
        Self {
            context: None,
            priority,
            range_subid: 0,
            subtree,
            upper_bound: None,
        }
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        w.put_u8(0); // reserved (no timeout on unregister)
        w.put_u8(self.priority);
        w.put_u8(self.range_subid);
        w.put_u8(0); // reserved
        w.put_oid(&self.subtree, false);
        if self.range_subid != 0 {
            w.put_u32(self.upper_bound.unwrap_or(0));
        }
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        r.read_u8()?; // reserved
        let priority = r.read_u8()?;
        let range_subid = r.read_u8()?;
        r.read_u8()?; // reserved
        let (subtree, _) = r.read_oid()?;
        let upper_bound = if range_subid != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        Ok(Self {
            context,
            priority,
            range_subid,
            subtree,
            upper_bound,
        })
    }
}

/// agentx-Get-PDU / agentx-GetNext-PDU body: a list of search ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPdu {
    pub context: Option<Bytes>,
    pub ranges: Vec<SearchRange>,
}

impl GetPdu {
    pub fn new(ranges: Vec<SearchRange>) -> Self {
        Self {
            context: None,
            ranges,
        }
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        for range in &self.ranges {
            range.encode(w);
        }
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let ranges = read_ranges(r)?;
        Ok(Self { context, ranges })
    }
}

/// agentx-GetBulk-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBulkPdu {
    pub context: Option<Bytes>,
    pub non_repeaters: u16,
    pub max_repetitions: u16,
    pub ranges: Vec<SearchRange>,
}

impl GetBulkPdu {
    pub fn new(non_repeaters: u16, max_repetitions: u16, ranges: Vec<SearchRange>) -> Self {
        Self {
            context: None,
            non_repeaters,
            max_repetitions,
            ranges,
        }
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        w.put_u16(self.non_repeaters);
        w.put_u16(self.max_repetitions);
        for range in &self.ranges {
            range.encode(w);
        }
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let non_repeaters = r.read_u16()?;
        let max_repetitions = r.read_u16()?;
        let ranges = read_ranges(r)?;
        Ok(Self {
            context,
            non_repeaters,
            max_repetitions,
            ranges,
        })
    }
}

/// agentx-TestSet-PDU body: the varbinds of a write transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSetPdu {
    pub context: Option<Bytes>,
    pub varbinds: Vec<VarBind>,
}

impl TestSetPdu {
    pub fn new(varbinds: Vec<VarBind>) -> Self {
        Self {
            context: None,
            varbinds,
        }
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        for vb in &self.varbinds {
            vb.encode(w);
        }
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let varbinds = read_varbinds(r)?;
        Ok(Self { context, varbinds })
    }
}

/// agentx-Notify-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPdu {
    pub context: Option<Bytes>,
    pub varbinds: Vec<VarBind>,
}

impl NotifyPdu {
    pub fn new(varbinds: Vec<VarBind>) -> Self {
        Self {
            context: None,
            varbinds,
        }
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        for vb in &self.varbinds {
            vb.encode(w);
        }
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let varbinds = read_varbinds(r)?;
        Ok(Self { context, varbinds })
    }
}

/// agentx-Ping-PDU body (context only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingPdu {
    pub context: Option<Bytes>,
}

impl PingPdu {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        Ok(Self { context })
    }
}

/// agentx-IndexAllocate-PDU body.
///
/// NEW_INDEX and ANY_INDEX request master-chosen index values; both clear
/// means the varbind values are the requested indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAllocatePdu {
    pub context: Option<Bytes>,
    pub varbinds: Vec<VarBind>,
    pub new_index: bool,
    pub any_index: bool,
}

impl IndexAllocatePdu {
    pub fn new(varbinds: Vec<VarBind>) -> Self {
        Self {
            context: None,
            varbinds,
            new_index: false,
            any_index: false,
        }
    }

    pub(crate) fn flags(&self) -> Flags {
        let mut flags = context_flags(&self.context);
        if self.new_index {
            flags |= Flags::NEW_INDEX;
        }
        if self.any_index {
            flags |= Flags::ANY_INDEX;
        }
        flags
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        for vb in &self.varbinds {
            vb.encode(w);
        }
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let varbinds = read_varbinds(r)?;
        Ok(Self {
            context,
            varbinds,
            new_index: flags.contains(Flags::NEW_INDEX),
            any_index: flags.contains(Flags::ANY_INDEX),
        })
    }
}

/// agentx-IndexDeallocate-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDeallocatePdu {
    pub context: Option<Bytes>,
    pub varbinds: Vec<VarBind>,
}

impl IndexDeallocatePdu {
    pub fn new(varbinds: Vec<VarBind>) -> Self {
        Self {
            context: None,
            varbinds,
        }
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        for vb in &self.varbinds {
            vb.encode(w);
        }
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let varbinds = read_varbinds(r)?;
        Ok(Self { context, varbinds })
    }
}

/// agentx-AddAgentCaps-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddAgentCapsPdu {
    pub context: Option<Bytes>,
    pub id: Oid,
    pub description: Bytes,
}

impl AddAgentCapsPdu {
    pub fn new(id: Oid, description: impl Into<Bytes>) -> Self {
        Self {
            context: None,
            id,
            description: description.into(),
        }
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        w.put_oid(&self.id, false);
        w.put_octet_string(&self.description);
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let (id, _) = r.read_oid()?;
        let description = r.read_octet_string()?;
        Ok(Self {
            context,
            id,
            description,
        })
    }
}

/// agentx-RemoveAgentCaps-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveAgentCapsPdu {
    pub context: Option<Bytes>,
    pub id: Oid,
}

impl RemoveAgentCapsPdu {
    pub fn new(id: Oid) -> Self {
        Self { context: None, id }
    }

    pub(crate) fn flags(&self) -> Flags {
        context_flags(&self.context)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        write_context(w, &self.context);
        w.put_oid(&self.id, false);
    }

    pub(crate) fn decode(r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        let context = read_context(r, flags)?;
        let (id, _) = r.read_oid()?;
        Ok(Self { context, id })
    }
}

/// Response error codes (RFC 2741 Section 6.2.16).
///
/// One code space covers both the SNMPv2 error statuses used for SET
/// processing (RFC 3416) and the AgentX administrative codes (256 and up).
///
/// # Example
///
/// ```
/// use async_agentx::pdu::ResponseError;
///
/// let code = ResponseError::from_u16(263);
/// assert_eq!(code, ResponseError::DuplicateRegistration);
/// assert_eq!(code.as_u16(), 263);
/// assert_eq!(code.to_string(), "duplicateRegistration");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseError {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
    OpenFailed,
    NotOpen,
    IndexWrongType,
    IndexAlreadyAllocated,
    IndexNoneAvailable,
    IndexNotAllocated,
    UnsupportedContext,
    DuplicateRegistration,
    UnknownRegistration,
    UnknownAgentCaps,
    ParseError,
    RequestDenied,
    ProcessingError,
    /// Unrecognized or future code, carried through unchanged.
    Unknown(u16),
}

impl ResponseError {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            6 => Self::NoAccess,
            7 => Self::WrongType,
            8 => Self::WrongLength,
            9 => Self::WrongEncoding,
            10 => Self::WrongValue,
            11 => Self::NoCreation,
            12 => Self::InconsistentValue,
            13 => Self::ResourceUnavailable,
            14 => Self::CommitFailed,
            15 => Self::UndoFailed,
            16 => Self::AuthorizationError,
            17 => Self::NotWritable,
            18 => Self::InconsistentName,
            256 => Self::OpenFailed,
            257 => Self::NotOpen,
            258 => Self::IndexWrongType,
            259 => Self::IndexAlreadyAllocated,
            260 => Self::IndexNoneAvailable,
            261 => Self::IndexNotAllocated,
            262 => Self::UnsupportedContext,
            263 => Self::DuplicateRegistration,
            264 => Self::UnknownRegistration,
            265 => Self::UnknownAgentCaps,
            266 => Self::ParseError,
            267 => Self::RequestDenied,
            268 => Self::ProcessingError,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::NoAccess => 6,
            Self::WrongType => 7,
            Self::WrongLength => 8,
            Self::WrongEncoding => 9,
            Self::WrongValue => 10,
            Self::NoCreation => 11,
            Self::InconsistentValue => 12,
            Self::ResourceUnavailable => 13,
            Self::CommitFailed => 14,
            Self::UndoFailed => 15,
            Self::AuthorizationError => 16,
            Self::NotWritable => 17,
            Self::InconsistentName => 18,
            Self::OpenFailed => 256,
            Self::NotOpen => 257,
            Self::IndexWrongType => 258,
            Self::IndexAlreadyAllocated => 259,
            Self::IndexNoneAvailable => 260,
            Self::IndexNotAllocated => 261,
            Self::UnsupportedContext => 262,
            Self::DuplicateRegistration => 263,
            Self::UnknownRegistration => 264,
            Self::UnknownAgentCaps => 265,
            Self::ParseError => 266,
            Self::RequestDenied => 267,
            Self::ProcessingError => 268,
            Self::Unknown(code) => *code,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::NoError)
    }
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
            Self::NoAccess => write!(f, "noAccess"),
            Self::WrongType => write!(f, "wrongType"),
            Self::WrongLength => write!(f, "wrongLength"),
            Self::WrongEncoding => write!(f, "wrongEncoding"),
            Self::WrongValue => write!(f, "wrongValue"),
            Self::NoCreation => write!(f, "noCreation"),
            Self::InconsistentValue => write!(f, "inconsistentValue"),
            Self::ResourceUnavailable => write!(f, "resourceUnavailable"),
            Self::CommitFailed => write!(f, "commitFailed"),
            Self::UndoFailed => write!(f, "undoFailed"),
            Self::AuthorizationError => write!(f, "authorizationError"),
            Self::NotWritable => write!(f, "notWritable"),
            Self::InconsistentName => write!(f, "inconsistentName"),
            Self::OpenFailed => write!(f, "openFailed"),
            Self::NotOpen => write!(f, "notOpen"),
            Self::IndexWrongType => write!(f, "indexWrongType"),
            Self::IndexAlreadyAllocated => write!(f, "indexAlreadyAllocated"),
            Self::IndexNoneAvailable => write!(f, "indexNoneAvailable"),
            Self::IndexNotAllocated => write!(f, "indexNotAllocated"),
            Self::UnsupportedContext => write!(f, "unsupportedContext"),
            Self::DuplicateRegistration => write!(f, "duplicateRegistration"),
            Self::UnknownRegistration => write!(f, "unknownRegistration"),
            Self::UnknownAgentCaps => write!(f, "unknownAgentCaps"),
            Self::ParseError => write!(f, "parseError"),
            Self::RequestDenied => write!(f, "requestDenied"),
            Self::ProcessingError => write!(f, "processingError"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// agentx-Response-PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePdu {
    /// sysUpTime at the sender, in TimeTicks. Meaningful only in responses
    /// from the master; subagents echo their session uptime.
    pub sys_uptime: u32,
    pub error: ResponseError,
    /// 1-based index of the varbind the error refers to (0 when no error).
    pub index: u16,
    pub varbinds: Vec<VarBind>,
}

impl ResponsePdu {
    pub fn success(sys_uptime: u32, varbinds: Vec<VarBind>) -> Self {
        Self {
            sys_uptime,
            error: ResponseError::NoError,
            index: 0,
            varbinds,
        }
    }

    pub fn error(sys_uptime: u32, error: ResponseError, index: u16) -> Self {
        Self {
            sys_uptime,
            error,
            index,
            varbinds: Vec::new(),
        }
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        w.put_u32(self.sys_uptime);
        w.put_u16(self.error.as_u16());
        w.put_u16(self.index);
        w.put_raw(&super::encode_varbinds(&self.varbinds, w.order()));
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let sys_uptime = r.read_u32()?;
        let error = ResponseError::from_u16(r.read_u16()?);
        let index = r.read_u16()?;
        let varbinds = read_varbinds(r)?;
        Ok(Self {
            sys_uptime,
            error,
            index,
            varbinds,
        })
    }
}
