//! Process-wide session registry and the operation layer the C ABI shim
//! calls into.
//!
//! One mutex guards the handle tables; transport I/O always happens with
//! that mutex released, so sessions block each other only on the brief
//! table lookups. Each session's transport sits behind its own mutex,
//! serializing callers that share a handle.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use crate::discovery;
use crate::error::{Error, ReadStatus, Result};
use crate::resource::{parse_resource, ResourceDescriptor, ResourceKind};
use crate::transport::{self, SerialParams, Transport};

const MAX_SESSIONS: usize = 256;
const MAX_FIND_LISTS: usize = 32;

/// Default `VI_ATTR_TMO_VALUE` in milliseconds.
const DEFAULT_TIMEOUT_MS: u32 = 2000;
/// `open` with a zero timeout gets this bound instead.
const DEFAULT_OPEN_TIMEOUT_MS: u32 = 5000;

/// Handle to a session or find list. Handles are never reused: the
/// allocator is a monotonic counter scanned against the live tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

/// Session attributes settable through `set_attribute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// `VI_ATTR_TMO_VALUE`: I/O timeout in milliseconds.
    TimeoutValue,
    /// `VI_ATTR_TERMCHAR`
    TermChar,
    /// `VI_ATTR_TERMCHAR_EN`
    TermCharEnabled,
    /// `VI_ATTR_SEND_END_EN`
    SendEndEnabled,
    /// `VI_ATTR_RSRC_NAME` (read-only)
    ResourceName,
    /// `VI_ATTR_INTF_TYPE` (read-only)
    InterfaceType,
    /// `VI_ATTR_INTF_NUM` (read-only)
    InterfaceNumber,
    /// `VI_ATTR_RSRC_MANF_NAME` (read-only)
    ManufacturerName,
    /// `VI_ATTR_RSRC_IMPL_VERSION` (read-only)
    ImplementationVersion,
    /// `VI_ATTR_ASRL_BAUD`
    AsrlBaud,
    /// `VI_ATTR_ASRL_DATA_BITS`
    AsrlDataBits,
    /// `VI_ATTR_ASRL_STOP_BITS` (tenths: 10, 15, 20)
    AsrlStopBits,
    /// `VI_ATTR_ASRL_PARITY`
    AsrlParity,
    /// `VI_ATTR_ASRL_FLOW_CNTRL`
    AsrlFlowControl,
}

/// Attribute values, typed the way the VISA attribute table types them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Uint(u32),
    Bool(bool),
    Str(String),
}

impl AttrValue {
    fn as_uint(&self) -> Result<u32> {
        match self {
            AttrValue::Uint(v) => Ok(*v),
            _ => Err(Error::UnsupportedAttribute),
        }
    }

    fn as_bool(&self) -> Result<bool> {
        match self {
            AttrValue::Bool(v) => Ok(*v),
            AttrValue::Uint(v) => Ok(*v != 0),
            _ => Err(Error::UnsupportedAttribute),
        }
    }
}

#[derive(Debug, Clone)]
struct Attributes {
    timeout_ms: u32,
    term_char: u8,
    term_char_enabled: bool,
    send_end_enabled: bool,
    serial: SerialParams,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            term_char: b'\n',
            term_char_enabled: false,
            send_end_enabled: true,
            serial: SerialParams::default(),
        }
    }
}

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

struct Session {
    handle: u32,
    is_rm: bool,
    resource: Option<ResourceDescriptor>,
    transport: Option<SharedTransport>,
    attrs: Attributes,
}

struct FindList {
    handle: u32,
    descriptors: Vec<String>,
    cursor: usize,
}

struct State {
    sessions: Vec<Option<Session>>,
    find_lists: Vec<Option<FindList>>,
    next_handle: u32,
}

impl State {
    fn new() -> Self {
        Self {
            sessions: (0..MAX_SESSIONS).map(|_| None).collect(),
            find_lists: (0..MAX_FIND_LISTS).map(|_| None).collect(),
            next_handle: 1,
        }
    }

    fn alloc_session(&mut self, is_rm: bool) -> Result<&mut Session> {
        let slot = self
            .sessions
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::Alloc)?;
        let handle = self.next_handle;
        self.next_handle += 1;

        self.sessions[slot] = Some(Session {
            handle,
            is_rm,
            resource: None,
            transport: None,
            attrs: Attributes::default(),
        });
        Ok(self.sessions[slot].as_mut().expect("slot just filled"))
    }

    fn session(&mut self, handle: Handle) -> Result<&mut Session> {
        self.sessions
            .iter_mut()
            .flatten()
            .find(|s| s.handle == handle.0)
            .ok_or(Error::InvalidObject)
    }

    fn alloc_find_list(&mut self, descriptors: Vec<String>) -> Result<&mut FindList> {
        let slot = self
            .find_lists
            .iter()
            .position(|f| f.is_none())
            .ok_or(Error::Alloc)?;
        let handle = self.next_handle;
        self.next_handle += 1;

        self.find_lists[slot] = Some(FindList {
            handle,
            descriptors,
            cursor: 0,
        });
        Ok(self.find_lists[slot].as_mut().expect("slot just filled"))
    }

    fn find_list(&mut self, handle: Handle) -> Result<&mut FindList> {
        self.find_lists
            .iter_mut()
            .flatten()
            .find(|f| f.handle == handle.0)
            .ok_or(Error::InvalidObject)
    }
}

fn state() -> &'static Mutex<State> {
    static STATE: OnceLock<Mutex<State>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(State::new()))
}

fn lock_state() -> std::sync::MutexGuard<'static, State> {
    state().lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_transport(transport: &SharedTransport) -> std::sync::MutexGuard<'_, Box<dyn Transport>> {
    transport.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetch a session's transport and timeout, holding the table lock only
/// for the lookup.
fn session_io(vi: Handle) -> Result<(SharedTransport, Duration)> {
    let mut state = lock_state();
    let session = state.session(vi)?;
    let transport = session.transport.clone().ok_or(Error::InvalidObject)?;
    let timeout = Duration::from_millis(session.attrs.timeout_ms as u64);
    Ok((transport, timeout))
}

/// Open the Resource Manager session. Initializes the process-wide state
/// on first use.
pub fn open_default_rm() -> Result<Handle> {
    let mut state = lock_state();
    let session = state.alloc_session(true)?;
    Ok(Handle(session.handle))
}

/// Open an instrument session under the Resource Manager.
///
/// A zero `open_timeout_ms` selects the 5-second default. The transport
/// handshake runs outside the registry lock.
pub fn open(rm: Handle, resource: &str, open_timeout_ms: u32) -> Result<Handle> {
    {
        let mut state = lock_state();
        let session = state.session(rm)?;
        if !session.is_rm {
            return Err(Error::InvalidObject);
        }
    }

    let rsrc = parse_resource(resource)?;
    let timeout_ms = if open_timeout_ms == 0 {
        DEFAULT_OPEN_TIMEOUT_MS
    } else {
        open_timeout_ms
    };

    let mut transport = transport::create(&rsrc);
    transport.open(&rsrc, Duration::from_millis(timeout_ms as u64))?;

    {
        let mut state = lock_state();
        if let Ok(session) = state.alloc_session(false) {
            session.resource = Some(rsrc);
            session.transport = Some(Arc::new(Mutex::new(transport)));
            return Ok(Handle(session.handle));
        }
    }

    // Table full: tear the fresh connection back down, outside the lock.
    let _ = transport.close();
    Err(Error::Alloc)
}

/// Close a session or find list. For sessions the transport teardown runs
/// after the handle is already gone from the table, so a concurrent
/// operation on the same handle fails with `InvalidObject`.
pub fn close(obj: Handle) -> Result<()> {
    let taken = {
        let mut state = lock_state();
        if let Some(slot) = state
            .sessions
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|s| s.handle == obj.0))
        {
            slot.take().and_then(|s| s.transport)
        } else {
            let slot = state
                .find_lists
                .iter_mut()
                .find(|f| f.as_ref().is_some_and(|f| f.handle == obj.0))
                .ok_or(Error::InvalidObject)?;
            slot.take();
            None
        }
    };

    if let Some(transport) = taken {
        let _ = lock_transport(&transport).close();
    }
    Ok(())
}

/// Read up to `buf.len()` bytes from the device.
pub fn read(vi: Handle, buf: &mut [u8]) -> Result<(usize, ReadStatus)> {
    let (transport, timeout) = session_io(vi)?;
    let result = lock_transport(&transport).read(buf, timeout);
    result
}

/// Write all of `data` to the device.
pub fn write(vi: Handle, data: &[u8]) -> Result<usize> {
    let (transport, _) = session_io(vi)?;
    let result = lock_transport(&transport).write(data);
    result
}

/// Serial poll: read the device's status byte.
pub fn read_stb(vi: Handle) -> Result<u8> {
    let (transport, _) = session_io(vi)?;
    let result = lock_transport(&transport).read_stb();
    result
}

/// Device clear.
pub fn clear(vi: Handle) -> Result<()> {
    let (transport, _) = session_io(vi)?;
    let result = lock_transport(&transport).clear();
    result
}

pub fn get_attribute(vi: Handle, attr: Attribute) -> Result<AttrValue> {
    let mut state = lock_state();
    let session = state.session(vi)?;

    let value = match attr {
        Attribute::TimeoutValue => AttrValue::Uint(session.attrs.timeout_ms),
        Attribute::TermChar => AttrValue::Uint(session.attrs.term_char as u32),
        Attribute::TermCharEnabled => AttrValue::Bool(session.attrs.term_char_enabled),
        Attribute::SendEndEnabled => AttrValue::Bool(session.attrs.send_end_enabled),
        Attribute::ResourceName => AttrValue::Str(
            session
                .resource
                .as_ref()
                .map(|r| r.raw.clone())
                .unwrap_or_default(),
        ),
        Attribute::InterfaceType => {
            let rsrc = session.resource.as_ref().ok_or(Error::UnsupportedAttribute)?;
            AttrValue::Uint(rsrc.interface_type().code() as u32)
        }
        Attribute::InterfaceNumber => {
            let rsrc = session.resource.as_ref().ok_or(Error::UnsupportedAttribute)?;
            AttrValue::Uint(rsrc.board as u32)
        }
        Attribute::ManufacturerName => AttrValue::Str("OpenVISA".to_string()),
        Attribute::ImplementationVersion => AttrValue::Uint(0x0001_0000),
        Attribute::AsrlBaud => AttrValue::Uint(asrl_session(session)?.baud),
        Attribute::AsrlDataBits => AttrValue::Uint(asrl_session(session)?.data_bits as u32),
        Attribute::AsrlStopBits => AttrValue::Uint(asrl_session(session)?.stop_bits as u32),
        Attribute::AsrlParity => AttrValue::Uint(asrl_session(session)?.parity as u32),
        Attribute::AsrlFlowControl => AttrValue::Uint(asrl_session(session)?.flow_control as u32),
    };
    Ok(value)
}

fn asrl_session(session: &Session) -> Result<&SerialParams> {
    match session.resource {
        Some(ResourceDescriptor {
            kind: ResourceKind::Asrl { .. },
            ..
        }) => Ok(&session.attrs.serial),
        _ => Err(Error::UnsupportedAttribute),
    }
}

pub fn set_attribute(vi: Handle, attr: Attribute, value: AttrValue) -> Result<()> {
    // Update the stored attribute under the lock, then push derived state
    // (term char, serial line parameters) to the transport outside it.
    let mut push_term: Option<(SharedTransport, Option<u8>)> = None;
    let mut push_serial: Option<(SharedTransport, SerialParams)> = None;

    {
        let mut state = lock_state();
        let session = state.session(vi)?;

        match attr {
            Attribute::TimeoutValue => session.attrs.timeout_ms = value.as_uint()?,
            Attribute::TermChar => session.attrs.term_char = (value.as_uint()? & 0xFF) as u8,
            Attribute::TermCharEnabled => session.attrs.term_char_enabled = value.as_bool()?,
            Attribute::SendEndEnabled => session.attrs.send_end_enabled = value.as_bool()?,
            Attribute::AsrlBaud
            | Attribute::AsrlDataBits
            | Attribute::AsrlStopBits
            | Attribute::AsrlParity
            | Attribute::AsrlFlowControl => {
                asrl_session(session)?;
                let v = value.as_uint()?;
                let serial = &mut session.attrs.serial;
                match attr {
                    Attribute::AsrlBaud => serial.baud = v,
                    Attribute::AsrlDataBits => serial.data_bits = v as u8,
                    Attribute::AsrlStopBits => serial.stop_bits = v as u8,
                    Attribute::AsrlParity => serial.parity = v as u8,
                    Attribute::AsrlFlowControl => serial.flow_control = v as u8,
                    _ => unreachable!(),
                }
            }
            _ => return Err(Error::UnsupportedAttribute),
        }

        if let Some(transport) = &session.transport {
            match attr {
                Attribute::TermChar | Attribute::TermCharEnabled => {
                    let term = session
                        .attrs
                        .term_char_enabled
                        .then_some(session.attrs.term_char);
                    push_term = Some((transport.clone(), term));
                }
                Attribute::AsrlBaud
                | Attribute::AsrlDataBits
                | Attribute::AsrlStopBits
                | Attribute::AsrlParity
                | Attribute::AsrlFlowControl => {
                    push_serial = Some((transport.clone(), session.attrs.serial));
                }
                _ => {}
            }
        }
    }

    if let Some((transport, term)) = push_term {
        lock_transport(&transport).set_term_char(term)?;
    }
    if let Some((transport, params)) = push_serial {
        lock_transport(&transport).set_serial_params(&params)?;
    }
    Ok(())
}

/// Run discovery and build a find list. Returns the list handle, the
/// match count, and the first descriptor with the cursor advanced past it.
pub fn find_resources(rm: Handle, expr: &str) -> Result<(Handle, u32, String)> {
    {
        let mut state = lock_state();
        let session = state.session(rm)?;
        if !session.is_rm {
            return Err(Error::InvalidObject);
        }
    }

    // Network and device scans run without the registry lock held.
    let descriptors = discovery::discover(expr);
    if descriptors.is_empty() {
        return Err(Error::ResourceNotFound);
    }

    let mut state = lock_state();
    let list = state.alloc_find_list(descriptors)?;
    let first = list.descriptors[0].clone();
    list.cursor = 1;
    Ok((Handle(list.handle), list.descriptors.len() as u32, first))
}

/// Return the next descriptor of a find list.
pub fn find_next(list: Handle) -> Result<String> {
    let mut state = lock_state();
    let list = state.find_list(list)?;
    let desc = list
        .descriptors
        .get(list.cursor)
        .ok_or(Error::ResourceNotFound)?
        .clone();
    list.cursor += 1;
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rm_session_opens_and_closes() {
        let rm = open_default_rm().unwrap();
        close(rm).unwrap();
        assert!(matches!(close(rm), Err(Error::InvalidObject)));
    }

    #[test]
    fn handles_are_unique_while_live() {
        let handles: Vec<_> = (0..16).map(|_| open_default_rm().unwrap()).collect();
        for (i, a) in handles.iter().enumerate() {
            for b in &handles[i + 1..] {
                assert_ne!(a, b);
            }
        }
        for h in handles {
            close(h).unwrap();
        }
    }

    #[test]
    fn handles_are_not_reused_after_close() {
        let first = open_default_rm().unwrap();
        close(first).unwrap();
        let second = open_default_rm().unwrap();
        assert_ne!(first, second);
        close(second).unwrap();
    }

    #[test]
    fn rm_session_has_no_io() {
        let rm = open_default_rm().unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(read(rm, &mut buf), Err(Error::InvalidObject)));
        assert!(matches!(write(rm, b"x"), Err(Error::InvalidObject)));
        assert!(matches!(read_stb(rm), Err(Error::InvalidObject)));
        close(rm).unwrap();
    }

    #[test]
    fn open_requires_rm_session() {
        let rm = open_default_rm().unwrap();
        let bogus = Handle(0xDEAD_BEEF);
        assert!(matches!(
            open(bogus, "ASRL1::INSTR", 0),
            Err(Error::InvalidObject)
        ));
        close(rm).unwrap();
    }

    #[test]
    fn open_rejects_bad_resource_string() {
        let rm = open_default_rm().unwrap();
        assert!(matches!(
            open(rm, "FOOBAR::something", 0),
            Err(Error::InvalidResourceName(_))
        ));
        close(rm).unwrap();
    }

    #[test]
    fn default_attributes() {
        let rm = open_default_rm().unwrap();
        assert_eq!(
            get_attribute(rm, Attribute::TimeoutValue).unwrap(),
            AttrValue::Uint(2000)
        );
        assert_eq!(
            get_attribute(rm, Attribute::TermChar).unwrap(),
            AttrValue::Uint(b'\n' as u32)
        );
        assert_eq!(
            get_attribute(rm, Attribute::TermCharEnabled).unwrap(),
            AttrValue::Bool(false)
        );
        assert_eq!(
            get_attribute(rm, Attribute::SendEndEnabled).unwrap(),
            AttrValue::Bool(true)
        );
        assert_eq!(
            get_attribute(rm, Attribute::ManufacturerName).unwrap(),
            AttrValue::Str("OpenVISA".to_string())
        );
        close(rm).unwrap();
    }

    #[test]
    fn timeout_attribute_round_trips() {
        let rm = open_default_rm().unwrap();
        set_attribute(rm, Attribute::TimeoutValue, AttrValue::Uint(500)).unwrap();
        assert_eq!(
            get_attribute(rm, Attribute::TimeoutValue).unwrap(),
            AttrValue::Uint(500)
        );
        close(rm).unwrap();
    }

    #[test]
    fn serial_attributes_rejected_off_asrl() {
        let rm = open_default_rm().unwrap();
        assert!(matches!(
            get_attribute(rm, Attribute::AsrlBaud),
            Err(Error::UnsupportedAttribute)
        ));
        assert!(matches!(
            set_attribute(rm, Attribute::AsrlBaud, AttrValue::Uint(115200)),
            Err(Error::UnsupportedAttribute)
        ));
        close(rm).unwrap();
    }

    #[test]
    fn find_next_on_bogus_handle() {
        assert!(matches!(
            find_next(Handle(0xF00D_F00D)),
            Err(Error::InvalidObject)
        ));
    }
}
