//! VISA resource string parsing.
//!
//! Grammar (keywords are case-insensitive, an optional board index may be
//! glued to the interface keyword):
//!
//! ```text
//! TCPIP[board]::host[::device_name][::INSTR]
//! TCPIP[board]::host::port::SOCKET
//! TCPIP[board]::host::hislip0[::INSTR]
//! USB[board]::vid::pid::serial[::interface]::INSTR
//! ASRL<port>[::INSTR]
//! GPIB[board]::primary[::secondary]::INSTR
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Default LAN device name for VXI-11 instruments.
pub const DEFAULT_LAN_DEVICE: &str = "inst0";
/// Portmapper port, the first hop of a VXI-11 connection.
pub const VXI11_DEFAULT_PORT: u16 = 111;
/// IANA-assigned HiSLIP port.
pub const HISLIP_DEFAULT_PORT: u16 = 4880;
/// Conventional SCPI raw-socket port.
pub const SOCKET_DEFAULT_PORT: u16 = 5025;

/// Interface class of a parsed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Tcpip,
    Usb,
    Asrl,
    Gpib,
}

impl InterfaceType {
    /// Numeric `VI_INTF_*` code for the attribute interface.
    pub fn code(&self) -> u16 {
        match self {
            InterfaceType::Gpib => 1,
            InterfaceType::Asrl => 4,
            InterfaceType::Tcpip => 6,
            InterfaceType::Usb => 7,
        }
    }
}

/// Serial port addressing: `ASRL3::INSTR` or the POSIX path form
/// `ASRL/dev/ttyUSB0::INSTR` emitted by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsrlAddress {
    Index(u32),
    Path(String),
}

/// Interface-specific part of a parsed resource string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Tcpip {
        host: String,
        /// 0 means "use the protocol default".
        port: u16,
        device_name: String,
        is_socket: bool,
        is_hislip: bool,
    },
    Usb {
        vid: u16,
        pid: u16,
        /// Empty string matches any serial number.
        serial: String,
        interface: Option<u16>,
    },
    Asrl {
        address: AsrlAddress,
    },
    Gpib {
        primary: u16,
        secondary: Option<u16>,
    },
}

/// A fully parsed resource string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub board: u16,
    pub kind: ResourceKind,
    /// The original string, preserved for `VI_ATTR_RSRC_NAME`.
    pub raw: String,
}

impl ResourceDescriptor {
    pub fn interface_type(&self) -> InterfaceType {
        match self.kind {
            ResourceKind::Tcpip { .. } => InterfaceType::Tcpip,
            ResourceKind::Usb { .. } => InterfaceType::Usb,
            ResourceKind::Asrl { .. } => InterfaceType::Asrl,
            ResourceKind::Gpib { .. } => InterfaceType::Gpib,
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    /// Canonical form of the descriptor. Re-parsing the output yields an
    /// equal descriptor (modulo the preserved `raw` string).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ResourceKind::Tcpip {
                host,
                port,
                device_name,
                is_socket,
                ..
            } => {
                if *is_socket {
                    write!(f, "TCPIP{}::{}::{}::SOCKET", self.board, host, port)
                } else {
                    write!(f, "TCPIP{}::{}::{}::INSTR", self.board, host, device_name)
                }
            }
            ResourceKind::Usb {
                vid,
                pid,
                serial,
                interface,
            } => {
                write!(f, "USB{}::0x{:04X}::0x{:04X}::{}", self.board, vid, pid, serial)?;
                if let Some(intf) = interface {
                    write!(f, "::{}", intf)?;
                }
                write!(f, "::INSTR")
            }
            ResourceKind::Asrl { address } => match address {
                AsrlAddress::Index(n) => write!(f, "ASRL{}::INSTR", n),
                AsrlAddress::Path(p) => write!(f, "ASRL{}::INSTR", p),
            },
            ResourceKind::Gpib { primary, secondary } => {
                write!(f, "GPIB{}::{}", self.board, primary)?;
                if let Some(sad) = secondary {
                    write!(f, "::{}", sad)?;
                }
                write!(f, "::INSTR")
            }
        }
    }
}

fn invalid(rsrc: &str) -> Error {
    Error::InvalidResourceName(rsrc.to_string())
}

fn eq_ci(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

fn starts_with_ci(token: &str, prefix: &str) -> bool {
    token.len() >= prefix.len() && token[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Split `ASRL17` into its keyword and the trailing index, defaulting to 0.
fn split_board(token: &str, keyword: &str) -> Option<u16> {
    if !starts_with_ci(token, keyword) {
        return None;
    }
    let rest = &token[keyword.len()..];
    if rest.is_empty() {
        Some(0)
    } else {
        rest.parse().ok()
    }
}

/// `0x`-prefixed hex or plain decimal, as accepted for USB vid/pid fields.
fn parse_u16_auto(field: &str) -> Option<u16> {
    if let Some(hex) = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16).ok()
    } else {
        field.parse().ok()
    }
}

/// Parse a resource string into a descriptor.
pub fn parse_resource(rsrc: &str) -> Result<ResourceDescriptor> {
    let mut tokens = rsrc.split("::");
    let first = tokens.next().ok_or_else(|| invalid(rsrc))?;

    if let Some(board) = split_board(first, "TCPIP") {
        return parse_tcpip(rsrc, board, tokens);
    }
    if let Some(board) = split_board(first, "USB") {
        return parse_usb(rsrc, board, tokens);
    }
    if starts_with_ci(first, "ASRL") {
        return parse_asrl(rsrc, first);
    }
    if let Some(board) = split_board(first, "GPIB") {
        return parse_gpib(rsrc, board, tokens);
    }

    Err(invalid(rsrc))
}

fn parse_tcpip<'a>(
    rsrc: &str,
    board: u16,
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<ResourceDescriptor> {
    let host = tokens.next().filter(|h| !h.is_empty()).ok_or_else(|| invalid(rsrc))?;

    let vxi11 = |device_name: String| ResourceKind::Tcpip {
        host: host.to_string(),
        port: VXI11_DEFAULT_PORT,
        device_name,
        is_socket: false,
        is_hislip: false,
    };

    let kind = match tokens.next() {
        // `TCPIP::host` or `TCPIP::host::INSTR`: default VXI-11 device
        None => vxi11(DEFAULT_LAN_DEVICE.to_string()),
        Some(t) if eq_ci(t, "INSTR") => vxi11(DEFAULT_LAN_DEVICE.to_string()),
        // `TCPIP::host::hislipN[::INSTR]`
        Some(t) if starts_with_ci(t, "hislip") => ResourceKind::Tcpip {
            host: host.to_string(),
            port: HISLIP_DEFAULT_PORT,
            device_name: t.to_string(),
            is_socket: false,
            is_hislip: true,
        },
        // `TCPIP::host::SOCKET` with the port omitted
        Some(t) if eq_ci(t, "SOCKET") => ResourceKind::Tcpip {
            host: host.to_string(),
            port: SOCKET_DEFAULT_PORT,
            device_name: String::new(),
            is_socket: true,
            is_hislip: false,
        },
        Some(field) => match tokens.next() {
            // `TCPIP::host::name[::INSTR]`: a LAN device name
            None => vxi11(field.to_string()),
            Some(t) if eq_ci(t, "INSTR") => vxi11(field.to_string()),
            // `TCPIP::host::port::SOCKET`
            Some(t) if eq_ci(t, "SOCKET") => ResourceKind::Tcpip {
                host: host.to_string(),
                port: field.parse().map_err(|_| invalid(rsrc))?,
                device_name: String::new(),
                is_socket: true,
                is_hislip: false,
            },
            // `TCPIP::host::port::<anything else>`: explicit VXI-11 port
            Some(_) => ResourceKind::Tcpip {
                host: host.to_string(),
                port: field.parse().map_err(|_| invalid(rsrc))?,
                device_name: DEFAULT_LAN_DEVICE.to_string(),
                is_socket: false,
                is_hislip: false,
            },
        },
    };

    Ok(ResourceDescriptor {
        board,
        kind,
        raw: rsrc.to_string(),
    })
}

fn parse_usb<'a>(
    rsrc: &str,
    board: u16,
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<ResourceDescriptor> {
    let vid = tokens
        .next()
        .and_then(parse_u16_auto)
        .ok_or_else(|| invalid(rsrc))?;
    let pid = tokens
        .next()
        .and_then(parse_u16_auto)
        .ok_or_else(|| invalid(rsrc))?;
    let serial = tokens.next().unwrap_or("").to_string();

    // Optional interface number before the closing INSTR.
    let interface = match tokens.next() {
        Some(t) if eq_ci(t, "INSTR") => None,
        Some(t) => Some(t.parse().map_err(|_| invalid(rsrc))?),
        None => None,
    };

    Ok(ResourceDescriptor {
        board,
        kind: ResourceKind::Usb {
            vid,
            pid,
            serial,
            interface,
        },
        raw: rsrc.to_string(),
    })
}

fn parse_asrl(rsrc: &str, first: &str) -> Result<ResourceDescriptor> {
    let rest = &first[4..];
    let address = if rest.starts_with('/') || rest.starts_with('\\') {
        AsrlAddress::Path(rest.to_string())
    } else {
        AsrlAddress::Index(rest.parse().map_err(|_| invalid(rsrc))?)
    };

    Ok(ResourceDescriptor {
        board: 0,
        kind: ResourceKind::Asrl { address },
        raw: rsrc.to_string(),
    })
}

fn parse_gpib<'a>(
    rsrc: &str,
    board: u16,
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<ResourceDescriptor> {
    let primary = tokens
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| invalid(rsrc))?;

    let secondary = match tokens.next() {
        Some(t) if eq_ci(t, "INSTR") => None,
        Some(t) => Some(t.parse().map_err(|_| invalid(rsrc))?),
        None => None,
    };

    Ok(ResourceDescriptor {
        board,
        kind: ResourceKind::Gpib { primary, secondary },
        raw: rsrc.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcpip_socket() {
        let r = parse_resource("TCPIP::192.168.1.50::5025::SOCKET").unwrap();
        assert_eq!(r.board, 0);
        assert_eq!(
            r.kind,
            ResourceKind::Tcpip {
                host: "192.168.1.50".to_string(),
                port: 5025,
                device_name: String::new(),
                is_socket: true,
                is_hislip: false,
            }
        );
    }

    #[test]
    fn tcpip_socket_default_port() {
        let r = parse_resource("TCPIP::10.0.0.1::SOCKET").unwrap();
        match r.kind {
            ResourceKind::Tcpip { port, is_socket, .. } => {
                assert_eq!(port, 5025);
                assert!(is_socket);
            }
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn tcpip_hislip_default() {
        let r = parse_resource("TCPIP::192.168.1.50::hislip0").unwrap();
        match r.kind {
            ResourceKind::Tcpip {
                port,
                device_name,
                is_hislip,
                is_socket,
                ..
            } => {
                assert_eq!(port, 4880);
                assert_eq!(device_name, "hislip0");
                assert!(is_hislip);
                assert!(!is_socket);
            }
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn tcpip_vxi11_default() {
        let r = parse_resource("TCPIP::192.168.1.50::INSTR").unwrap();
        match r.kind {
            ResourceKind::Tcpip {
                port,
                device_name,
                is_hislip,
                is_socket,
                ..
            } => {
                assert_eq!(port, 111);
                assert_eq!(device_name, "inst0");
                assert!(!is_hislip);
                assert!(!is_socket);
            }
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn tcpip_bare_host() {
        let r = parse_resource("TCPIP::scope.local").unwrap();
        match r.kind {
            ResourceKind::Tcpip { host, device_name, port, .. } => {
                assert_eq!(host, "scope.local");
                assert_eq!(device_name, "inst0");
                assert_eq!(port, 111);
            }
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn tcpip_board_number() {
        let r = parse_resource("TCPIP2::1.2.3.4::inst1::INSTR").unwrap();
        assert_eq!(r.board, 2);
        match r.kind {
            ResourceKind::Tcpip { device_name, .. } => assert_eq!(device_name, "inst1"),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn usb_parse() {
        let r = parse_resource("USB::0x1234::0x5678::MY_SERIAL::INSTR").unwrap();
        assert_eq!(
            r.kind,
            ResourceKind::Usb {
                vid: 0x1234,
                pid: 0x5678,
                serial: "MY_SERIAL".to_string(),
                interface: None,
            }
        );
    }

    #[test]
    fn usb_decimal_and_interface() {
        let r = parse_resource("USB0::1689::1034::SN123::0::INSTR").unwrap();
        assert_eq!(
            r.kind,
            ResourceKind::Usb {
                vid: 1689,
                pid: 1034,
                serial: "SN123".to_string(),
                interface: Some(0),
            }
        );
    }

    #[test]
    fn asrl_parse() {
        let r = parse_resource("ASRL3::INSTR").unwrap();
        assert_eq!(
            r.kind,
            ResourceKind::Asrl {
                address: AsrlAddress::Index(3)
            }
        );
    }

    #[test]
    fn asrl_path_form() {
        let r = parse_resource("ASRL/dev/ttyUSB0::INSTR").unwrap();
        assert_eq!(
            r.kind,
            ResourceKind::Asrl {
                address: AsrlAddress::Path("/dev/ttyUSB0".to_string())
            }
        );
    }

    #[test]
    fn gpib_with_secondary() {
        let r = parse_resource("GPIB::1::2::INSTR").unwrap();
        assert_eq!(
            r.kind,
            ResourceKind::Gpib {
                primary: 1,
                secondary: Some(2)
            }
        );
    }

    #[test]
    fn gpib_without_secondary() {
        let r = parse_resource("GPIB0::22::INSTR").unwrap();
        assert_eq!(
            r.kind,
            ResourceKind::Gpib {
                primary: 22,
                secondary: None
            }
        );
    }

    #[test]
    fn unknown_interface_rejected() {
        assert!(matches!(
            parse_resource("FOOBAR::something"),
            Err(Error::InvalidResourceName(_))
        ));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let lower = parse_resource("tcpip::192.168.1.50::hislip0::instr").unwrap();
        let upper = parse_resource("TCPIP::192.168.1.50::hislip0::INSTR").unwrap();
        assert_eq!(lower.kind, upper.kind);

        let lower = parse_resource("usb::0x1234::0x5678::SN::instr").unwrap();
        let upper = parse_resource("USB::0x1234::0x5678::SN::INSTR").unwrap();
        assert_eq!(lower.kind, upper.kind);
    }

    #[test]
    fn canonical_form_round_trips() {
        for rsrc in [
            "TCPIP0::192.168.1.50::inst0::INSTR",
            "TCPIP1::10.0.0.9::5025::SOCKET",
            "TCPIP0::192.168.1.50::hislip0::INSTR",
            "USB0::0x1234::0x5678::SN42::INSTR",
            "USB0::0x1234::0x5678::SN42::1::INSTR",
            "ASRL4::INSTR",
            "GPIB0::22::INSTR",
            "GPIB1::9::5::INSTR",
        ] {
            let parsed = parse_resource(rsrc).unwrap();
            let reparsed = parse_resource(&parsed.to_string()).unwrap();
            assert_eq!(parsed.kind, reparsed.kind, "{}", rsrc);
            assert_eq!(parsed.board, reparsed.board, "{}", rsrc);
        }
    }
}
