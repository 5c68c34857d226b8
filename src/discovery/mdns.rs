//! Minimal mDNS/DNS-SD query and response parsing for the LXI
//! (`_lxi._tcp.local`) and HiSLIP (`_hislip._tcp.local`) service types.
//!
//! One PTR query goes out on the multicast group; responses are collected
//! for a bounded window and PTR/SRV/A records stitched together into
//! resource strings.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use socket2::{Domain, Protocol, Socket, Type};

const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const MDNS_PORT: u16 = 5353;
/// Listen window per service type.
const RESPONSE_WINDOW: Duration = Duration::from_millis(2500);
const MAX_PACKET: usize = 4096;
const MAX_RECORDS: usize = 64;
/// Compression pointers followed per name before giving up; stops
/// malicious pointer loops.
const MAX_POINTER_FOLLOWS: usize = 16;

const TYPE_A: u16 = 1;
const TYPE_PTR: u16 = 12;
const TYPE_SRV: u16 = 33;

#[derive(Debug, Default, Clone)]
struct MdnsRecord {
    /// DNS name this record was collected under (service instance).
    name: String,
    /// SRV target hostname.
    host: String,
    /// Resolved A record.
    ipv4: Option<Ipv4Addr>,
    port: u16,
}

/// Build a PTR question for `service` with standard label encoding.
fn build_query(service: &str) -> Vec<u8> {
    let mut packet = vec![0u8; 12];
    packet[5] = 1; // QDCOUNT = 1

    for label in service.split('.').filter(|l| !l.is_empty()) {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0); // root label

    packet.extend_from_slice(&TYPE_PTR.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
    packet
}

/// Decode a possibly-compressed DNS name starting at `offset`.
/// Returns the name and the offset just past its encoding at the original
/// position.
fn parse_name(packet: &[u8], mut offset: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut next = None;
    let mut follows = 0;

    loop {
        let len = *packet.get(offset)? as usize;
        if len == 0 {
            offset += 1;
            break;
        }
        if len & 0xC0 == 0xC0 {
            // Compression pointer: high two bits set, 14-bit target.
            follows += 1;
            if follows > MAX_POINTER_FOLLOWS {
                return None;
            }
            let low = *packet.get(offset + 1)? as usize;
            if next.is_none() {
                next = Some(offset + 2);
            }
            offset = ((len & 0x3F) << 8) | low;
            continue;
        }

        let label = packet.get(offset + 1..offset + 1 + len)?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&String::from_utf8_lossy(label));
        offset += 1 + len;
    }

    Some((name, next.unwrap_or(offset)))
}

fn find_or_alloc<'a>(records: &'a mut Vec<MdnsRecord>, name: &str) -> Option<&'a mut MdnsRecord> {
    if let Some(i) = records.iter().position(|r| r.name == name) {
        return records.get_mut(i);
    }
    if records.len() >= MAX_RECORDS {
        return None;
    }
    records.push(MdnsRecord {
        name: name.to_string(),
        ..Default::default()
    });
    records.last_mut()
}

/// Walk questions, answers and additionals of one response packet.
fn parse_response(packet: &[u8], records: &mut Vec<MdnsRecord>) {
    if packet.len() < 12 {
        return;
    }
    let qdcount = BigEndian::read_u16(&packet[4..6]);
    let ancount = BigEndian::read_u16(&packet[6..8]);
    let arcount = BigEndian::read_u16(&packet[10..12]);

    let mut pos = 12;

    for _ in 0..qdcount {
        let Some((_, next)) = parse_name(packet, pos) else {
            return;
        };
        pos = next + 4; // QTYPE + QCLASS
        if pos > packet.len() {
            return;
        }
    }

    for _ in 0..u32::from(ancount) + u32::from(arcount) {
        let Some((owner, next)) = parse_name(packet, pos) else {
            return;
        };
        pos = next;
        if pos + 10 > packet.len() {
            return;
        }
        let rtype = BigEndian::read_u16(&packet[pos..pos + 2]);
        let rdlen = BigEndian::read_u16(&packet[pos + 8..pos + 10]) as usize;
        pos += 10;
        if pos + rdlen > packet.len() {
            return;
        }

        match rtype {
            TYPE_PTR => {
                // Service type → instance name; start an entry for it.
                if let Some((instance, _)) = parse_name(packet, pos) {
                    find_or_alloc(records, &instance);
                }
            }
            TYPE_SRV if rdlen >= 7 => {
                // priority(2) weight(2) port(2) target
                let port = BigEndian::read_u16(&packet[pos + 4..pos + 6]);
                if let Some((target, _)) = parse_name(packet, pos + 6) {
                    if let Some(record) = find_or_alloc(records, &owner) {
                        record.port = port;
                        record.host = target;
                    }
                }
            }
            TYPE_A if rdlen == 4 => {
                let ip = Ipv4Addr::new(
                    packet[pos],
                    packet[pos + 1],
                    packet[pos + 2],
                    packet[pos + 3],
                );
                for record in records.iter_mut() {
                    if record.host.eq_ignore_ascii_case(&owner)
                        || record.name.eq_ignore_ascii_case(&owner)
                    {
                        record.ipv4 = Some(ip);
                    }
                }
                if let Some(record) = find_or_alloc(records, &owner) {
                    if record.ipv4.is_none() {
                        record.ipv4 = Some(ip);
                    }
                }
            }
            _ => {}
        }

        pos += rdlen;
    }
}

/// Bind the mDNS listener socket. Needs `socket2` for the reuse flags:
/// port 5353 is commonly also held by a system resolver.
fn open_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, MDNS_PORT)).into())?;

    let socket: UdpSocket = socket.into();
    socket.join_multicast_v4(&MDNS_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_ttl_v4(255)?;
    socket.set_multicast_loop_v4(false)?;
    Ok(socket)
}

/// Query one service type and append the resulting resource strings.
/// Failures (no multicast route, port unavailable) end the scan silently;
/// discovery is best-effort.
pub(crate) fn discover_service(service: &str, hislip: bool, out: &mut Vec<String>) {
    let socket = match open_socket() {
        Ok(socket) => socket,
        Err(err) => {
            log::debug!("mdns socket unavailable: {}", err);
            return;
        }
    };

    let query = build_query(service);
    if let Err(err) = socket.send_to(&query, (MDNS_GROUP, MDNS_PORT)) {
        log::debug!("mdns query send failed: {}", err);
        return;
    }

    let mut records = Vec::new();
    let deadline = Instant::now() + RESPONSE_WINDOW;
    let mut packet = [0u8; MAX_PACKET];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || socket.set_read_timeout(Some(remaining)).is_err() {
            break;
        }
        match socket.recv_from(&mut packet) {
            Ok((len, _)) => parse_response(&packet[..len], &mut records),
            Err(_) => break, // window elapsed
        }
    }

    for record in records {
        let Some(ip) = record.ipv4 else { continue };
        if hislip {
            out.push(format!("TCPIP0::{}::hislip0::INSTR", ip));
        } else {
            out.push(format!("TCPIP0::{}::inst0::INSTR", ip));
            if record.port > 0 {
                out.push(format!("TCPIP0::{}::{}::SOCKET", ip, record.port));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_has_ptr_question() {
        let q = build_query("_lxi._tcp.local");
        assert_eq!(&q[0..2], [0, 0]); // transaction id 0 for mDNS
        assert_eq!(&q[4..6], [0, 1]); // one question
        assert_eq!(q[12], 4);
        assert_eq!(&q[13..17], b"_lxi");
        // QTYPE PTR, QCLASS IN at the tail
        assert_eq!(&q[q.len() - 4..], [0, 12, 0, 1]);
    }

    #[test]
    fn name_without_compression() {
        let mut packet = vec![0u8; 2];
        packet.extend_from_slice(&[4]);
        packet.extend_from_slice(b"host");
        packet.extend_from_slice(&[5]);
        packet.extend_from_slice(b"local");
        packet.push(0);

        let (name, next) = parse_name(&packet, 2).unwrap();
        assert_eq!(name, "host.local");
        assert_eq!(next, packet.len());
    }

    #[test]
    fn name_with_compression_pointer() {
        // "local" at offset 0, then "host" + pointer to it at offset 7.
        let mut packet = Vec::new();
        packet.push(5);
        packet.extend_from_slice(b"local");
        packet.push(0);
        let name_offset = packet.len();
        packet.push(4);
        packet.extend_from_slice(b"host");
        packet.extend_from_slice(&[0xC0, 0x00]);

        let (name, next) = parse_name(&packet, name_offset).unwrap();
        assert_eq!(name, "host.local");
        assert_eq!(next, packet.len());
    }

    #[test]
    fn pointer_loop_is_bounded() {
        // A pointer that points at itself must not hang or recurse forever.
        let packet = [0xC0u8, 0x00];
        assert!(parse_name(&packet, 0).is_none());
    }

    #[test]
    fn srv_and_a_records_combine() {
        // Hand-built response: one SRV answer for "scope._lxi._tcp.local"
        // plus one A additional for "scope.local".
        let mut packet = vec![0u8; 12];
        packet[7] = 1; // ANCOUNT
        packet[11] = 1; // ARCOUNT

        // SRV owner name (uncompressed)
        for label in ["scope", "_lxi", "_tcp", "local"] {
            packet.push(label.len() as u8);
            packet.extend_from_slice(label.as_bytes());
        }
        packet.push(0);
        packet.extend_from_slice(&TYPE_SRV.to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes());
        packet.extend_from_slice(&120u32.to_be_bytes());
        // rdata: prio, weight, port 5025, target "scope.local"
        let target: Vec<u8> = {
            let mut t = Vec::new();
            for label in ["scope", "local"] {
                t.push(label.len() as u8);
                t.extend_from_slice(label.as_bytes());
            }
            t.push(0);
            t
        };
        packet.extend_from_slice(&((6 + target.len()) as u16).to_be_bytes());
        packet.extend_from_slice(&[0, 0, 0, 0]);
        packet.extend_from_slice(&5025u16.to_be_bytes());
        packet.extend_from_slice(&target);

        // A record for scope.local
        packet.extend_from_slice(&target);
        packet.extend_from_slice(&TYPE_A.to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes());
        packet.extend_from_slice(&120u32.to_be_bytes());
        packet.extend_from_slice(&4u16.to_be_bytes());
        packet.extend_from_slice(&[192, 168, 1, 50]);

        let mut records = Vec::new();
        parse_response(&packet, &mut records);

        let record = records
            .iter()
            .find(|r| r.name == "scope._lxi._tcp.local")
            .unwrap();
        assert_eq!(record.port, 5025);
        assert_eq!(record.host, "scope.local");
        assert_eq!(record.ipv4, Some(Ipv4Addr::new(192, 168, 1, 50)));
    }
}
