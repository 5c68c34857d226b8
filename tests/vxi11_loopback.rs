//! VXI-11 round trip against a loopback mock implementing the portmapper
//! GETPORT bootstrap and the core channel procedures.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use openvisa::resource::{ResourceDescriptor, ResourceKind};
use openvisa::transport::Transport;
use openvisa::vxi11::Vxi11Transport;
use openvisa::ReadStatus;

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes(buf[off..off + 4].try_into().unwrap())
}

/// Read one RPC record; the client always sends single last-fragment frames.
fn read_record(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let word = u32::from_be_bytes(header);
    assert_ne!(word & 0x8000_0000, 0, "expected a last-fragment frame");

    let mut payload = vec![0u8; (word & 0x7FFF_FFFF) as usize];
    stream.read_exact(&mut payload).unwrap();
    payload
}

/// Accepted-success reply: xid echo, REPLY, MSG_ACCEPTED, AUTH_NULL verf,
/// ACCEPT_SUCCESS, then the procedure results.
fn write_reply(stream: &mut TcpStream, xid: u32, results: &[u8]) {
    let mut body = Vec::new();
    body.extend_from_slice(&xid.to_be_bytes());
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(results);

    let mark = 0x8000_0000u32 | body.len() as u32;
    stream.write_all(&mark.to_be_bytes()).unwrap();
    stream.write_all(&body).unwrap();
}

fn opaque(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out.resize(out.len() + ((4 - data.len() % 4) % 4), 0);
    out
}

const RESPONSE: &[u8] = b"MOCK,INSTR,1\n";

/// Mock device; returns the `(procedure, xid)` trace of the core channel.
fn spawn_mock_device() -> (u16, JoinHandle<Vec<(u32, u32)>>) {
    let pm_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let pm_port = pm_listener.local_addr().unwrap().port();
    let core_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let core_port = core_listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        // Portmapper: one GETPORT on a transient connection.
        {
            let (mut pm, _) = pm_listener.accept().unwrap();
            let call = read_record(&mut pm);
            assert_eq!(u32_at(&call, 12), 100000); // portmapper program
            assert_eq!(u32_at(&call, 20), 3); // GETPORT
            assert_eq!(u32_at(&call, 40), 0x0607AF); // queried program
            write_reply(&mut pm, u32_at(&call, 0), &(core_port as u32).to_be_bytes());
        }

        let (mut core, _) = core_listener.accept().unwrap();
        let mut trace = Vec::new();
        loop {
            let call = read_record(&mut core);
            let xid = u32_at(&call, 0);
            let proc = u32_at(&call, 20);
            trace.push((proc, xid));

            match proc {
                // create_link: error, lid, abort_port, max_recv_size
                10 => {
                    assert_eq!(u32_at(&call, 8), 2); // rpc version
                    let mut results = Vec::new();
                    results.extend_from_slice(&0u32.to_be_bytes());
                    results.extend_from_slice(&1234u32.to_be_bytes());
                    results.extend_from_slice(&0u32.to_be_bytes());
                    results.extend_from_slice(&1024u32.to_be_bytes());
                    write_reply(&mut core, xid, &results);
                }
                // device_write: check END flag and payload, accept all
                11 => {
                    assert_eq!(u32_at(&call, 40), 1234); // lid
                    assert_eq!(u32_at(&call, 52), 0x08); // END on final chunk
                    let len = u32_at(&call, 56) as usize;
                    assert_eq!(&call[60..60 + len], b"*IDN?\n");

                    let mut results = Vec::new();
                    results.extend_from_slice(&0u32.to_be_bytes());
                    results.extend_from_slice(&(len as u32).to_be_bytes());
                    write_reply(&mut core, xid, &results);
                }
                // device_read: one message ending with END
                12 => {
                    let mut results = Vec::new();
                    results.extend_from_slice(&0u32.to_be_bytes());
                    results.extend_from_slice(&4u32.to_be_bytes()); // reason END
                    results.extend_from_slice(&opaque(RESPONSE));
                    write_reply(&mut core, xid, &results);
                }
                // device_readstb
                13 => {
                    let mut results = Vec::new();
                    results.extend_from_slice(&0u32.to_be_bytes());
                    results.extend_from_slice(&0x42u32.to_be_bytes());
                    write_reply(&mut core, xid, &results);
                }
                // device_clear
                15 => write_reply(&mut core, xid, &0u32.to_be_bytes()),
                // destroy_link
                23 => {
                    write_reply(&mut core, xid, &0u32.to_be_bytes());
                    break;
                }
                other => panic!("unexpected procedure {}", other),
            }
        }
        trace
    });

    (pm_port, handle)
}

fn descriptor(pm_port: u16) -> ResourceDescriptor {
    ResourceDescriptor {
        board: 0,
        kind: ResourceKind::Tcpip {
            host: "127.0.0.1".to_string(),
            port: pm_port,
            device_name: "inst0".to_string(),
            is_socket: false,
            is_hislip: false,
        },
        raw: format!("TCPIP::127.0.0.1::{}::INSTR", pm_port),
    }
}

#[test]
fn vxi11_round_trip() {
    let (pm_port, mock) = spawn_mock_device();
    let timeout = Duration::from_secs(5);

    let mut transport = Vxi11Transport::new();
    transport.open(&descriptor(pm_port), timeout).unwrap();

    assert_eq!(transport.write(b"*IDN?\n").unwrap(), 6);

    let mut buf = [0u8; 256];
    let (n, status) = transport.read(&mut buf, timeout).unwrap();
    assert_eq!(&buf[..n], RESPONSE);
    assert_eq!(status, ReadStatus::TermChar);

    assert_eq!(transport.read_stb().unwrap(), 0x42);
    transport.clear().unwrap();
    transport.close().unwrap();

    let trace = mock.join().unwrap();

    // The core channel saw the operations in order.
    let procs: Vec<u32> = trace.iter().map(|(proc, _)| *proc).collect();
    assert_eq!(procs, [10, 11, 12, 13, 15, 23]);

    // Transaction ids increase strictly across successive calls.
    for pair in trace.windows(2) {
        assert_eq!(pair[1].1, pair[0].1.wrapping_add(1));
    }
}
