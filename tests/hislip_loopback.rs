//! HiSLIP handshake, data, status and device-clear sequences against a
//! loopback mock server driving both channels.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use openvisa::hislip::HislipTransport;
use openvisa::resource::{ResourceDescriptor, ResourceKind};
use openvisa::transport::Transport;
use openvisa::ReadStatus;

fn read_msg(stream: &mut TcpStream) -> (u8, u8, u32, Vec<u8>) {
    let mut header = [0u8; 16];
    stream.read_exact(&mut header).unwrap();
    assert_eq!(&header[0..2], b"HS");

    let msg_type = header[2];
    let control = header[3];
    let parameter = u32::from_be_bytes(header[4..8].try_into().unwrap());
    let len = u64::from_be_bytes(header[8..16].try_into().unwrap());

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).unwrap();
    (msg_type, control, parameter, payload)
}

fn write_msg(stream: &mut TcpStream, msg_type: u8, control: u8, parameter: u32, payload: &[u8]) {
    let mut header = [0u8; 16];
    header[0] = b'H';
    header[1] = b'S';
    header[2] = msg_type;
    header[3] = control;
    header[4..8].copy_from_slice(&parameter.to_be_bytes());
    header[8..16].copy_from_slice(&(payload.len() as u64).to_be_bytes());
    stream.write_all(&header).unwrap();
    stream.write_all(payload).unwrap();
}

const SESSION_ID: u32 = 42;

/// Accept both channels and drive the handshake; returns the connected
/// pair so each test can script its own exchange afterwards.
fn accept_and_handshake(listener: &TcpListener) -> (TcpStream, TcpStream) {
    let (mut sync, _) = listener.accept().unwrap();
    let (msg_type, _, parameter, payload) = read_msg(&mut sync);
    assert_eq!(msg_type, 0); // Initialize
    assert_eq!(parameter >> 16, 0x0100); // protocol 1.0, vendor id 0
    assert_eq!(payload, b"hislip0"); // sub-address, no NUL
    write_msg(&mut sync, 1, 0, (0x0100 << 16) | SESSION_ID, &[]);

    let (mut async_ch, _) = listener.accept().unwrap();
    let (msg_type, _, parameter, _) = read_msg(&mut async_ch);
    assert_eq!(msg_type, 17); // AsyncInitialize
    assert_eq!(parameter, SESSION_ID);
    write_msg(&mut async_ch, 18, 0, 0, &[]);

    (sync, async_ch)
}

fn descriptor(port: u16) -> ResourceDescriptor {
    ResourceDescriptor {
        board: 0,
        kind: ResourceKind::Tcpip {
            host: "127.0.0.1".to_string(),
            port,
            device_name: "hislip0".to_string(),
            is_socket: false,
            is_hislip: true,
        },
        raw: "TCPIP::127.0.0.1::hislip0::INSTR".to_string(),
    }
}

/// Message ids observed by the mock: two writes, then a device clear,
/// then one more write.
fn spawn_full_exchange_mock() -> (u16, JoinHandle<(u32, u32, u32)>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut sync, mut async_ch) = accept_and_handshake(&listener);

        // First write, answered with one DataEnd message.
        let (msg_type, _, first_id, payload) = read_msg(&mut sync);
        assert_eq!(msg_type, 7); // DataEnd
        assert_eq!(payload, b"*IDN?\n");
        write_msg(&mut sync, 7, 0, first_id, b"MOCK,1\n");

        // Second write, unanswered.
        let (msg_type, _, second_id, _) = read_msg(&mut sync);
        assert_eq!(msg_type, 7);

        // Status query: the byte travels in the control-code field.
        let (msg_type, _, _, _) = read_msg(&mut async_ch);
        assert_eq!(msg_type, 21); // AsyncStatusQuery
        write_msg(&mut async_ch, 22, 0x42, 0, &[]);

        // Device clear across both channels.
        let (msg_type, _, _, _) = read_msg(&mut async_ch);
        assert_eq!(msg_type, 19); // AsyncDeviceClear
        write_msg(&mut async_ch, 23, 0, 0, &[]);
        write_msg(&mut sync, 8, 0x01, 0, &[]); // DeviceClearComplete, feature flags 0x01
        let (msg_type, control, _, _) = read_msg(&mut sync);
        assert_eq!(msg_type, 9); // DeviceClearAcknowledge
        assert_eq!(control, 0x01); // feature flags echoed back

        // Status query straight after the clear needs no extra handshake.
        let (msg_type, _, _, _) = read_msg(&mut async_ch);
        assert_eq!(msg_type, 21);
        write_msg(&mut async_ch, 22, 0x00, 0, &[]);

        // Write after the clear reveals the reset message id.
        let (msg_type, _, third_id, _) = read_msg(&mut sync);
        assert_eq!(msg_type, 7);

        (first_id, second_id, third_id)
    });

    (port, handle)
}

#[test]
fn hislip_exchange_and_clear() {
    let (port, mock) = spawn_full_exchange_mock();
    let timeout = Duration::from_secs(5);

    let mut transport = HislipTransport::new();
    transport.open(&descriptor(port), timeout).unwrap();

    assert_eq!(transport.write(b"*IDN?\n").unwrap(), 6);
    let mut buf = [0u8; 64];
    let (n, status) = transport.read(&mut buf, timeout).unwrap();
    assert_eq!(&buf[..n], b"MOCK,1\n");
    assert_eq!(status, ReadStatus::TermChar);

    assert_eq!(transport.write(b"SECOND\n").unwrap(), 7);
    assert_eq!(transport.read_stb().unwrap(), 0x42);
    transport.clear().unwrap();
    // The status path stays usable right after a device clear.
    assert_eq!(transport.read_stb().unwrap(), 0x00);
    assert_eq!(transport.write(b"AFTER\n").unwrap(), 6);
    transport.close().unwrap();

    let (first_id, second_id, third_id) = mock.join().unwrap();
    // Client message ids start at 0, advance by 2 per write, and reset on
    // device clear.
    assert_eq!(first_id, 2);
    assert_eq!(second_id, 4);
    assert_eq!(third_id, 2);
}

/// A response larger than the caller's buffer is truncated and flagged.
#[test]
fn hislip_read_truncates_at_buffer() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mock = thread::spawn(move || {
        let (mut sync, _async_ch) = accept_and_handshake(&listener);
        let (msg_type, _, message_id, _) = read_msg(&mut sync);
        assert_eq!(msg_type, 7);
        write_msg(&mut sync, 7, 0, message_id, b"0123456789ABCDEF");
    });

    let mut transport = HislipTransport::new();
    transport
        .open(&descriptor(port), Duration::from_secs(5))
        .unwrap();
    transport.write(b"DATA?\n").unwrap();

    let mut buf = [0u8; 8];
    let (n, status) = transport.read(&mut buf, Duration::from_secs(5)).unwrap();
    assert_eq!(n, 8);
    assert_eq!(&buf, b"01234567");
    assert_eq!(status, ReadStatus::MaxCount);

    transport.close().unwrap();
    mock.join().unwrap();
}
