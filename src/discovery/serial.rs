//! Serial port discovery through the platform's port registry.
//!
//! POSIX ports are emitted in the path form (`ASRL/dev/ttyUSB0::INSTR`),
//! with a numeric alias for classic `/dev/ttyS{n}` UARTs; Windows COM
//! ports map directly to `ASRL{n}::INSTR`.

pub(crate) fn discover(out: &mut Vec<String>) {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(err) => {
            log::debug!("serial enumeration unavailable: {}", err);
            return;
        }
    };

    for port in ports {
        let name = port.port_name;
        if let Some(n) = name.strip_prefix("COM").and_then(|s| s.parse::<u32>().ok()) {
            out.push(format!("ASRL{}::INSTR", n));
            continue;
        }

        out.push(format!("ASRL{}::INSTR", name));
        // /dev/ttyS{n} has a conventional numeric address of n+1.
        if let Some(n) = name.strip_prefix("/dev/ttyS").and_then(|s| s.parse::<u32>().ok()) {
            out.push(format!("ASRL{}::INSTR", n + 1));
        }
    }
}
