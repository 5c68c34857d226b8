//! USBTMC device discovery: enumerate the bus and emit a resource string
//! for every interface of class 0xFE / subclass 0x03.

use rusb::{Context, UsbContext};

use crate::usbtmc::{USBTMC_CLASS_CODE, USBTMC_SUBCLASS_CODE};

pub(crate) fn discover(out: &mut Vec<String>) {
    let devices = match Context::new().and_then(|ctx| ctx.devices()) {
        Ok(devices) => devices,
        Err(err) => {
            log::debug!("usb enumeration unavailable: {}", err);
            return;
        }
    };

    for device in devices.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };

        let mut interface_number = None;
        'configs: for config_index in 0..desc.num_configurations() {
            let Ok(config) = device.config_descriptor(config_index) else {
                continue;
            };
            for interface in config.interfaces() {
                for alt in interface.descriptors() {
                    if alt.class_code() == USBTMC_CLASS_CODE
                        && alt.sub_class_code() == USBTMC_SUBCLASS_CODE
                    {
                        interface_number = Some(alt.interface_number());
                        break 'configs;
                    }
                }
            }
        }
        let Some(interface_number) = interface_number else {
            continue;
        };

        // Serial string requires opening the device; skip it when the
        // device is inaccessible (permissions) and emit an empty field.
        let serial = device
            .open()
            .ok()
            .and_then(|handle| handle.read_serial_number_string_ascii(&desc).ok())
            .unwrap_or_default();

        out.push(format!(
            "USB0::0x{:04X}::0x{:04X}::{}::{}::INSTR",
            desc.vendor_id(),
            desc.product_id(),
            serial,
            interface_number
        ));
    }
}
