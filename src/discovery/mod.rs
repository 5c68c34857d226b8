//! Resource discovery behind `find_resources`: mDNS for LAN instruments,
//! USB enumeration for USBTMC devices, and a serial port scan, with a
//! VISA glob filter over the emitted resource strings.

pub(crate) mod mdns;

#[cfg(feature = "serial")]
pub(crate) mod serial;
#[cfg(feature = "usb")]
pub(crate) mod usb;

/// A find list holds at most this many descriptors.
pub(crate) const MAX_RESULTS: usize = 128;

/// Case-insensitive wildcard match supporting `*` and `?`.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();

    let mut p = 0;
    let mut t = 0;
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p].eq_ignore_ascii_case(&text[t])) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Let the last `*` swallow one more character and retry.
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Whether a search expression can possibly select resources of the given
/// interface class. Any wildcard makes every class a candidate; the final
/// glob filter sorts it out.
fn class_wanted(expr: &str, prefix: &str) -> bool {
    if expr.contains('*') || expr.contains('?') {
        return true;
    }
    expr.len() >= prefix.len() && expr[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Run every applicable discovery strategy and return the filtered,
/// de-duplicated descriptor list in insertion order.
pub(crate) fn discover(expr: &str) -> Vec<String> {
    let expr = if expr.is_empty() { "?*" } else { expr };

    let mut found = Vec::new();
    if class_wanted(expr, "TCPIP") {
        mdns::discover_service("_lxi._tcp.local", false, &mut found);
        mdns::discover_service("_hislip._tcp.local", true, &mut found);
    }
    #[cfg(feature = "usb")]
    if class_wanted(expr, "USB") {
        usb::discover(&mut found);
    }
    #[cfg(feature = "serial")]
    if class_wanted(expr, "ASRL") {
        serial::discover(&mut found);
    }

    let mut results: Vec<String> = Vec::new();
    for desc in found {
        if glob_match(expr, &desc) && !results.contains(&desc) {
            results.push(desc);
            if results.len() >= MAX_RESULTS {
                break;
            }
        }
    }
    results
}
