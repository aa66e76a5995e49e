use crate::error::PortParseError;

/// Well-known ports scanned when no specification is given.
pub const DEFAULT_PORTS: [u16; 20] = [
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900,
    8080,
];

/// Parse a port specification into the ports to probe, in order.
///
/// Supported tokens, separated by commas:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
///
/// Duplicates are kept and a range whose start exceeds its end expands to
/// nothing. Only the empty string yields [`default_ports`]; a specification
/// made of whitespace is a blank token and fails like any other bad token.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>, PortParseError> {
    if s.is_empty() {
        return Ok(default_ports());
    }

    let mut out: Vec<u16> = Vec::new();
    for raw in s.split(',') {
        let token = raw.trim();

        // Range `start-end`
        if let Some((a, b)) = token.split_once('-') {
            let start = parse_port_str(token, a, "invalid range start")?;
            let end = parse_port_str(token, b, "invalid range end")?;
            out.extend(start..=end);
            continue;
        }

        out.push(parse_port_str(token, token, "invalid port value")?);
    }

    Ok(out)
}

/// Parse an optional specification; `None` means the defaults.
pub fn parse_ports_opt(s: Option<&str>) -> Result<Vec<u16>, PortParseError> {
    parse_ports_str(s.unwrap_or(""))
}

pub fn default_ports() -> Vec<u16> {
    DEFAULT_PORTS.to_vec()
}

fn parse_port_str(token: &str, part: &str, what: &str) -> Result<u16, PortParseError> {
    part.trim().parse::<u16>().map_err(|e| PortParseError {
        token: token.to_string(),
        reason: format!("{what}: {e}"),
    })
}
