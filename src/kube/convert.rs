//! Conversions from Compose value syntax to Kubernetes value syntax

use crate::compose::config::{CpuCount, PortConfig};
use crate::error::{ChartError, Result};

/// A single container port mapping
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PortMapping {
    pub target: u16,
    pub published: Option<u16>,
    /// `TCP`, `UDP` or `SCTP`
    pub protocol: String,
}

/// Expand one Compose port entry into individual mappings.
///
/// Short syntax is `[[host_ip:]published:]target[/protocol]`, where both
/// ports may be `start-end` ranges.
pub fn parse_port(port: &PortConfig) -> Result<Vec<PortMapping>> {
    match port {
        PortConfig::Number(n) => Ok(vec![PortMapping {
            target: *n,
            published: None,
            protocol: "TCP".to_string(),
        }]),
        PortConfig::Long(long) => {
            let published = match &long.published {
                Some(p) => Some(parse_range(&p.to_string())?.0),
                None => None,
            };
            Ok(vec![PortMapping {
                target: long.target,
                published,
                protocol: protocol(long.protocol.as_deref().unwrap_or("tcp"))?,
            }])
        }
        PortConfig::Short(spec) => parse_short_port(spec),
    }
}

fn parse_short_port(spec: &str) -> Result<Vec<PortMapping>> {
    let (ports, proto) = match spec.rsplit_once('/') {
        Some((ports, proto)) => (ports, protocol(proto)?),
        None => (spec, "TCP".to_string()),
    };

    // host IPs may be bracketed IPv6 addresses, so split from the right
    let mut parts = ports.rsplitn(3, ':');
    let target = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid_port(spec))?;
    let published = parts.next().filter(|s| !s.is_empty());

    let (t_start, t_end) = parse_range(target).map_err(|_| invalid_port(spec))?;
    let published = published
        .map(parse_range)
        .transpose()
        .map_err(|_| invalid_port(spec))?;

    let count = t_end - t_start;
    match published {
        Some((p_start, p_end)) if count > 0 && p_end - p_start != count => {
            Err(ChartError::Validation(format!(
                "Port range '{}' maps ranges of different lengths",
                spec
            )))
        }
        published => Ok((0..=count)
            .map(|i| PortMapping {
                target: t_start + i,
                published: published.map(|(p_start, p_end)| {
                    if p_end == p_start { p_start } else { p_start + i }
                }),
                protocol: proto.clone(),
            })
            .collect()),
    }
}

fn parse_range(s: &str) -> Result<(u16, u16)> {
    let bad = || ChartError::Validation(format!("Invalid port '{}'", s));
    match s.split_once('-') {
        Some((start, end)) => {
            let start: u16 = start.trim().parse().map_err(|_| bad())?;
            let end: u16 = end.trim().parse().map_err(|_| bad())?;
            if end < start {
                return Err(bad());
            }
            Ok((start, end))
        }
        None => {
            let port: u16 = s.trim().parse().map_err(|_| bad())?;
            Ok((port, port))
        }
    }
}

fn protocol(proto: &str) -> Result<String> {
    match proto.to_lowercase().as_str() {
        "tcp" => Ok("TCP".to_string()),
        "udp" => Ok("UDP".to_string()),
        "sctp" => Ok("SCTP".to_string()),
        other => Err(ChartError::Validation(format!(
            "Unsupported port protocol '{}'",
            other
        ))),
    }
}

fn invalid_port(spec: &str) -> ChartError {
    ChartError::Validation(format!("Invalid port specification '{}'", spec))
}

/// Convert a Compose byte value (`512m`, `1gb`, `2048`) to a Kubernetes
/// quantity. Whole multiples keep their binary suffix, fractions become bytes.
pub fn memory_quantity(value: &str) -> Result<String> {
    let bad = || ChartError::Validation(format!("Invalid memory value '{}'", value));
    let lower = value.trim().to_lowercase();
    let split = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);
    let number: f64 = number.parse().map_err(|_| bad())?;
    if number <= 0.0 {
        return Err(bad());
    }

    let (suffix, multiplier) = match unit.trim_end_matches('b') {
        "" => ("", 1u64),
        "k" => ("Ki", 1 << 10),
        "m" => ("Mi", 1 << 20),
        "g" => ("Gi", 1 << 30),
        "t" => ("Ti", 1 << 40),
        _ => return Err(bad()),
    };

    if number.fract() == 0.0 {
        Ok(format!("{}{}", number as u64, suffix))
    } else {
        Ok(format!("{}", (number * multiplier as f64).round() as u64))
    }
}

/// Convert a Compose CPU count to a Kubernetes quantity (`0.5` → `500m`)
pub fn cpu_quantity(value: &CpuCount) -> Result<String> {
    let text = value.to_string();
    let cpus: f64 = text
        .trim()
        .parse()
        .map_err(|_| ChartError::Validation(format!("Invalid cpus value '{}'", text)))?;
    if cpus <= 0.0 {
        return Err(ChartError::Validation(format!(
            "cpus must be positive, got '{}'",
            text
        )));
    }
    let millis = (cpus * 1000.0).round() as u64;
    if millis % 1000 == 0 {
        Ok(format!("{}", millis / 1000))
    } else {
        Ok(format!("{}m", millis))
    }
}

/// Convert a Compose duration (`1m30s`, `500ms`) to whole seconds, rounding
/// up. Probes cannot run more often than once a second.
pub fn duration_seconds(value: &str) -> Result<u32> {
    let bad = || ChartError::Validation(format!("Invalid duration '{}'", value));
    let s = value.trim();
    if s.is_empty() {
        return Err(bad());
    }

    let mut total_ms: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(bad)?;
        let (num, tail) = rest.split_at(num_end);
        let num: f64 = num.parse().map_err(|_| bad())?;
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let factor = match unit {
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            "ms" => 1.0,
            "us" | "µs" => 0.001,
            _ => return Err(bad()),
        };
        total_ms += num * factor;
        rest = tail;
    }

    Ok(((total_ms / 1000.0).ceil() as u32).max(1))
}

/// Split a command string into words the way a POSIX shell would, honouring
/// single quotes, double quotes and backslash escapes. Nothing is expanded.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(command)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(unterminated(command)),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(command)),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(ch) = chars.next() {
                    current.push(ch);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn unterminated(command: &str) -> ChartError {
    ChartError::Validation(format!("Unterminated quote in command '{}'", command))
}
