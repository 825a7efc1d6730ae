//! Line-oriented zone rewriting.
//!
//! The compiler parses zone text into a structured line list (serial line,
//! A records classified by owner, everything else passed through) and
//! applies record edits against that structure. Unrelated lines survive
//! byte-for-byte in their original order; only the serial line and the
//! managed record set change. Recompiling with identical record inputs
//! yields identical non-serial output.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::LazyLock;

use super::serial::SERIAL_MARKER;

/// Match: "flux  IN A 10.0.0.1" (leading whitespace allowed)
static A_RECORD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(\S+)[ \t]+IN[ \t]+A[ \t]+([0-9.]+)")
        .expect("Invalid A record line regex")
});

/// Match: "                 2024060105 ; Serial (dynamically generated)"
static SERIAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*; Serial \(dynamically generated\)\s*$")
        .expect("Invalid serial line regex")
});

/// One classified line of zone text.
#[derive(Debug, Clone)]
enum Line {
    /// The serial marker line; rewritten in place on every compile.
    Serial,
    /// An A record, keyed by its owner name.
    ARecord { owner: String, raw: String },
    /// Any other line, passed through untouched.
    Other(String),
}

/// A parsed zone body that record edits are applied to before rendering
/// back to text.
#[derive(Debug)]
pub struct ZoneDocument {
    lines: Vec<Line>,
    serial: Option<u64>,
}

impl ZoneDocument {
    /// Parse zone text into its structured form. Never fails: unrecognized
    /// lines are carried through verbatim.
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut serial = None;
        for raw in text.lines() {
            if let Some(caps) = SERIAL_LINE.captures(raw) {
                serial = serial.or_else(|| caps[1].parse().ok());
                lines.push(Line::Serial);
            } else if let Some(caps) = A_RECORD_LINE.captures(raw) {
                lines.push(Line::ARecord {
                    owner: caps[1].to_string(),
                    raw: raw.to_string(),
                });
            } else {
                lines.push(Line::Other(raw.to_string()));
            }
        }
        ZoneDocument { lines, serial }
    }

    /// Set the serial rendered on the marker line. The line keeps its
    /// original position; if the zone had none, one is appended.
    pub fn set_serial(&mut self, serial: u64) {
        self.serial = Some(serial);
        if !self.lines.iter().any(|l| matches!(l, Line::Serial)) {
            self.lines.push(Line::Serial);
        }
    }

    /// Replace the record set for `owner` with a single fresh A record.
    ///
    /// Every existing A line for that owner is removed, regardless of how
    /// many had accumulated, and exactly one new line is appended at the
    /// end of the zone.
    pub fn set_address(&mut self, owner: &str, address: &str) {
        self.set_addresses(owner, &[address.to_string()]);
    }

    /// Replace the record set for `owner` with one A record per address,
    /// in the given order. Used for multi-edge networks that answer with
    /// several addresses at once.
    pub fn set_addresses(&mut self, owner: &str, addresses: &[String]) {
        self.lines
            .retain(|l| !matches!(l, Line::ARecord { owner: o, .. } if o == owner));
        for address in addresses {
            let raw = format!("{}  IN A {}", owner, address);
            self.lines.push(Line::ARecord {
                owner: owner.to_string(),
                raw,
            });
        }
    }

    /// Rewrite the `$TTL` directive in place, inserting one as the first
    /// line if the zone has none.
    pub fn set_ttl(&mut self, ttl: u32) {
        let directive = format!("$TTL {}", ttl);
        for line in &mut self.lines {
            if let Line::Other(raw) = line {
                if raw.trim_start().starts_with("$TTL") {
                    *raw = directive;
                    return;
                }
            }
        }
        self.lines.insert(0, Line::Other(directive));
    }

    /// Addresses currently published for `owner`, in line order.
    pub fn addresses_of(&self, owner: &str) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                Line::ARecord { owner: o, raw } if o == owner => A_RECORD_LINE
                    .captures(raw)
                    .map(|caps| caps[2].to_string()),
                _ => None,
            })
            .collect()
    }

    /// Render back to zone text with a trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Serial => {
                    let serial = self.serial.unwrap_or(0);
                    let _ = writeln!(out, "                 {} {}", serial, SERIAL_MARKER);
                }
                Line::ARecord { raw, .. } | Line::Other(raw) => {
                    out.push_str(raw);
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Compile new zone text: bump the serial and republish `owner` as a
/// single A record for `address`, leaving every other line untouched.
pub fn compile_single_record(text: &str, owner: &str, address: &str, serial: u64) -> String {
    let mut doc = ZoneDocument::parse(text);
    doc.set_serial(serial);
    doc.set_address(owner, address);
    doc.render()
}

/// Compile new zone text publishing the full address set for `owner`.
pub fn compile_record_set(text: &str, owner: &str, addresses: &[String], serial: u64) -> String {
    let mut doc = ZoneDocument::parse(text);
    doc.set_serial(serial);
    doc.set_addresses(owner, addresses);
    doc.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE: &str = "$TTL 60\n\
$ORIGIN sim.local.\n\
@       IN SOA  ns.sim.local. root.sim.local. (\n\
                 2024060105 ; Serial (dynamically generated)\n\
                 30M\n\
                 15M\n\
                 1W\n\
                 1M )\n\
@       IN NS   ns.sim.local.\n\
ns      IN A 172.60.0.53\n\
\n\
flux IN A 172.60.0.5\n";

    #[test]
    fn test_serial_line_position_preserved() {
        let out = compile_single_record(ZONE, "flux", "10.0.0.9", 2024060106);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[3].contains("2024060106"));
        assert!(lines[3].ends_with("; Serial (dynamically generated)"));
    }

    #[test]
    fn test_stale_records_collapse_to_one_fresh_line() {
        let zone = format!("{}flux IN A 172.60.0.7\n", ZONE);
        let out = compile_single_record(&zone, "flux", "10.0.0.1", 2024060106);
        let flux_lines: Vec<&str> = out
            .lines()
            .filter(|l| l.starts_with("flux"))
            .collect();
        assert_eq!(flux_lines, vec!["flux  IN A 10.0.0.1"]);
        // Fresh record lands at the end of the zone.
        assert_eq!(out.lines().last().unwrap(), "flux  IN A 10.0.0.1");
    }

    #[test]
    fn test_unrelated_lines_unchanged_in_order() {
        let out = compile_single_record(ZONE, "flux", "10.0.0.1", 2024060106);
        let expected_passthrough = ["$TTL 60", "$ORIGIN sim.local.", "@       IN NS   ns.sim.local.", "ns      IN A 172.60.0.53"];
        let out_lines: Vec<&str> = out.lines().collect();
        let mut cursor = 0;
        for want in expected_passthrough {
            let pos = out_lines[cursor..]
                .iter()
                .position(|l| *l == want)
                .unwrap_or_else(|| panic!("line '{}' missing or out of order", want));
            cursor += pos + 1;
        }
    }

    #[test]
    fn test_recompile_is_idempotent_outside_serial() {
        let once = compile_single_record(ZONE, "flux", "10.0.0.1", 2024060106);
        let twice = compile_single_record(&once, "flux", "10.0.0.1", 2024060107);
        let strip = |s: &str| {
            s.lines()
                .filter(|l| !l.contains("; Serial"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(strip(&once), strip(&twice));
    }

    #[test]
    fn test_serial_appended_when_absent() {
        let zone = "flux IN A 10.0.0.1\n";
        let out = compile_single_record(zone, "flux", "10.0.0.2", 2024060101);
        assert!(out.contains("2024060101 ; Serial (dynamically generated)"));
    }

    #[test]
    fn test_record_appended_for_new_owner() {
        let out = compile_single_record(ZONE, "edge", "192.168.1.1", 2024060106);
        assert!(out.contains("edge  IN A 192.168.1.1"));
        // Pre-existing flux record untouched.
        assert!(out.contains("flux IN A 172.60.0.5"));
    }

    #[test]
    fn test_multi_record_set_replaces_block() {
        let addrs: Vec<String> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = compile_record_set(ZONE, "flux", &addrs, 2024060106);
        let flux_lines: Vec<&str> = out
            .lines()
            .filter(|l| l.starts_with("flux"))
            .collect();
        assert_eq!(
            flux_lines,
            vec![
                "flux  IN A 10.0.0.1",
                "flux  IN A 10.0.0.2",
                "flux  IN A 10.0.0.3",
            ]
        );
    }

    #[test]
    fn test_set_ttl_rewrites_first_directive() {
        let mut doc = ZoneDocument::parse(ZONE);
        doc.set_ttl(180);
        let out = doc.render();
        assert_eq!(out.lines().next().unwrap(), "$TTL 180");
    }

    #[test]
    fn test_set_ttl_inserts_when_missing() {
        let mut doc = ZoneDocument::parse("flux IN A 10.0.0.1\n");
        doc.set_ttl(30);
        assert_eq!(doc.render().lines().next().unwrap(), "$TTL 30");
    }

    #[test]
    fn test_parse_render_round_trip_preserves_serial() {
        let doc = ZoneDocument::parse(ZONE);
        assert!(doc.render().contains("2024060105 ; Serial (dynamically generated)"));
    }

    #[test]
    fn test_addresses_of_reads_current_set() {
        let doc = ZoneDocument::parse(ZONE);
        assert_eq!(doc.addresses_of("flux"), vec!["172.60.0.5"]);
        assert_eq!(doc.addresses_of("ns"), vec!["172.60.0.53"]);
    }
}
