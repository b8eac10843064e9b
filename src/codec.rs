//! Text wire format of a package.
//!
//! ```text
//! -----BEGIN SPECIALCOPY-----
//! type=single
//! package_id=0b0d6c1e-...
//! timestamp_utc=2024-01-02T03:04:05.000000Z
//! name=report.txt
//! size=10
//! stored_size=10
//! sha256=...
//! compress=none
//! part_index=1
//! part_total=1
//! b64=
//! MDEyMzQ1Njc4OQ==
//! -----END SPECIALCOPY-----
//! ```
//!
//! Anything before the header or after the footer is ignored, so a package
//! can be pasted inside a longer message.

use std::collections::HashMap;
use std::str::FromStr;

use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::{PackageError, Result};
use crate::package::{Compression, Package, PackageType};

pub const HEADER: &str = "-----BEGIN SPECIALCOPY-----";
pub const FOOTER: &str = "-----END SPECIALCOPY-----";
pub const DEFAULT_LINE_WIDTH: usize = 120;

const BODY_KEY: &str = "b64";

pub fn serialize(package: &Package, line_width: usize) -> String {
    let mut out = String::with_capacity(package.payload_b64.len() + 512);
    push_line(&mut out, HEADER);
    push_field(&mut out, "type", &package.package_type.to_string());
    push_field(&mut out, "package_id", &package.package_id);
    push_field(
        &mut out,
        "timestamp_utc",
        &package
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true),
    );
    push_field(&mut out, "name", package.name.as_deref().unwrap_or(""));
    push_field(&mut out, "size", &package.original_size.to_string());
    push_field(&mut out, "stored_size", &package.stored_size.to_string());
    push_field(&mut out, "sha256", &package.sha256);
    push_field(&mut out, "compress", &package.compression.to_string());
    push_field(&mut out, "part_index", &package.part_index.to_string());
    push_field(&mut out, "part_total", &package.part_total.to_string());
    if let Some(manifest) = package
        .manifest
        .as_deref()
        .filter(|m| !m.trim().is_empty())
    {
        push_field(
            &mut out,
            "manifest",
            &general_purpose::STANDARD.encode(manifest),
        );
    }

    push_field(&mut out, BODY_KEY, "");
    // base64 is ASCII, so splitting on bytes never cuts a character
    for line in package
        .payload_b64
        .as_bytes()
        .chunks(line_width.max(1))
    {
        push_line(&mut out, &String::from_utf8_lossy(line));
    }
    push_line(&mut out, FOOTER);
    out
}

pub fn parse(text: &str) -> Result<Package> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.trim() == HEADER)
        .ok_or(PackageError::MissingMarkers)?;
    let end = lines[start + 1..]
        .iter()
        .position(|line| line.trim() == FOOTER)
        .map(|offset| start + 1 + offset)
        .ok_or(PackageError::MissingMarkers)?;

    let mut fields: HashMap<String, String> = HashMap::new();
    let mut body = String::new();
    let mut in_body = false;

    for line in &lines[start + 1..end] {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if in_body {
            body.push_str(line);
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();

        if key == BODY_KEY {
            in_body = true;
            body.push_str(value);
            continue;
        }

        fields.insert(key, value.to_owned());
    }

    let package_type: PackageType = required(&fields, "type")?.parse()?;
    let compression: Compression = required(&fields, "compress")?.parse()?;
    let timestamp = parse_timestamp(required(&fields, "timestamp_utc")?)?;
    let part_index = optional_number(&fields, "part_index", 1)?;
    let part_total = optional_number(&fields, "part_total", 1)?;

    if part_index == 0 || part_total == 0 || part_index > part_total {
        return Err(PackageError::invalid(
            "part_index",
            format!("{}/{}", part_index, part_total),
        ));
    }
    if package_type == PackageType::Chunk && compression != Compression::None
    {
        return Err(PackageError::invalid("compress", compression.to_string()));
    }

    let manifest = match fields.get("manifest").filter(|m| !m.is_empty()) {
        Some(encoded) => Some(decode_manifest(encoded)?),
        None => None,
    };

    Ok(Package {
        package_type,
        package_id: required(&fields, "package_id")?.to_owned(),
        timestamp,
        compression,
        sha256: required(&fields, "sha256")?.to_owned(),
        original_size: number(required(&fields, "size")?, "size")?,
        stored_size: number(required(&fields, "stored_size")?, "stored_size")?,
        name: fields
            .get("name")
            .filter(|name| !name.is_empty())
            .cloned(),
        part_index,
        part_total,
        payload_b64: body,
        manifest,
    })
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn push_field(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    out.push('\n');
}

fn required<'a>(
    fields: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or(PackageError::MissingField(key))
}

fn number<T: FromStr>(value: &str, key: &'static str) -> Result<T> {
    value
        .parse()
        .map_err(|_| PackageError::invalid(key, value))
}

fn optional_number<T: FromStr>(
    fields: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T> {
    match fields.get(key) {
        Some(value) => number(value, key),
        None => Ok(default),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| PackageError::invalid("timestamp_utc", value))
}

fn decode_manifest(encoded: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| PackageError::invalid("manifest", e.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|e| PackageError::invalid("manifest", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn sample() -> Package {
        Package {
            package_type: PackageType::Single,
            package_id: "8f7f0d3e-2a7b-4d0e-9f3c-5c1d2e3f4a5b".to_owned(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            compression: Compression::None,
            sha256: "84d89877f0d4041efb6bf91a16f0248f2fd573e6af05c19f96bedb9f882f7882"
                .to_owned(),
            original_size: 10,
            stored_size: 10,
            name: Some("digits.txt".to_owned()),
            part_index: 1,
            part_total: 1,
            payload_b64: "MDEyMzQ1Njc4OQ==".to_owned(),
            manifest: None,
        }
    }

    #[test]
    fn serialize_writes_fields_in_fixed_order() {
        let text = serialize(&sample(), 120);
        let expected = "\
-----BEGIN SPECIALCOPY-----
type=single
package_id=8f7f0d3e-2a7b-4d0e-9f3c-5c1d2e3f4a5b
timestamp_utc=2024-01-02T03:04:05.000000Z
name=digits.txt
size=10
stored_size=10
sha256=84d89877f0d4041efb6bf91a16f0248f2fd573e6af05c19f96bedb9f882f7882
compress=none
part_index=1
part_total=1
b64=
MDEyMzQ1Njc4OQ==
-----END SPECIALCOPY-----
";
        assert_eq!(text, expected);
    }

    #[test]
    fn payload_is_wrapped_at_line_width() {
        let mut package = sample();
        package.payload_b64 = "A".repeat(50);
        let text = serialize(&package, 16);
        let body: Vec<&str> = text
            .lines()
            .skip_while(|l| *l != "b64=")
            .skip(1)
            .take_while(|l| *l != FOOTER)
            .collect();
        assert_eq!(body.len(), 4);
        assert!(body[..3].iter().all(|l| l.len() == 16));
        assert_eq!(body[3].len(), 2);
    }

    #[test]
    fn parse_reverses_serialize() {
        let mut package = sample();
        package.package_type = PackageType::Multi;
        package.name = None;
        package.manifest = Some(r#"{"version":1,"files":[]}"#.to_owned());
        let parsed = parse(&serialize(&package, 20)).unwrap();
        assert_eq!(parsed, package);
    }

    #[test]
    fn parse_ignores_surrounding_text_and_crlf() {
        let text = serialize(&sample(), 8).replace('\n', "\r\n");
        let message =
            format!("hey, here is the file:\r\n\r\n  {text}\r\nthanks!");
        let parsed = parse(&message).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn keys_are_case_insensitive_and_body_may_start_on_marker_line() {
        let text = "\
-----BEGIN SPECIALCOPY-----
TYPE = single
Package_Id=abc
timestamp_utc=2024-01-02T03:04:05.1234567+00:00
size=10
stored_size=10
sha256=00
compress=NONE

b64=MDEyMzQ1
Njc4OQ==
-----END SPECIALCOPY-----";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.package_id, "abc");
        assert_eq!(parsed.name, None);
        assert_eq!(parsed.part_index, 1);
        assert_eq!(parsed.part_total, 1);
        assert_eq!(parsed.payload_b64, "MDEyMzQ1Njc4OQ==");
    }

    #[test]
    fn lines_after_body_marker_are_payload() {
        let text = "\
-----BEGIN SPECIALCOPY-----
type=single
package_id=abc
timestamp_utc=2024-01-02T03:04:05Z
size=10
stored_size=10
sha256=00
compress=none
b64=
QUJD
size=99
-----END SPECIALCOPY-----";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.original_size, 10);
        assert_eq!(parsed.payload_b64, "QUJDsize=99");
    }

    #[rstest]
    #[case("no markers at all")]
    #[case("-----BEGIN SPECIALCOPY-----\ntype=single\n")]
    #[case("-----END SPECIALCOPY-----\n-----BEGIN SPECIALCOPY-----\n")]
    fn missing_markers(#[case] text: &str) {
        assert!(matches!(parse(text), Err(PackageError::MissingMarkers)));
    }

    #[rstest]
    #[case("type")]
    #[case("package_id")]
    #[case("timestamp_utc")]
    #[case("compress")]
    #[case("sha256")]
    #[case("size")]
    #[case("stored_size")]
    fn missing_required_field(#[case] field: &str) {
        let text = with_line(&serialize(&sample(), 120), field, "");
        match parse(&text) {
            Err(PackageError::MissingField(missing)) => {
                assert_eq!(missing, field)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    fn with_line(text: &str, key: &str, replacement: &str) -> String {
        text.lines()
            .map(|l| {
                if l.starts_with(&format!("{key}=")) {
                    format!("{replacement}\n")
                } else {
                    format!("{l}\n")
                }
            })
            .collect()
    }

    #[rstest]
    #[case("size", "size=ten")]
    #[case("stored_size", "stored_size=-1")]
    #[case("timestamp_utc", "timestamp_utc=yesterday")]
    #[case("part_index", "part_index=x")]
    #[case("compress", "compress=zstd")]
    #[case("type", "type=archive")]
    fn unparseable_scalar(#[case] field: &str, #[case] line: &str) {
        let text = with_line(&serialize(&sample(), 120), field, line);
        match parse(&text) {
            Err(PackageError::InvalidField { field: f, .. }) => {
                assert_eq!(f, field)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[rstest]
    #[case(0, 1)]
    #[case(3, 2)]
    #[case(1, 0)]
    fn part_index_must_be_within_total(#[case] index: u32, #[case] total: u32) {
        let mut package = sample();
        package.part_index = index;
        package.part_total = total;
        assert!(matches!(
            parse(&serialize(&package, 120)),
            Err(PackageError::InvalidField { field: "part_index", .. })
        ));
    }

    #[test]
    fn chunk_must_not_be_compressed() {
        let mut package = sample();
        package.package_type = PackageType::Chunk;
        package.compression = Compression::Gzip;
        assert!(matches!(
            parse(&serialize(&package, 120)),
            Err(PackageError::InvalidField { field: "compress", .. })
        ));
    }

    #[test]
    fn broken_manifest_encoding_is_a_format_error() {
        let text = serialize(&sample(), 120)
            .replace("b64=\n", "manifest=***\nb64=\n");
        assert!(matches!(
            parse(&text),
            Err(PackageError::InvalidField { field: "manifest", .. })
        ));
    }
}
