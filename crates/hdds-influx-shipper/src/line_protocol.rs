// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Line Protocol encoding.
//!
//! Each point becomes one newline-terminated line:
//! ```text
//! measurement,tag1=val1,tag2=val2 value=<float> timestamp_ns
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/>

use crate::point::Point;
use std::fmt::Write as _;

/// Append the line for `point` to `out`, including the trailing newline.
///
/// Tags are written in the order stored on the point, which is ascending by
/// key. The value uses Rust's shortest round-trip float formatting, which
/// does not depend on the process locale.
pub fn write_point(point: &Point, out: &mut String) {
    escape_into(out, point.name(), &[',', ' ']);

    for (key, value) in point.tags() {
        out.push(',');
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        escape_into(out, value, &[',', '=', ' ']);
    }

    // Writing into a String cannot fail.
    let _ = writeln!(out, " value={} {}", point.value(), point.timestamp_ns());
}

/// Encode a batch of points into a single payload, preserving slice order.
pub fn encode_batch(points: &[Point]) -> String {
    // Typical line is well under 64 bytes.
    let mut out = String::with_capacity(points.len() * 64);
    for point in points {
        write_point(point, &mut out);
    }
    out
}

/// Backslash-escape every character of `s` found in `special`.
fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(name: &str, tags: &[(&str, &str)], value: f64, ts: i64) -> Point {
        Point::at_nanos(name, tags.iter().copied(), value, ts).expect("valid point")
    }

    #[test]
    fn test_line_protocol_simple_point() {
        let p = point("temperature", &[], 23.5, 1_000_000_000);
        assert_eq!(encode_batch(&[p]), "temperature value=23.5 1000000000\n");
    }

    #[test]
    fn test_line_protocol_cpu_scenario() {
        let p = point("cpu", &[("host", "a")], 0.42, 1_700_000_000_123_456_789);
        assert_eq!(
            encode_batch(&[p]),
            "cpu,host=a value=0.42 1700000000123456789\n"
        );
    }

    #[test]
    fn test_line_protocol_tags_sorted_regardless_of_insertion() {
        let p = point(
            "temperature",
            &[("sensor", "A1"), ("location", "room1"), ("building", "b")],
            23.5,
            1,
        );
        assert_eq!(
            encode_batch(&[p]),
            "temperature,building=b,location=room1,sensor=A1 value=23.5 1\n"
        );
    }

    #[test]
    fn test_line_protocol_integral_and_negative_values() {
        let batch = encode_batch(&[point("a", &[], 1000.0, 1), point("b", &[], -0.5, 2)]);
        assert_eq!(batch, "a value=1000 1\nb value=-0.5 2\n");
    }

    #[test]
    fn test_line_protocol_escape_special_chars() {
        let p = point("my measurement", &[("tag key", "tag,va=lue")], 1.0, 3);
        assert_eq!(
            encode_batch(&[p]),
            "my\\ measurement,tag\\ key=tag\\,va\\=lue value=1 3\n"
        );
    }

    #[test]
    fn test_encode_batch_preserves_order_and_empty() {
        assert_eq!(encode_batch(&[]), "");

        let batch = encode_batch(&[
            point("m", &[("i", "2")], 2.0, 20),
            point("m", &[("i", "1")], 1.0, 10),
        ]);
        assert_eq!(batch, "m,i=2 value=2 20\nm,i=1 value=1 10\n");
    }
}
