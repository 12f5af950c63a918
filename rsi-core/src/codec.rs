// SPDX-License-Identifier: Apache-2.0

//! Inbound XML fragment extraction and outbound response formatting.
//!
//! Parsing here is deliberately substring-based, not DOM-based: the
//! per-datagram budget is hundreds of microseconds, and the datagram shape
//! is fixed. Do not replace this with a conformant XML parser without
//! measuring — see spec note on XML parsing by substring.

use crate::types::{CartesianCorrection, CartesianPose, JointPose};
use std::fmt::Write as _;

/// Maximum size of a formatted outbound response. Comfortably larger than
/// any legal `%.4f`-formatted six-axis correction plus the fixed envelope;
/// exceeding it is treated as a fatal formatting error (see `format_response`).
const RESPONSE_BUF_CAP: usize = 256;

/// The extracted IPOC token: both its decoded value (for latching onto pose
/// records) and the exact source substring (for byte-for-byte echo,
/// preserving leading zeros).
#[derive(Debug, Clone, Copy)]
pub struct Ipoc<'a> {
    pub value: u64,
    pub raw: &'a str,
}

/// Locate `<IPOC>...</IPOC>` and decode the enclosed unsigned integer.
///
/// Returns `None` if either delimiter is absent or the enclosed text isn't a
/// valid unsigned decimal integer; the caller must drop the datagram in that
/// case without updating any state.
pub fn extract_ipoc(datagram: &str) -> Option<Ipoc<'_>> {
    let open = datagram.find("<IPOC>")? + "<IPOC>".len();
    let rest = &datagram[open..];
    let close = rest.find("</IPOC>")?;
    let raw = &rest[..close];
    let value: u64 = raw.trim().parse().ok()?;
    Some(Ipoc { value, raw })
}

/// Find `NAME="..."` starting at or after `from` in `s` and decode the
/// enclosed floating-point number. Returns `None` if the attribute is
/// absent, which the caller treats as a default of `0.0`, not an error.
fn find_attr(s: &str, from: usize, name: &str) -> Option<f64> {
    let needle = format!("{name}=\"");
    let pos = s.get(from..)?.find(&needle)? + from + needle.len();
    let rest = &s[pos..];
    let end = rest.find('"')?;
    rest[..end].parse().ok()
}

/// Extract the Cartesian pose from the first `<RIst .../>` fragment.
///
/// Returns `None` only if `<RIst` itself is absent; individual missing axis
/// attributes within a present fragment default to `0.0`.
pub fn extract_cartesian(datagram: &str, ipoc: u64, timestamp_us: u64) -> Option<CartesianPose> {
    let anchor = datagram.find("<RIst")?;
    Some(CartesianPose {
        x: find_attr(datagram, anchor, "X").unwrap_or(0.0),
        y: find_attr(datagram, anchor, "Y").unwrap_or(0.0),
        z: find_attr(datagram, anchor, "Z").unwrap_or(0.0),
        a: find_attr(datagram, anchor, "A").unwrap_or(0.0),
        b: find_attr(datagram, anchor, "B").unwrap_or(0.0),
        c: find_attr(datagram, anchor, "C").unwrap_or(0.0),
        timestamp_us,
        ipoc,
    })
}

/// Extract the joint-space pose from the first `<AIPos .../>` fragment.
///
/// Returns `None` only if `<AIPos` itself is absent; individual missing
/// axis attributes within a present fragment default to `0.0`.
pub fn extract_joints(datagram: &str, ipoc: u64, timestamp_us: u64) -> Option<JointPose> {
    let anchor = datagram.find("<AIPos")?;
    Some(JointPose {
        a1: find_attr(datagram, anchor, "A1").unwrap_or(0.0),
        a2: find_attr(datagram, anchor, "A2").unwrap_or(0.0),
        a3: find_attr(datagram, anchor, "A3").unwrap_or(0.0),
        a4: find_attr(datagram, anchor, "A4").unwrap_or(0.0),
        a5: find_attr(datagram, anchor, "A5").unwrap_or(0.0),
        a6: find_attr(datagram, anchor, "A6").unwrap_or(0.0),
        timestamp_us,
        ipoc,
    })
}

/// Format the outbound response datagram, echoing `ipoc_raw` verbatim.
///
/// Returns `None` if the formatted datagram would exceed `RESPONSE_BUF_CAP`
/// — a fatal condition per spec: the caller drops the packet without
/// transmitting rather than sending a truncated response.
pub fn format_response(correction: &CartesianCorrection, ipoc_raw: &str) -> Option<String> {
    let mut out = String::with_capacity(RESPONSE_BUF_CAP);
    write!(
        out,
        "<Sen Type=\"ImFree\">\n<EStr>RSI Monitor</EStr>\n<RKorr X=\"{:.4}\" Y=\"{:.4}\" Z=\"{:.4}\" A=\"{:.4}\" B=\"{:.4}\" C=\"{:.4}\" />\n<IPOC>{}</IPOC>\n</Sen>",
        correction.x, correction.y, correction.z, correction.a, correction.b, correction.c, ipoc_raw
    )
    .ok()?;
    if out.len() > RESPONSE_BUF_CAP {
        return None;
    }
    Some(out)
}
