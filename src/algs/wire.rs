//! Fixed, versioned, little-endian wire types for curve hand-off and control traffic.
//!
//! Every message starts with a [`WireHdr`]. Field order of a curve batch:
//!
//! ```text
//! WireHdr(kind = CURVES)
//! WireCount(n)
//! n × { WireCurveHead, n_candidates × WireDomain, n_history × WirePoint3 }
//! ```
//!
//! Control messages are `WireHdr(kind = TERMINATE_COUNT) WireDelta` or
//! `WireHdr(kind = ACK) WireAck`. Records are read with unaligned loads, so
//! receive buffers need no particular alignment.

use crate::advect::curve::{CurveId, CurveStatus, IntegralCurve, TerminationReason};
use crate::mesh_error::MeshAdvectError;
use crate::topology::domain::DomainId;
use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

pub const KIND_CURVES: u16 = 1;
pub const KIND_TERMINATE_COUNT: u16 = 2;
pub const KIND_ACK: u16 = 3;

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

// ===== Common records ======================================================

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,  // = WIRE_VERSION.to_le()
    pub kind_le: u16,     // KIND_*
    pub reserved_le: u32, // future use; keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following records
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

// ===== Curve hand-off =====================================================

const STATUS_OK: u8 = 0;
const STATUS_OOB: u8 = 1;
const STATUS_TERMINATED: u8 = 2;

/// Fixed-size part of one curve. Floats travel as their IEEE bit patterns.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCurveHead {
    pub id_le: u64,
    pub time_bits_le: u64,
    pub loc_bits_le: [u64; 3],
    pub counter_le: u32,
    pub originating_rank_le: u32,
    pub domain_le: u32,
    pub time_step_le: u32,
    pub steps_le: u32,
    pub n_candidates_le: u32,
    pub n_history_le: u32,
    pub status: u8,
    pub reason: u8,
    pub _pad: [u8; 2],
}

impl WireCurveHead {
    pub const SIZE: usize = 72;
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireDomain {
    pub domain_le: u32,
    pub time_step_le: u32,
}
impl WireDomain {
    pub fn of(d: DomainId) -> Self {
        Self {
            domain_le: d.domain.to_le(),
            time_step_le: d.time_step.to_le(),
        }
    }
    pub fn get(&self) -> DomainId {
        DomainId::new(u32::from_le(self.domain_le), u32::from_le(self.time_step_le))
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WirePoint3 {
    pub bits_le: [u64; 3],
}
impl WirePoint3 {
    pub fn of(p: [f64; 3]) -> Self {
        Self {
            bits_le: p.map(|x| x.to_bits().to_le()),
        }
    }
    pub fn get(&self) -> [f64; 3] {
        self.bits_le.map(|b| f64::from_bits(u64::from_le(b)))
    }
}

// ===== Control ============================================================

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireDelta {
    pub delta_le: i64,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireAck {
    pub id_le: u64,
    pub counter_le: u32,
    pub used_le: u32, // 1 = USED, 0 = NOT_USED
}

/// Decoded control traffic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    /// Signed change of the global live-curve count.
    TerminateCount(i64),
    /// The receiver kept the curve sent as `(id, counter)`.
    Used { id: CurveId, counter: u32 },
    /// The receiver could not place the curve and dropped it.
    NotUsed { id: CurveId, counter: u32 },
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    // Pod/Zeroable ensures no padding contains uninit when cast to bytes.
    assert!(size_of::<WireHdr>() == 8);
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireCurveHead>() == WireCurveHead::SIZE);
    assert!(align_of::<WireCurveHead>() == 8);
    assert!(size_of::<WireDomain>() == 8);
    assert!(size_of::<WirePoint3>() == 24);
    assert!(size_of::<WireDelta>() == 8);
    assert!(size_of::<WireAck>() == 16);
};

// ===== Encoding ===========================================================

fn push<T: Pod>(out: &mut Vec<u8>, rec: &T) {
    out.extend_from_slice(bytemuck::bytes_of(rec));
}

/// Encode a batch of curves.
pub fn encode_curves<'a, I>(curves: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a IntegralCurve>,
    I::IntoIter: ExactSizeIterator,
{
    let curves = curves.into_iter();
    let mut out = Vec::with_capacity(size_of::<WireHdr>() + 4 + curves.len() * WireCurveHead::SIZE);
    push(&mut out, &WireHdr::new(KIND_CURVES));
    push(&mut out, &WireCount::new(curves.len()));
    for c in curves {
        let (status, reason) = match c.status {
            CurveStatus::Ok => (STATUS_OK, 0),
            CurveStatus::OutOfBounds => (STATUS_OOB, 0),
            CurveStatus::Terminated(r) => (STATUS_TERMINATED, r.to_wire()),
        };
        let head = WireCurveHead {
            id_le: c.id.0.to_le(),
            time_bits_le: c.time.to_bits().to_le(),
            loc_bits_le: c.location.map(|x| x.to_bits().to_le()),
            counter_le: c.counter.to_le(),
            originating_rank_le: (c.originating_rank as u32).to_le(),
            domain_le: c.domain.domain.to_le(),
            time_step_le: c.domain.time_step.to_le(),
            steps_le: c.steps_taken.to_le(),
            n_candidates_le: (c.seed_pt_domain_list.len() as u32).to_le(),
            n_history_le: (c.history.len() as u32).to_le(),
            status,
            reason,
            _pad: [0; 2],
        };
        push(&mut out, &head);
        for &d in &c.seed_pt_domain_list {
            push(&mut out, &WireDomain::of(d));
        }
        for &p in &c.history {
            push(&mut out, &WirePoint3::of(p));
        }
    }
    out
}

/// Encode one control message.
pub fn encode_control(msg: ControlMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    match msg {
        ControlMessage::TerminateCount(delta) => {
            push(&mut out, &WireHdr::new(KIND_TERMINATE_COUNT));
            push(
                &mut out,
                &WireDelta {
                    delta_le: delta.to_le(),
                },
            );
        }
        ControlMessage::Used { id, counter } | ControlMessage::NotUsed { id, counter } => {
            let used = matches!(msg, ControlMessage::Used { .. }) as u32;
            push(&mut out, &WireHdr::new(KIND_ACK));
            push(
                &mut out,
                &WireAck {
                    id_le: id.0.to_le(),
                    counter_le: counter.to_le(),
                    used_le: used.to_le(),
                },
            );
        }
    }
    out
}

// ===== Decoding ===========================================================

struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, at: 0 }
    }

    fn take<T: Pod>(&mut self) -> Result<T, MeshAdvectError> {
        let n = size_of::<T>();
        let end = self.at + n;
        let bytes = self.buf.get(self.at..end).ok_or_else(|| {
            MeshAdvectError::Wire(format!(
                "truncated record at byte {}: need {n}, have {}",
                self.at,
                self.buf.len() - self.at
            ))
        })?;
        self.at = end;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    fn finish(self) -> Result<(), MeshAdvectError> {
        expect_exact_len(self.at, self.buf.len()).map_err(MeshAdvectError::Wire)
    }
}

/// Read and check the header; returns its kind.
pub fn peek_kind(buf: &[u8]) -> Result<u16, MeshAdvectError> {
    let hdr: WireHdr = Reader::new(buf).take()?;
    if hdr.version() != WIRE_VERSION {
        return Err(MeshAdvectError::Wire(format!(
            "wire version {} (expected {WIRE_VERSION})",
            hdr.version()
        )));
    }
    Ok(hdr.kind())
}

fn expect_kind(r: &mut Reader<'_>, kind: u16) -> Result<(), MeshAdvectError> {
    let hdr: WireHdr = r.take()?;
    if hdr.version() != WIRE_VERSION {
        return Err(MeshAdvectError::Wire(format!(
            "wire version {} (expected {WIRE_VERSION})",
            hdr.version()
        )));
    }
    if hdr.kind() != kind {
        return Err(MeshAdvectError::Wire(format!(
            "message kind {} (expected {kind})",
            hdr.kind()
        )));
    }
    Ok(())
}

/// Decode a batch produced by [`encode_curves`].
pub fn decode_curves(buf: &[u8]) -> Result<Vec<IntegralCurve>, MeshAdvectError> {
    let mut r = Reader::new(buf);
    expect_kind(&mut r, KIND_CURVES)?;
    let n = r.take::<WireCount>()?.get();
    let mut out = Vec::with_capacity(n.min(buf.len() / WireCurveHead::SIZE));
    for _ in 0..n {
        let h: WireCurveHead = r.take()?;
        let status = match h.status {
            STATUS_OK => CurveStatus::Ok,
            STATUS_OOB => CurveStatus::OutOfBounds,
            STATUS_TERMINATED => CurveStatus::Terminated(
                TerminationReason::from_wire(h.reason).ok_or_else(|| {
                    MeshAdvectError::Wire(format!("unknown termination reason {}", h.reason))
                })?,
            ),
            s => return Err(MeshAdvectError::Wire(format!("unknown curve status {s}"))),
        };
        let n_cand = u32::from_le(h.n_candidates_le) as usize;
        let n_hist = u32::from_le(h.n_history_le) as usize;
        let seed_pt_domain_list = (0..n_cand)
            .map(|_| r.take::<WireDomain>().map(|d| d.get()))
            .collect::<Result<Vec<_>, _>>()?;
        let history = (0..n_hist)
            .map(|_| r.take::<WirePoint3>().map(|p| p.get()))
            .collect::<Result<Vec<_>, _>>()?;
        out.push(IntegralCurve {
            id: CurveId(u64::from_le(h.id_le)),
            counter: u32::from_le(h.counter_le),
            originating_rank: u32::from_le(h.originating_rank_le) as usize,
            location: h.loc_bits_le.map(|b| f64::from_bits(u64::from_le(b))),
            time: f64::from_bits(u64::from_le(h.time_bits_le)),
            domain: DomainId::new(u32::from_le(h.domain_le), u32::from_le(h.time_step_le)),
            seed_pt_domain_list,
            status,
            steps_taken: u32::from_le(h.steps_le),
            history,
        });
    }
    r.finish()?;
    Ok(out)
}

/// Decode a message produced by [`encode_control`].
pub fn decode_control(buf: &[u8]) -> Result<ControlMessage, MeshAdvectError> {
    let kind = peek_kind(buf)?;
    let mut r = Reader::new(buf);
    r.take::<WireHdr>()?;
    let msg = match kind {
        KIND_TERMINATE_COUNT => ControlMessage::TerminateCount(i64::from_le(r.take::<WireDelta>()?.delta_le)),
        KIND_ACK => {
            let a: WireAck = r.take()?;
            let id = CurveId(u64::from_le(a.id_le));
            let counter = u32::from_le(a.counter_le);
            match u32::from_le(a.used_le) {
                0 => ControlMessage::NotUsed { id, counter },
                1 => ControlMessage::Used { id, counter },
                u => return Err(MeshAdvectError::Wire(format!("ack flag {u} is neither 0 nor 1"))),
            }
        }
        k => return Err(MeshAdvectError::Wire(format!("unexpected control kind {k}"))),
    };
    r.finish()?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IntegralCurve {
        let mut c = IntegralCurve::new(CurveId(42), [0.25, -1.5, 3.0], 0.0, 3);
        c.counter = 7;
        c.domain = DomainId::new(5, 1);
        c.seed_pt_domain_list = vec![DomainId::new(5, 1), DomainId::new(6, 1)];
        c.move_to([0.5, -1.0, 3.0], 0.1);
        c.status = CurveStatus::OutOfBounds;
        c
    }

    #[test]
    fn curve_batch_roundtrip() {
        let mut done = sample();
        done.id = CurveId(43);
        done.terminate(TerminationReason::MaxSteps);
        let batch = vec![sample(), done];
        let bytes = encode_curves(&batch);
        assert_eq!(decode_curves(&bytes).unwrap(), batch);
    }

    #[test]
    fn unaligned_buffer_decodes() {
        let bytes = encode_curves(&[sample()]);
        let mut shifted = vec![0u8; 1];
        shifted.extend_from_slice(&bytes);
        assert_eq!(decode_curves(&shifted[1..]).unwrap(), vec![sample()]);
    }

    #[test]
    fn truncated_and_trailing_bytes_are_rejected() {
        let bytes = encode_curves(&[sample()]);
        assert!(matches!(
            decode_curves(&bytes[..bytes.len() - 1]),
            Err(MeshAdvectError::Wire(_))
        ));
        let mut long = bytes.clone();
        long.push(0);
        assert!(decode_curves(&long).is_err());
    }

    #[test]
    fn control_roundtrip_and_kind_guard() {
        for m in [
            ControlMessage::TerminateCount(-3),
            ControlMessage::Used { id: CurveId(9), counter: 2 },
            ControlMessage::NotUsed { id: CurveId(9), counter: 3 },
        ] {
            assert_eq!(decode_control(&encode_control(m)).unwrap(), m);
        }
        let curves = encode_curves(&[sample()]);
        assert!(decode_control(&curves).is_err());
        assert!(decode_curves(&encode_control(ControlMessage::TerminateCount(1))).is_err());
    }

    #[test]
    fn version_guard() {
        let mut bytes = encode_control(ControlMessage::TerminateCount(1));
        bytes[0] = 0xFF;
        assert!(peek_kind(&bytes).is_err());
        assert_eq!(WireHdr::new(1).version(), WIRE_VERSION);
    }
}
