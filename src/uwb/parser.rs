//! # TWR Packet Parser
//!
//! Parses the payloads extracted by the framer. Two packet types matter:
//! assignment packets (act_type 2) carry the three ranging groups and the
//! mode flags; distance packets (act_type 4) carry a matrix of TWR values
//! whose layout is derived from the current assignment. Everything else is
//! consumed and ignored.
//!
//! The parser's only durable state is the current [`Assignment`]. Group 3 may
//! contain sentinel zero slots that a later distance packet resolves in
//! place, so the assignment is mutated as distance packets arrive.

use crate::constants::{
    MAX_DISTANCE_METERS, MODE_GROUP1_INTERNAL, MODE_GROUP2_INTERNAL, PACKET_TYPE_ASSIGNMENT,
    PACKET_TYPE_DISTANCE, TWR_TO_METERS,
};
use crate::error::UwbBridgeError;
use crate::uwb::{Edge, NodeId};
use log::{debug, warn};
use nom::multi::count;
use nom::number::complete::{le_i8, le_u16, le_u8};
use nom::IResult;

/// Preamble shared by every packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketPreamble {
    pub act_type: u8,
    pub act_slot: i8,
    pub timeframe: u16,
}

/// The three ranging groups announced by an assignment packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub group1: Vec<NodeId>,
    pub group2: Vec<NodeId>,
    pub group3: Vec<NodeId>,
    /// Mode flags: bit 0 enables intra-group-1 ranging, bit 1 intra-group-2.
    pub mode: u8,
    pub tx_power: u8,
    /// Sentinel zero slots in group 3, captured when the assignment was
    /// parsed. Every following distance packet carries this many trailing
    /// node ids that overwrite the trailing slots of group 3 in order.
    pub unassigned: usize,
}

impl Assignment {
    /// Number of TWR values a distance packet carries for this assignment.
    pub fn tof_count(&self) -> usize {
        let g1 = self.group1.len();
        let g2 = self.group2.len();
        let g3 = self.group3.len();
        let mut n = g1 * g2 + g1 * g3 + g2 * g3;
        if self.mode & MODE_GROUP1_INTERNAL != 0 {
            n += g1 * g1.saturating_sub(1) / 2;
        }
        if self.mode & MODE_GROUP2_INTERNAL != 0 {
            n += g2 * g2.saturating_sub(1) / 2;
        }
        n
    }

    /// All three groups present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.group1.is_empty() && !self.group2.is_empty() && !self.group3.is_empty()
    }
}

/// Outcome of handling one packet payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketEvent {
    /// An assignment packet replaced the held assignment.
    AssignmentUpdated,
    /// A distance packet produced these edges (possibly none after gating).
    Edges(Vec<Edge>),
    /// The packet was tolerated but produced nothing: an unknown act_type,
    /// or a distance packet with no usable assignment held.
    Ignored,
}

/// Check if a raw TWR value is valid: positive and within the distance cap.
pub fn twr_value_ok(value: u16) -> bool {
    value > 0 && TWR_TO_METERS * (value as f64) < MAX_DISTANCE_METERS
}

/// Stateful parser for framed UWB payloads.
#[derive(Debug, Default)]
pub struct TwrParser {
    assignment: Option<Assignment>,
}

impl TwrParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently held assignment, if any.
    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    /// Discard the held assignment (after a device reset).
    pub fn reset(&mut self) {
        self.assignment = None;
    }

    /// Handle one framed payload.
    ///
    /// Truncated payloads return an error and leave the packet dropped; a
    /// malformed assignment additionally discards the held assignment, since
    /// the group layout it would have replaced is unknown.
    pub fn handle_payload(&mut self, payload: &[u8]) -> Result<PacketEvent, UwbBridgeError> {
        let (body, preamble) = parse_preamble(payload)
            .map_err(|_| UwbBridgeError::PacketParseError("payload too short for preamble".into()))?;

        match preamble.act_type {
            PACKET_TYPE_ASSIGNMENT => {
                debug!(
                    "Assignment packet: slot={}, timeframe={}",
                    preamble.act_slot, preamble.timeframe
                );
                match parse_assignment_body(body) {
                    Ok((_, assignment)) => {
                        debug!(
                            "New assignments: group1={}, group2={}, group3={} (mode={:#x}, {} unassigned)",
                            assignment.group1.len(),
                            assignment.group2.len(),
                            assignment.group3.len(),
                            assignment.mode,
                            assignment.unassigned
                        );
                        self.assignment = Some(assignment);
                        Ok(PacketEvent::AssignmentUpdated)
                    }
                    Err(_) => {
                        self.assignment = None;
                        Err(UwbBridgeError::PacketParseError(
                            "assignment group data incomplete".into(),
                        ))
                    }
                }
            }
            PACKET_TYPE_DISTANCE => self.handle_distance(body),
            other => {
                debug!("Ignoring packet with act_type={other}");
                Ok(PacketEvent::Ignored)
            }
        }
    }

    fn handle_distance(&mut self, body: &[u8]) -> Result<PacketEvent, UwbBridgeError> {
        let assignment = match self.assignment.as_mut() {
            Some(a) if a.is_complete() => a,
            _ => {
                warn!("Distance packet received but no valid assignment held, skipping");
                return Ok(PacketEvent::Ignored);
            }
        };

        let tof_count = assignment.tof_count();
        let twr_bytes = tof_count * 2;
        let needed = twr_bytes + assignment.unassigned * 2;
        if body.len() < needed {
            return Err(UwbBridgeError::PacketParseError(format!(
                "distance payload truncated: need {needed} bytes, have {}",
                body.len()
            )));
        }

        // Resolve sentinel slots of group 3 from the trailing ids before any
        // edges are paired, so this packet's measurements use the new ids.
        let g3_len = assignment.group3.len();
        for i in 0..assignment.unassigned {
            let off = twr_bytes + i * 2;
            let id = u16::from_le_bytes([body[off], body[off + 1]]);
            assignment.group3[g3_len - assignment.unassigned + i] = NodeId(id);
        }

        let values: Vec<u16> = body[..twr_bytes]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();

        let mut edges = Vec::with_capacity(tof_count);
        let mut idx = 0usize;
        let mut emit = |a: NodeId, b: NodeId, value: u16| {
            if twr_value_ok(value) {
                edges.push(Edge::new(a, b, (TWR_TO_METERS * value as f64) as f32));
            }
        };

        for &a in &assignment.group1 {
            for &b in &assignment.group2 {
                emit(a, b, values[idx]);
                idx += 1;
            }
        }
        for &a in &assignment.group1 {
            for &b in &assignment.group3 {
                emit(a, b, values[idx]);
                idx += 1;
            }
        }
        for &a in &assignment.group2 {
            for &b in &assignment.group3 {
                emit(a, b, values[idx]);
                idx += 1;
            }
        }
        if assignment.mode & MODE_GROUP1_INTERNAL != 0 {
            for i in 0..assignment.group1.len() {
                for j in (i + 1)..assignment.group1.len() {
                    emit(assignment.group1[i], assignment.group1[j], values[idx]);
                    idx += 1;
                }
            }
        }
        if assignment.mode & MODE_GROUP2_INTERNAL != 0 {
            for i in 0..assignment.group2.len() {
                for j in (i + 1)..assignment.group2.len() {
                    emit(assignment.group2[i], assignment.group2[j], values[idx]);
                    idx += 1;
                }
            }
        }

        Ok(PacketEvent::Edges(edges))
    }
}

fn parse_preamble(input: &[u8]) -> IResult<&[u8], PacketPreamble> {
    let (input, act_type) = le_u8(input)?;
    let (input, act_slot) = le_i8(input)?;
    let (input, timeframe) = le_u16(input)?;
    Ok((
        input,
        PacketPreamble {
            act_type,
            act_slot,
            timeframe,
        },
    ))
}

fn parse_assignment_body(input: &[u8]) -> IResult<&[u8], Assignment> {
    let (input, tx_power) = le_u8(input)?;
    let (input, mode) = le_u8(input)?;
    let (input, g1) = le_u8(input)?;
    let (input, g2) = le_u8(input)?;
    let (input, g3) = le_u8(input)?;
    let (input, group1) = count(le_u16, g1 as usize)(input)?;
    let (input, group2) = count(le_u16, g2 as usize)(input)?;
    let (input, group3) = count(le_u16, g3 as usize)(input)?;

    let group3: Vec<NodeId> = group3.into_iter().map(NodeId).collect();
    let unassigned = group3.iter().filter(|id| id.0 == 0).count();
    Ok((
        input,
        Assignment {
            group1: group1.into_iter().map(NodeId).collect(),
            group2: group2.into_iter().map(NodeId).collect(),
            group3,
            mode,
            tx_power,
            unassigned,
        },
    ))
}
