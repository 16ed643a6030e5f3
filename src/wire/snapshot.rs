//! Server -> client world snapshot frame
//!
//! `f64 time | u16 n, player* | u16 n, vehicle* | u16 n, npc*`

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{ensure, get_id, get_quat, get_vec3, put_id, put_quat, put_vec3, Actions, WireError};

/// Upper bound on wheels per vehicle record
pub const MAX_WHEELS: usize = 8;

const PLAYER_RECORD_BOUND: usize = 1 + 255 + 12 + 16 + 12 + 16 + 2 + 2;
const NPC_RECORD_BOUND: usize = 1 + 255 + 12 + 16 + 12 + 16 + 2;
const WHEEL_RECORD_LEN: usize = 12 + 16;
const SEAT_RECORD_BOUND: usize = 1 + 255 + 12;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub velocity: [f32; 3],
    pub view_rotation: [f32; 4],
    pub actions: Actions,
    pub last_processed_seq: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WheelRecord {
    /// Wheel position relative to the vehicle body
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeatRecord {
    /// Occupant session id; encoded as a zero-length id when empty
    pub occupant: Option<String>,
    pub position: [f32; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub id: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub horn: bool,
    pub wheels: Vec<WheelRecord>,
    pub seats: Vec<SeatRecord>,
    pub last_processed_seq: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NpcRecord {
    pub id: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub velocity: [f32; 3],
    pub view_rotation: [f32; 4],
    pub actions: Actions,
}

/// Full dynamic state of one world at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    /// Server wall-clock time in milliseconds
    pub time: f64,
    pub players: Vec<PlayerRecord>,
    pub vehicles: Vec<VehicleRecord>,
    pub npcs: Vec<NpcRecord>,
}

fn count_u16(len: usize, what: &'static str) -> Result<u16, WireError> {
    u16::try_from(len).map_err(|_| WireError::TooMany(what))
}

fn count_u8(len: usize, what: &'static str) -> Result<u8, WireError> {
    u8::try_from(len).map_err(|_| WireError::TooMany(what))
}

impl WorldSnapshot {
    fn capacity_bound(&self) -> usize {
        let vehicles: usize = self
            .vehicles
            .iter()
            .map(|v| {
                1 + 255 + 12 + 16 + 12 + 12 + 1 + 1
                    + v.wheels.len() * WHEEL_RECORD_LEN
                    + 1
                    + v.seats.len() * SEAT_RECORD_BOUND
                    + 2
            })
            .sum();
        8 + 2 + self.players.len() * PLAYER_RECORD_BOUND + 2 + vehicles + 2
            + self.npcs.len() * NPC_RECORD_BOUND
    }

    /// Serialize into a buffer sized to an upper bound, then trimmed
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(self.capacity_bound());
        buf.put_f64(self.time);

        buf.put_u16(count_u16(self.players.len(), "player")?);
        for p in &self.players {
            put_id(&mut buf, &p.id);
            put_vec3(&mut buf, &p.position);
            put_quat(&mut buf, &p.rotation);
            put_vec3(&mut buf, &p.velocity);
            put_quat(&mut buf, &p.view_rotation);
            buf.put_u16(p.actions.bits());
            buf.put_u16(p.last_processed_seq);
        }

        buf.put_u16(count_u16(self.vehicles.len(), "vehicle")?);
        for v in &self.vehicles {
            if v.wheels.len() > MAX_WHEELS {
                return Err(WireError::TooMany("wheel"));
            }
            put_id(&mut buf, &v.id);
            put_vec3(&mut buf, &v.position);
            put_quat(&mut buf, &v.rotation);
            put_vec3(&mut buf, &v.linear_velocity);
            put_vec3(&mut buf, &v.angular_velocity);
            buf.put_u8(u8::from(v.horn));
            buf.put_u8(v.wheels.len() as u8);
            for w in &v.wheels {
                put_vec3(&mut buf, &w.position);
                put_quat(&mut buf, &w.rotation);
            }
            buf.put_u8(count_u8(v.seats.len(), "seat")?);
            for s in &v.seats {
                put_id(&mut buf, s.occupant.as_deref().unwrap_or(""));
                put_vec3(&mut buf, &s.position);
            }
            buf.put_u16(v.last_processed_seq);
        }

        buf.put_u16(count_u16(self.npcs.len(), "npc")?);
        for n in &self.npcs {
            put_id(&mut buf, &n.id);
            put_vec3(&mut buf, &n.position);
            put_quat(&mut buf, &n.rotation);
            put_vec3(&mut buf, &n.velocity);
            put_quat(&mut buf, &n.view_rotation);
            buf.put_u16(n.actions.bits());
        }

        Ok(buf.freeze())
    }

    pub fn decode(mut buf: impl Buf) -> Result<Self, WireError> {
        ensure(&buf, 10)?;
        let time = buf.get_f64();

        let player_count = buf.get_u16() as usize;
        let mut players = Vec::with_capacity(player_count.min(256));
        for _ in 0..player_count {
            let id = get_id(&mut buf)?;
            let position = get_vec3(&mut buf)?;
            let rotation = get_quat(&mut buf)?;
            let velocity = get_vec3(&mut buf)?;
            let view_rotation = get_quat(&mut buf)?;
            ensure(&buf, 4)?;
            players.push(PlayerRecord {
                id,
                position,
                rotation,
                velocity,
                view_rotation,
                actions: Actions::from_bits_retain(buf.get_u16()),
                last_processed_seq: buf.get_u16(),
            });
        }

        ensure(&buf, 2)?;
        let vehicle_count = buf.get_u16() as usize;
        let mut vehicles = Vec::with_capacity(vehicle_count.min(256));
        for _ in 0..vehicle_count {
            let id = get_id(&mut buf)?;
            let position = get_vec3(&mut buf)?;
            let rotation = get_quat(&mut buf)?;
            let linear_velocity = get_vec3(&mut buf)?;
            let angular_velocity = get_vec3(&mut buf)?;
            ensure(&buf, 2)?;
            let horn = buf.get_u8() != 0;
            let wheel_count = buf.get_u8() as usize;
            if wheel_count > MAX_WHEELS {
                return Err(WireError::TooMany("wheel"));
            }
            let mut wheels = Vec::with_capacity(wheel_count);
            for _ in 0..wheel_count {
                wheels.push(WheelRecord {
                    position: get_vec3(&mut buf)?,
                    rotation: get_quat(&mut buf)?,
                });
            }
            ensure(&buf, 1)?;
            let seat_count = buf.get_u8() as usize;
            let mut seats = Vec::with_capacity(seat_count);
            for _ in 0..seat_count {
                let occupant = get_id(&mut buf)?;
                seats.push(SeatRecord {
                    occupant: (!occupant.is_empty()).then_some(occupant),
                    position: get_vec3(&mut buf)?,
                });
            }
            ensure(&buf, 2)?;
            vehicles.push(VehicleRecord {
                id,
                position,
                rotation,
                linear_velocity,
                angular_velocity,
                horn,
                wheels,
                seats,
                last_processed_seq: buf.get_u16(),
            });
        }

        ensure(&buf, 2)?;
        let npc_count = buf.get_u16() as usize;
        let mut npcs = Vec::with_capacity(npc_count.min(256));
        for _ in 0..npc_count {
            let id = get_id(&mut buf)?;
            let position = get_vec3(&mut buf)?;
            let rotation = get_quat(&mut buf)?;
            let velocity = get_vec3(&mut buf)?;
            let view_rotation = get_quat(&mut buf)?;
            ensure(&buf, 2)?;
            npcs.push(NpcRecord {
                id,
                position,
                rotation,
                velocity,
                view_rotation,
                actions: Actions::from_bits_retain(buf.get_u16()),
            });
        }

        Ok(Self {
            time,
            players,
            vehicles,
            npcs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorldSnapshot {
        WorldSnapshot {
            time: 1_700_000_000_123.0,
            players: vec![
                PlayerRecord {
                    id: "3f1c2a9e-0000-4000-8000-000000000001".into(),
                    position: [0.0, 5.0, 0.0],
                    rotation: [0.0, 0.3826834, 0.0, 0.9238795],
                    velocity: [0.0, -1.5, -4.0],
                    view_rotation: [0.1, 0.0, 0.0, 0.995],
                    actions: Actions::MOVE_FORWARD | Actions::AIM,
                    last_processed_seq: 65535,
                },
                PlayerRecord {
                    id: "p2".into(),
                    position: [-10.0, 1.0, 22.5],
                    rotation: [0.0, 0.0, 0.0, 1.0],
                    velocity: [0.0; 3],
                    view_rotation: [0.0, 0.0, 0.0, 1.0],
                    actions: Actions::empty(),
                    last_processed_seq: 0,
                },
            ],
            vehicles: vec![VehicleRecord {
                id: "car-1".into(),
                position: [3.0, 0.8, -7.0],
                rotation: [0.0, 0.0, 0.0, 1.0],
                linear_velocity: [0.0, 0.0, 12.0],
                angular_velocity: [0.0, 0.2, 0.0],
                horn: true,
                wheels: (0..4)
                    .map(|i| WheelRecord {
                        position: [i as f32, -0.2, 1.5],
                        rotation: [0.0, 0.0, 0.0, 1.0],
                    })
                    .collect(),
                seats: vec![
                    SeatRecord {
                        occupant: Some("3f1c2a9e-0000-4000-8000-000000000001".into()),
                        position: [0.45, 0.6, 0.2],
                    },
                    SeatRecord {
                        occupant: None,
                        position: [-0.5, 0.6, 0.2],
                    },
                ],
                last_processed_seq: 42,
            }],
            npcs: vec![NpcRecord {
                id: "npc".into(),
                position: [4.0, 1.0, 4.0],
                rotation: [0.0, 1.0, 0.0, 0.0],
                velocity: [2.8, 0.0, 0.8],
                view_rotation: [0.0, 1.0, 0.0, 0.0],
                actions: Actions::AIM | Actions::SHOOT,
            }],
        }
    }

    #[test]
    fn snapshot_survives_encode_decode() {
        let snapshot = sample();
        let bytes = snapshot.encode().unwrap();
        assert!(bytes.len() < snapshot.capacity_bound());
        let decoded = WorldSnapshot::decode(bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn empty_world_is_fourteen_bytes() {
        let bytes = WorldSnapshot::default().encode().unwrap();
        assert_eq!(bytes.len(), 8 + 2 + 2 + 2);
        assert_eq!(WorldSnapshot::decode(bytes).unwrap(), WorldSnapshot::default());
    }

    #[test]
    fn every_prefix_fails_cleanly() {
        let bytes = sample().encode().unwrap();
        for cut in 0..bytes.len() {
            assert!(
                matches!(
                    WorldSnapshot::decode(bytes.slice(..cut)),
                    Err(WireError::Truncated { .. })
                ),
                "prefix of {cut} bytes"
            );
        }
    }

    #[test]
    fn too_many_wheels_is_refused() {
        let mut snapshot = sample();
        snapshot.vehicles[0].wheels = vec![
            WheelRecord {
                position: [0.0; 3],
                rotation: [0.0, 0.0, 0.0, 1.0],
            };
            MAX_WHEELS + 1
        ];
        assert_eq!(snapshot.encode(), Err(WireError::TooMany("wheel")));
    }
}
