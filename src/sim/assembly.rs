//! Grid assembly model
//!
//! Stores placed parts, validates placement/removal and checks that the
//! structure forms a single piece under 6-directional adjacency.

use std::collections::VecDeque;
use std::fmt;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use super::part::{EquipmentKey, Part, PartId, PartTier, PartType, UnlockedEquipment};
use crate::consts::*;

/// Why a placement was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementError {
    /// The (type, tier) pair has not been unlocked yet
    NotUnlocked,
    /// Total or per-type part cap reached
    LimitReached,
    /// Target cell outside the build area
    OutOfBuildArea,
    /// Another part already occupies the target cell
    PositionOccupied,
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementError::NotUnlocked => f.write_str("part not unlocked"),
            PlacementError::LimitReached => f.write_str("part limit reached"),
            PlacementError::OutOfBuildArea => f.write_str("outside the build area"),
            PlacementError::PositionOccupied => f.write_str("position already occupied"),
        }
    }
}

impl std::error::Error for PlacementError {}

/// Result of a connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub connected: bool,
    /// Cells of parts not reachable from the first part
    pub disconnected: Vec<IVec3>,
}

/// The six face-neighbour offsets
const NEIGHBOR_OFFSETS: [IVec3; 6] = [
    IVec3::X,
    IVec3::NEG_X,
    IVec3::Y,
    IVec3::NEG_Y,
    IVec3::Z,
    IVec3::NEG_Z,
];

/// Two cells are adjacent iff they differ by one along exactly one axis
#[inline]
pub fn are_adjacent(a: IVec3, b: IVec3) -> bool {
    let d = (a - b).abs();
    d.x + d.y + d.z == 1
}

/// The assembled vehicle (ordered part list)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    parts: Vec<Part>,
    next_id: PartId,
}

impl Default for Vehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl Vehicle {
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            next_id: 1,
        }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn count_by_type(&self, part_type: PartType) -> usize {
        self.parts.iter().filter(|p| p.part_type == part_type).count()
    }

    /// Whether both caps leave room for another part of this type
    pub fn can_add(&self, part_type: PartType) -> bool {
        self.parts.len() < MAX_TOTAL_PARTS && self.count_by_type(part_type) < MAX_PARTS_PER_TYPE
    }

    pub fn has_part_at(&self, position: IVec3) -> bool {
        self.parts.iter().any(|p| p.position == position)
    }

    pub fn part_at(&self, position: IVec3) -> Option<&Part> {
        self.parts.iter().find(|p| p.position == position)
    }

    /// Whether a cell lies inside the build area
    pub fn in_build_area(position: IVec3) -> bool {
        position.x.abs() <= BUILD_AREA_LIMIT
            && position.z.abs() <= BUILD_AREA_LIMIT
            && position.y >= 0
    }

    /// Place a new part. State is untouched on failure.
    pub fn place_part(
        &mut self,
        part_type: PartType,
        tier: PartTier,
        target: IVec3,
        unlocked: &UnlockedEquipment,
    ) -> Result<PartId, PlacementError> {
        if !unlocked.contains(EquipmentKey::new(part_type, tier)) {
            return Err(PlacementError::NotUnlocked);
        }
        if !self.can_add(part_type) {
            return Err(PlacementError::LimitReached);
        }
        if !Self::in_build_area(target) {
            return Err(PlacementError::OutOfBuildArea);
        }
        if self.has_part_at(target) {
            return Err(PlacementError::PositionOccupied);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.parts.push(Part {
            id,
            part_type,
            tier,
            position: target,
            rotation: Vec3::ZERO,
        });
        Ok(id)
    }

    /// Remove whatever sits at `position`. Returns the removed part, if any.
    pub fn remove_part_at(&mut self, position: IVec3) -> Option<Part> {
        let idx = self.parts.iter().position(|p| p.position == position)?;
        Some(self.parts.remove(idx))
    }

    pub fn remove_part(&mut self, id: PartId) -> Option<Part> {
        let idx = self.parts.iter().position(|p| p.id == id)?;
        Some(self.parts.remove(idx))
    }

    pub fn clear(&mut self) {
        self.parts.clear();
    }

    /// Breadth-first connectivity check from the first part
    pub fn connectivity(&self) -> ConnectivityReport {
        if self.parts.len() <= 1 {
            return ConnectivityReport {
                connected: true,
                disconnected: Vec::new(),
            };
        }

        let mut visited = vec![false; self.parts.len()];
        let mut queue = VecDeque::new();
        visited[0] = true;
        queue.push_back(0usize);

        while let Some(current) = queue.pop_front() {
            let pos = self.parts[current].position;
            for offset in NEIGHBOR_OFFSETS {
                let neighbor = pos + offset;
                for (idx, part) in self.parts.iter().enumerate() {
                    if !visited[idx] && part.position == neighbor {
                        visited[idx] = true;
                        queue.push_back(idx);
                    }
                }
            }
        }

        let disconnected: Vec<IVec3> = self
            .parts
            .iter()
            .zip(&visited)
            .filter(|(_, seen)| !**seen)
            .map(|(part, _)| part.position)
            .collect();

        ConnectivityReport {
            connected: disconnected.is_empty(),
            disconnected,
        }
    }
}
