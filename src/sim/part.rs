//! Vehicle parts and their static stats

use std::fmt;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Part categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartType {
    Fuselage,
    Wing,
    Engine,
    Cockpit,
}

impl PartType {
    pub const ALL: [PartType; 4] = [
        PartType::Fuselage,
        PartType::Wing,
        PartType::Engine,
        PartType::Cockpit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartType::Fuselage => "Fuselage",
            PartType::Wing => "Wing",
            PartType::Engine => "Engine",
            PartType::Cockpit => "Cockpit",
        }
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Part quality level
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PartTier {
    #[default]
    Normal,
    Vip,
}

/// A (type, tier) pair that can be unlocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EquipmentKey {
    #[serde(rename = "type")]
    pub part_type: PartType,
    pub tier: PartTier,
}

impl EquipmentKey {
    pub fn new(part_type: PartType, tier: PartTier) -> Self {
        Self { part_type, tier }
    }
}

impl fmt::Display for EquipmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tier {
            PartTier::Normal => write!(f, "{}", self.part_type),
            PartTier::Vip => write!(f, "Golden {}", self.part_type),
        }
    }
}

/// Static per-(type, tier) stats
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartStats {
    pub weight: f32,
    /// Thrust (engines only)
    pub power: f32,
    /// Lift (wings only)
    pub lift: f32,
    /// Fuselage stability bonus (display only)
    pub stability: f32,
    /// Cockpit control bonus (display only)
    pub control: f32,
}

impl PartStats {
    const fn new(weight: f32, power: f32, lift: f32, stability: f32, control: f32) -> Self {
        Self {
            weight,
            power,
            lift,
            stability,
            control,
        }
    }

    /// Stats lookup. Every pair resolves to a non-negative weight.
    pub const fn lookup(part_type: PartType, tier: PartTier) -> Self {
        match (part_type, tier) {
            (PartType::Fuselage, PartTier::Normal) => Self::new(2.0, 0.0, 0.0, 1.0, 0.0),
            (PartType::Fuselage, PartTier::Vip) => Self::new(1.0, 0.0, 0.0, 1.8, 0.0),
            (PartType::Wing, PartTier::Normal) => Self::new(0.5, 0.0, 1.0, 0.0, 0.0),
            (PartType::Wing, PartTier::Vip) => Self::new(0.2, 0.0, 2.0, 0.0, 0.0),
            (PartType::Engine, PartTier::Normal) => Self::new(3.0, 1.0, 0.0, 0.0, 0.0),
            (PartType::Engine, PartTier::Vip) => Self::new(1.0, 2.5, 0.0, 0.0, 0.0),
            (PartType::Cockpit, PartTier::Normal) => Self::new(1.5, 0.0, 0.0, 0.0, 1.0),
            (PartType::Cockpit, PartTier::Vip) => Self::new(0.5, 0.0, 0.0, 0.0, 1.8),
        }
    }
}

/// Unique part identifier within a vehicle
pub type PartId = u32;

/// A placed part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub part_type: PartType,
    pub tier: PartTier,
    /// Grid cell
    pub position: IVec3,
    /// Euler XYZ rotation (radians)
    #[serde(default)]
    pub rotation: Vec3,
}

impl Part {
    #[inline]
    pub fn stats(&self) -> PartStats {
        PartStats::lookup(self.part_type, self.tier)
    }

    #[inline]
    pub fn key(&self) -> EquipmentKey {
        EquipmentKey::new(self.part_type, self.tier)
    }
}

/// Append-only set of unlocked (type, tier) pairs, in unlock order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<EquipmentKey>", into = "Vec<EquipmentKey>")]
pub struct UnlockedEquipment {
    items: Vec<EquipmentKey>,
}

impl From<Vec<EquipmentKey>> for UnlockedEquipment {
    fn from(items: Vec<EquipmentKey>) -> Self {
        Self::from_items(items)
    }
}

impl From<UnlockedEquipment> for Vec<EquipmentKey> {
    fn from(unlocked: UnlockedEquipment) -> Self {
        unlocked.items
    }
}

impl UnlockedEquipment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = EquipmentKey>) -> Self {
        let mut unlocked = Self::new();
        for item in items {
            unlocked.unlock(item);
        }
        unlocked
    }

    pub fn contains(&self, key: EquipmentKey) -> bool {
        self.items.contains(&key)
    }

    /// Add a key. Returns true if it was not already unlocked.
    pub fn unlock(&mut self, key: EquipmentKey) -> bool {
        if self.contains(key) {
            return false;
        }
        self.items.push(key);
        true
    }

    pub fn items(&self) -> &[EquipmentKey] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pair_has_non_negative_weight() {
        for part_type in PartType::ALL {
            for tier in [PartTier::Normal, PartTier::Vip] {
                let stats = PartStats::lookup(part_type, tier);
                assert!(stats.weight >= 0.0, "{:?}/{:?}", part_type, tier);
            }
        }
    }

    #[test]
    fn test_only_engines_have_power_and_only_wings_lift() {
        for part_type in PartType::ALL {
            for tier in [PartTier::Normal, PartTier::Vip] {
                let stats = PartStats::lookup(part_type, tier);
                assert_eq!(stats.power > 0.0, part_type == PartType::Engine);
                assert_eq!(stats.lift > 0.0, part_type == PartType::Wing);
            }
        }
    }

    #[test]
    fn test_vip_parts_are_lighter() {
        for part_type in PartType::ALL {
            let normal = PartStats::lookup(part_type, PartTier::Normal);
            let vip = PartStats::lookup(part_type, PartTier::Vip);
            assert!(vip.weight < normal.weight);
        }
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let mut unlocked = UnlockedEquipment::new();
        let key = EquipmentKey::new(PartType::Engine, PartTier::Vip);
        assert!(unlocked.unlock(key));
        assert!(!unlocked.unlock(key));
        assert_eq!(unlocked.len(), 1);
        assert!(unlocked.contains(key));
    }

    #[test]
    fn test_loaded_list_drops_duplicates() {
        let json = r#"[{"type":"Wing","tier":"vip"},{"type":"Engine","tier":"normal"},{"type":"Wing","tier":"vip"}]"#;
        let unlocked: UnlockedEquipment = serde_json::from_str(json).unwrap();
        assert_eq!(
            unlocked.items(),
            &[
                EquipmentKey::new(PartType::Wing, PartTier::Vip),
                EquipmentKey::new(PartType::Engine, PartTier::Normal),
            ]
        );
        assert_eq!(
            serde_json::to_string(&unlocked).unwrap(),
            r#"[{"type":"Wing","tier":"vip"},{"type":"Engine","tier":"normal"}]"#
        );
    }

    #[test]
    fn test_equipment_key_json_shape() {
        let key = EquipmentKey::new(PartType::Wing, PartTier::Vip);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"type":"Wing","tier":"vip"}"#);
    }
}
