// 🔋 Powertrain vocabulary
//
// Closed, versioned classification axis shared by every source.
// Revision 2 splits combustion and hybrid into diesel/petrol variants;
// `coarsen()` folds them back so both revisions compare at revision 1.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// REVISIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Revision {
    /// ICE, BEV, FCEV, PHEV, HEV, CNG, HCE
    V1,
    /// V1 plus diesel/petrol sub-splits of ICE and HEV
    V2,
}

// ============================================================================
// POWER TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PowerType {
    /// Internal combustion engine
    ICE,
    /// Battery electric vehicle
    BEV,
    /// Fuel cell electric vehicle
    FCEV,
    /// Plug-in hybrid electric vehicle
    PHEV,
    /// Hybrid electric vehicle (not chargeable from the grid)
    HEV,
    /// Compressed natural gas / LPG
    CNG,
    /// Hydrogen combustion engine
    HCE,
    IceDiesel,
    IcePetrol,
    HevDiesel,
    HevPetrol,
}

impl PowerType {
    /// Revision 1 vocabulary
    pub const V1: [PowerType; 7] = [
        PowerType::ICE,
        PowerType::BEV,
        PowerType::FCEV,
        PowerType::PHEV,
        PowerType::HEV,
        PowerType::CNG,
        PowerType::HCE,
    ];

    /// Revision 2 vocabulary (coarse categories are never removed)
    pub const V2: [PowerType; 11] = [
        PowerType::ICE,
        PowerType::BEV,
        PowerType::FCEV,
        PowerType::PHEV,
        PowerType::HEV,
        PowerType::CNG,
        PowerType::HCE,
        PowerType::IceDiesel,
        PowerType::IcePetrol,
        PowerType::HevDiesel,
        PowerType::HevPetrol,
    ];

    pub fn vocabulary(revision: Revision) -> &'static [PowerType] {
        match revision {
            Revision::V1 => &Self::V1,
            Revision::V2 => &Self::V2,
        }
    }

    /// First revision in which this category exists
    pub fn introduced_in(&self) -> Revision {
        match self {
            PowerType::IceDiesel
            | PowerType::IcePetrol
            | PowerType::HevDiesel
            | PowerType::HevPetrol => Revision::V2,
            _ => Revision::V1,
        }
    }

    /// Map a finer category to its revision-1 parent
    pub fn coarsen(&self) -> PowerType {
        match self {
            PowerType::IceDiesel | PowerType::IcePetrol => PowerType::ICE,
            PowerType::HevDiesel | PowerType::HevPetrol => PowerType::HEV,
            other => *other,
        }
    }

    /// Sub-split categories refine a parent; they are never counted alongside it
    pub fn is_subcategory(&self) -> bool {
        self.coarsen() != *self
    }

    /// Everything except conventional combustion counts as an alternative powertrain
    pub fn is_alternative(&self) -> bool {
        self.coarsen() != PowerType::ICE
    }

    /// Plug-in vehicles (BEV + PHEV) make up the "EV" aggregate
    pub fn is_plug_in(&self) -> bool {
        matches!(self, PowerType::BEV | PowerType::PHEV)
    }

    pub fn code(&self) -> &'static str {
        match self {
            PowerType::ICE => "ICE",
            PowerType::BEV => "BEV",
            PowerType::FCEV => "FCEV",
            PowerType::PHEV => "PHEV",
            PowerType::HEV => "HEV",
            PowerType::CNG => "CNG",
            PowerType::HCE => "HCE",
            PowerType::IceDiesel => "ICE-D",
            PowerType::IcePetrol => "ICE-P",
            PowerType::HevDiesel => "HEV-D",
            PowerType::HevPetrol => "HEV-P",
        }
    }

    pub fn from_code(code: &str) -> Option<PowerType> {
        Self::V2.iter().copied().find(|p| p.code() == code.trim())
    }
}

impl fmt::Display for PowerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Fold counts recorded under any revision into revision-1 totals.
///
/// Sub-split counts are only added when their parent was not reported
/// directly, so a source printing both "Hybrid" and "Hybrid (Diesel)"
/// is not double counted.
pub fn coarsen_counts<I>(counts: I) -> std::collections::BTreeMap<PowerType, i64>
where
    I: IntoIterator<Item = (PowerType, i64)>,
{
    use std::collections::BTreeMap;

    let mut direct: BTreeMap<PowerType, i64> = BTreeMap::new();
    let mut folded: BTreeMap<PowerType, i64> = BTreeMap::new();

    for (power_type, count) in counts {
        if power_type.is_subcategory() {
            *folded.entry(power_type.coarsen()).or_insert(0) += count;
        } else {
            *direct.entry(power_type).or_insert(0) += count;
        }
    }

    for (parent, count) in folded {
        direct.entry(parent).or_insert(count);
    }

    direct
}
