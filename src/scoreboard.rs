//! Per-team territory scores for the HUD.
//!
//! Coverage is measured on the union of a team's regions clipped to the
//! territory, so overlapping same-team regions and ground outside the playable
//! area never inflate a score.

use geo::{BooleanOps, Polygon};
use serde::{Deserialize, Serialize};
use crate::geo_utils::{multipolygon_area, to_multi, union_all};
use crate::{Region, Team, Territory};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One team's standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TeamScore {
    pub team: Team,
    pub region_count: u32,
    /// Covered territory area in m²
    pub area_m2: f64,
    /// Covered share of the territory, 0-100 with one decimal
    pub percent: f64,
}

/// Scores for every team at one registry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Scoreboard {
    /// One entry per team, in [`Team::ALL`] order
    pub scores: Vec<TeamScore>,
    pub total_regions: u32,
    /// Team with strictly the most covered area, if any
    pub leader: Option<Team>,
}

impl Scoreboard {
    pub fn score(&self, team: Team) -> Option<&TeamScore> {
        self.scores.iter().find(|s| s.team == team)
    }
}

/// Covered area (m²) and percentage of the territory for one team.
pub fn team_coverage(regions: &[Region], team: Team, territory: &Territory) -> (f64, f64) {
    let polygons: Vec<Polygon<f64>> = regions
        .iter()
        .filter(|r| r.owner_team == team)
        .map(Region::to_geo)
        .collect();
    if polygons.is_empty() {
        return (0.0, 0.0);
    }

    let covered = union_all(&polygons).intersection(&to_multi(territory.polygon().clone()));
    let area = multipolygon_area(&covered);
    (area, to_percent(area, territory.area_m2()))
}

/// Share of `total` as a percentage clamped to [0, 100] and rounded to one decimal.
pub fn to_percent(area: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let pct = (area / total * 100.0).clamp(0.0, 100.0);
    (pct * 10.0).round() / 10.0
}

fn score_team(regions: &[Region], team: Team, territory: &Territory) -> TeamScore {
    let (area_m2, percent) = team_coverage(regions, team, territory);
    TeamScore {
        team,
        region_count: regions.iter().filter(|r| r.owner_team == team).count() as u32,
        area_m2,
        percent,
    }
}

/// Compute the scoreboard from a registry snapshot.
pub fn compute_scoreboard(regions: &[Region], territory: &Territory) -> Scoreboard {
    #[cfg(feature = "parallel")]
    let scores: Vec<TeamScore> = Team::ALL
        .par_iter()
        .map(|&team| score_team(regions, team, territory))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let scores: Vec<TeamScore> = Team::ALL
        .iter()
        .map(|&team| score_team(regions, team, territory))
        .collect();

    let leader = leader_of(&scores);

    Scoreboard {
        scores,
        total_regions: regions.len() as u32,
        leader,
    }
}

fn leader_of(scores: &[TeamScore]) -> Option<Team> {
    let best = scores.iter().map(|s| s.area_m2).fold(0.0_f64, f64::max);
    if best <= 0.0 {
        return None;
    }
    let mut top = scores.iter().filter(|s| s.area_m2 == best);
    match (top.next(), top.next()) {
        (Some(only), None) => Some(only.team),
        _ => None,
    }
}
