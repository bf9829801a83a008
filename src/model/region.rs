use serde::{Deserialize, Serialize};

/// Region code used for the aggregate path appended to every forecast run.
pub const NATIONAL_REGION_CODE: &str = "national";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionProfile {
    pub code: String,
    pub name: String,
    /// Structural premium (positive) or discount (negative) versus the national price.
    pub premium_coefficient: f64,
    /// Relative volatility; 1.0 matches the national series.
    pub volatility_factor: f64,
    /// 0..1, higher means more station competition.
    pub competition_index: f64,
    /// 0..1, higher means better supply infrastructure.
    pub infrastructure_score: f64,
    /// Weight of this region in the national aggregate.
    #[serde(default = "default_aggregate_weight")]
    pub aggregate_weight: f64,
    /// Adjacent regions, used by spatially smoothed forecasters.
    #[serde(default)]
    pub neighbors: Vec<String>,
}

fn default_aggregate_weight() -> f64 {
    1.0
}

impl RegionProfile {
    /// Blend of competition, infrastructure and stability; 1.0 is a perfectly stable market.
    pub fn stability_score(&self) -> f64 {
        self.competition_index * 0.4
            + self.infrastructure_score * 0.3
            + (2.0 - self.volatility_factor) * 0.3
    }
}

fn region(
    code: &str,
    name: &str,
    premium: f64,
    volatility: f64,
    competition: f64,
    infrastructure: f64,
    neighbors: &[&str],
) -> RegionProfile {
    RegionProfile {
        code: code.to_string(),
        name: name.to_string(),
        premium_coefficient: premium,
        volatility_factor: volatility,
        competition_index: competition,
        infrastructure_score: infrastructure,
        aggregate_weight: 1.0,
        neighbors: neighbors.iter().map(|s| s.to_string()).collect(),
    }
}

/// The 17 metropolitan and provincial regions of the domestic retail market.
pub fn default_region_profiles() -> Vec<RegionProfile> {
    vec![
        region("seoul", "Seoul", 0.02, 0.95, 0.9, 1.0, &["gyeonggi", "incheon"]),
        region("busan", "Busan", 0.01, 1.05, 0.75, 0.85, &["ulsan", "gyeongnam"]),
        region("daegu", "Daegu", 0.008, 1.08, 0.7, 0.8, &["gyeongbuk", "gyeongnam"]),
        region("incheon", "Incheon", 0.005, 1.02, 0.8, 0.9, &["seoul", "gyeonggi"]),
        region("gwangju", "Gwangju", 0.012, 1.1, 0.65, 0.75, &["jeonnam", "jeonbuk"]),
        region("daejeon", "Daejeon", 0.01, 1.06, 0.72, 0.8, &["sejong", "chungnam", "chungbuk"]),
        region("ulsan", "Ulsan", -0.015, 1.03, 0.68, 0.82, &["busan", "gyeongbuk", "gyeongnam"]),
        region("sejong", "Sejong", 0.02, 1.12, 0.6, 0.75, &["daejeon", "chungnam", "chungbuk"]),
        region(
            "gyeonggi",
            "Gyeonggi",
            -0.01,
            0.98,
            0.85,
            0.95,
            &["seoul", "incheon", "gangwon", "chungbuk", "chungnam"],
        ),
        region(
            "gangwon",
            "Gangwon",
            0.025,
            1.15,
            0.55,
            0.65,
            &["gyeonggi", "chungbuk", "gyeongbuk"],
        ),
        region(
            "chungbuk",
            "Chungbuk",
            0.018,
            1.12,
            0.6,
            0.7,
            &["gyeonggi", "gangwon", "chungnam", "daejeon", "sejong", "gyeongbuk", "jeonbuk"],
        ),
        region(
            "chungnam",
            "Chungnam",
            0.008,
            1.08,
            0.65,
            0.75,
            &["gyeonggi", "chungbuk", "daejeon", "sejong", "jeonbuk"],
        ),
        region(
            "jeonbuk",
            "Jeonbuk",
            0.02,
            1.18,
            0.5,
            0.65,
            &["chungnam", "chungbuk", "gyeongbuk", "gyeongnam", "jeonnam", "gwangju"],
        ),
        region("jeonnam", "Jeonnam", 0.015, 1.15, 0.55, 0.7, &["jeonbuk", "gwangju", "gyeongnam"]),
        region(
            "gyeongbuk",
            "Gyeongbuk",
            0.022,
            1.2,
            0.48,
            0.6,
            &["gangwon", "chungbuk", "jeonbuk", "daegu", "ulsan", "gyeongnam"],
        ),
        region(
            "gyeongnam",
            "Gyeongnam",
            0.01,
            1.1,
            0.62,
            0.72,
            &["gyeongbuk", "daegu", "busan", "ulsan", "jeonbuk", "jeonnam"],
        ),
        region("jeju", "Jeju", 0.04, 1.25, 0.4, 0.55, &[]),
    ]
}
