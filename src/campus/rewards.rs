use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RewardError;

/// Reports needed to unlock [`MILESTONE_BADGE`]
pub const MILESTONE_REPORTS: u32 = 10;
pub const MILESTONE_BADGE: &str = "Campus Legend";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotStatus {
    LeavingNow,
    #[serde(rename = "leaving_5min")]
    Leaving5Min,
    #[serde(rename = "leaving_10min")]
    Leaving10Min,
}

impl SpotStatus {
    pub fn points(self) -> u32 {
        match self {
            SpotStatus::LeavingNow => 50,
            SpotStatus::Leaving5Min | SpotStatus::Leaving10Min => 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpotReport {
    pub id: Uuid,
    pub lot_id: String,
    pub status: SpotStatus,
    pub timestamp: DateTime<Utc>,
    pub reported_by: String,
    pub is_claimed: bool,
}

impl SpotReport {
    pub fn new(lot_id: &str, status: SpotStatus, reported_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            lot_id: lot_id.to_string(),
            status,
            timestamp: Utc::now(),
            reported_by: reported_by.to_string(),
            is_claimed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub points: u32,
    pub spots_reported: u32,
    /// Minutes
    pub time_saved: u32,
    pub rank: u32,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            points: 450,
            spots_reported: 8,
            time_saved: 120,
            rank: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RewardCategory {
    Food,
    Parking,
    Merch,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewardItem {
    pub id: &'static str,
    pub title: &'static str,
    pub cost: u32,
    pub description: &'static str,
    pub category: RewardCategory,
}

pub fn reward_catalog() -> Vec<RewardItem> {
    vec![
        RewardItem {
            id: "1",
            title: "Free Daily Parking Pass",
            cost: 500,
            description: "Redeem for one full day of parking in any Student lot.",
            category: RewardCategory::Parking,
        },
        RewardItem {
            id: "2",
            title: "50% Off Campus Cafe",
            cost: 200,
            description: "Get half off any beverage or pastry at the Student Union.",
            category: RewardCategory::Food,
        },
        RewardItem {
            id: "3",
            title: "ParkEasy Hoodie",
            cost: 2500,
            description: "Exclusive premium hoodie for top-tier spotters.",
            category: RewardCategory::Merch,
        },
        RewardItem {
            id: "4",
            title: "Reserved Spot (1hr)",
            cost: 1000,
            description: "Guarantee a spot in Lot A for your next arrival.",
            category: RewardCategory::Parking,
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct Badge {
    pub name: String,
    /// `data:` URL of the generated artwork
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub points: u32,
    pub reports: u32,
    pub is_user: bool,
}

/// The weekly board: four fixed spotters plus the current user
pub fn leaderboard(user: &UserStats) -> Vec<LeaderboardEntry> {
    let entry = |name: &str, points, reports| LeaderboardEntry {
        name: name.to_string(),
        points,
        reports,
        is_user: false,
    };

    let mut board = vec![
        entry("Sarah M.", 2450, 42),
        entry("Jason T.", 1980, 35),
        entry("Elena R.", 1720, 28),
        entry("David K.", 1400, 22),
        LeaderboardEntry {
            name: "You".to_string(),
            points: user.points,
            reports: user.spots_reported,
            is_user: true,
        },
    ];
    board.sort_by(|a, b| b.points.cmp(&a.points));
    board
}

/// What a single spot report earned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    pub points_awarded: u32,
    /// True only on the report that reaches the milestone
    pub milestone_reached: bool,
}

/// The current user's points, badges and report history
#[derive(Debug, Clone, Default, Serialize)]
pub struct Profile {
    pub stats: UserStats,
    pub badges: Vec<Badge>,
    pub reports: Vec<SpotReport>,
}

impl Profile {
    pub fn record_report(&mut self, report: SpotReport) -> ReportOutcome {
        let points_awarded = report.status.points();
        self.stats.points += points_awarded;
        self.stats.spots_reported += 1;
        self.reports.push(report);

        ReportOutcome {
            points_awarded,
            milestone_reached: self.stats.spots_reported == MILESTONE_REPORTS,
        }
    }

    pub fn redeem(&mut self, reward_id: &str) -> Result<RewardItem, RewardError> {
        let reward = reward_catalog()
            .into_iter()
            .find(|r| r.id == reward_id)
            .ok_or_else(|| RewardError::UnknownReward(reward_id.to_string()))?;

        if self.stats.points < reward.cost {
            return Err(RewardError::InsufficientPoints {
                cost: reward.cost,
                available: self.stats.points,
            });
        }

        self.stats.points -= reward.cost;
        Ok(reward)
    }

    pub fn award_badge(&mut self, name: &str, image_url: String) {
        self.badges.push(Badge {
            name: name.to_string(),
            image_url,
        });
    }
}
