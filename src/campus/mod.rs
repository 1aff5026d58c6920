//! In-memory campus state
//!
//! - Parking lots and their simulated occupancy feed
//! - Spot reports, points, badges and reward redemption for the current user
//! - A short-lived notification tray

mod lots;
mod notifications;
mod rewards;

pub use lots::{campus_lots, AvailabilityBand, LotFeed, LotKind, OccupancyTrend, ParkingLot};
pub use notifications::{Notification, NotificationKind, NotificationTray};
pub use rewards::{
    leaderboard, reward_catalog, Badge, LeaderboardEntry, Profile, ReportOutcome, RewardCategory,
    RewardItem, SpotReport, SpotStatus, UserStats, MILESTONE_BADGE, MILESTONE_REPORTS,
};

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::assistant::ParkingAssistant;
use crate::config::CampusConfig;
use crate::error::{ReportError, RewardError};

/// Name recorded on reports made through this instance
const REPORTER: &str = "You";

/// Result of a successful spot report
#[derive(Debug, Clone, Serialize)]
pub struct SpotReceipt {
    pub report: SpotReport,
    pub lot: ParkingLot,
    pub outcome: ReportOutcome,
}

/// Lots, the user's profile and the notification tray behind one handle
#[derive(Clone)]
pub struct Campus {
    feed: LotFeed,
    profile: Arc<RwLock<Profile>>,
    tray: NotificationTray,
}

impl Campus {
    pub fn new(config: &CampusConfig) -> Self {
        Self::with_lots(campus_lots(), config)
    }

    pub fn with_lots(lots: Vec<ParkingLot>, config: &CampusConfig) -> Self {
        Self {
            feed: LotFeed::new(lots, config.change_probability),
            profile: Arc::new(RwLock::new(Profile::default())),
            tray: NotificationTray::new(config.notification_limit, config.notification_ttl()),
        }
    }

    pub fn feed(&self) -> &LotFeed {
        &self.feed
    }

    pub fn tray(&self) -> &NotificationTray {
        &self.tray
    }

    pub async fn profile(&self) -> Profile {
        self.profile.read().await.clone()
    }

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        leaderboard(&self.profile.read().await.stats)
    }

    /// Record that a spot in `lot_id` is about to open
    pub async fn report_spot(
        &self,
        lot_id: &str,
        status: SpotStatus,
    ) -> Result<SpotReceipt, ReportError> {
        let lot = self.feed.release_spot(lot_id).await?;
        let report = SpotReport::new(lot_id, status, REPORTER);
        let outcome = self.profile.write().await.record_report(report.clone());

        info!(
            "Spot reported in {} ({:?}), +{} pts",
            lot_id, status, outcome.points_awarded
        );
        self.tray
            .push(
                "Awesome!",
                format!(
                    "+{} pts earned. Thanks for helping out!",
                    outcome.points_awarded
                ),
                NotificationKind::Success,
            )
            .await;

        Ok(SpotReceipt {
            report,
            lot,
            outcome,
        })
    }

    /// Generate artwork for `name` and add the badge; nothing happens when no
    /// image comes back
    pub async fn unlock_badge(&self, name: &str, assistant: &ParkingAssistant) -> Option<Badge> {
        let image_url = assistant.badge_image(name).await?;

        self.profile
            .write()
            .await
            .award_badge(name, image_url.clone());
        info!("Badge unlocked: {}", name);

        self.tray
            .push(
                "New Achievement!",
                format!("You unlocked the {} badge!", name),
                NotificationKind::Success,
            )
            .await;

        Some(Badge {
            name: name.to_string(),
            image_url,
        })
    }

    pub async fn redeem(&self, reward_id: &str) -> Result<RewardItem, RewardError> {
        let reward = self.profile.write().await.redeem(reward_id)?;

        info!("Redeemed {} for {} pts", reward.title, reward.cost);
        self.tray
            .push("Success!", "Reward redeemed!", NotificationKind::Success)
            .await;

        Ok(reward)
    }
}
