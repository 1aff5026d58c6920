use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::notifications::{NotificationKind, NotificationTray};
use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotKind {
    Student,
    Faculty,
    Visitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl std::fmt::Display for OccupancyTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OccupancyTrend::Increasing => "increasing",
            OccupancyTrend::Decreasing => "decreasing",
            OccupancyTrend::Stable => "stable",
        };
        f.write_str(name)
    }
}

/// How full a lot looks on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityBand {
    /// More than 20% free
    Open,
    /// More than 5% free
    Limited,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingLot {
    pub id: String,
    pub name: String,
    pub total_spots: u32,
    pub available_spots: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub kind: LotKind,
    pub trend: OccupancyTrend,
    pub color_code: String,
}

impl ParkingLot {
    pub fn availability_percent(&self) -> f64 {
        if self.total_spots == 0 {
            return 0.0;
        }
        self.available_spots as f64 / self.total_spots as f64 * 100.0
    }

    pub fn band(&self) -> AvailabilityBand {
        let pct = self.availability_percent();
        if pct > 20.0 {
            AvailabilityBand::Open
        } else if pct > 5.0 {
            AvailabilityBand::Limited
        } else {
            AvailabilityBand::Full
        }
    }

    /// Move availability by `delta`, clamped to `[0, total_spots]`
    fn adjust(&mut self, delta: i64) {
        let next = (self.available_spots as i64 + delta).clamp(0, self.total_spots as i64);
        self.available_spots = next as u32;
    }
}

#[allow(clippy::too_many_arguments)]
fn lot(
    id: &str,
    name: &str,
    total_spots: u32,
    available_spots: u32,
    latitude: f64,
    longitude: f64,
    kind: LotKind,
    trend: OccupancyTrend,
    color_code: &str,
) -> ParkingLot {
    ParkingLot {
        id: id.to_string(),
        name: name.to_string(),
        total_spots,
        available_spots,
        latitude,
        longitude,
        kind,
        trend,
        color_code: color_code.to_string(),
    }
}

/// The seeded campus lots
pub fn campus_lots() -> Vec<ParkingLot> {
    use LotKind::*;
    use OccupancyTrend::*;

    vec![
        lot("lot-a", "Lot A - Engineering Center", 250, 12, 37.8719, -122.2585, Student, Increasing, "#3b82f6"),
        lot("lot-b", "Lot B - Humanities Plaza", 150, 45, 37.8729, -122.2595, Faculty, Decreasing, "#ef4444"),
        lot("lot-c", "Lot C - Stadium West", 400, 8, 37.8709, -122.2605, Student, Stable, "#10b981"),
        lot("lot-d", "Lot D - Science Lab", 80, 2, 37.8740, -122.2570, Visitor, Increasing, "#f59e0b"),
    ]
}

/// In-memory lot records with a randomized occupancy simulation
///
/// Readers only ever get snapshots.
#[derive(Clone)]
pub struct LotFeed {
    lots: Arc<RwLock<Vec<ParkingLot>>>,
    change_probability: f64,
}

impl LotFeed {
    pub fn new(lots: Vec<ParkingLot>, change_probability: f64) -> Self {
        Self {
            lots: Arc::new(RwLock::new(lots)),
            change_probability: change_probability.clamp(0.0, 1.0),
        }
    }

    pub async fn snapshot(&self) -> Vec<ParkingLot> {
        self.lots.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ParkingLot> {
        self.lots.read().await.iter().find(|l| l.id == id).cloned()
    }

    /// Apply one simulation step.
    ///
    /// Each lot moves by one spot with `change_probability`. A spot opening
    /// in a nearly full lot (fewer than 2 free) raises an alert.
    pub async fn tick<R: Rng>(&self, rng: &mut R, tray: &NotificationTray) {
        let mut opened_in = Vec::new();

        {
            let mut lots = self.lots.write().await;
            for lot in lots.iter_mut() {
                if !rng.gen_bool(self.change_probability) {
                    continue;
                }

                let delta = if rng.gen_bool(0.5) { 1 } else { -1 };
                if delta == 1 && lot.available_spots < 2 {
                    opened_in.push(lot.name.clone());
                }
                lot.adjust(delta);
                debug!("{} now has {} spots", lot.id, lot.available_spots);
            }
        }

        for name in opened_in {
            tray.push(
                "Spot Alert!",
                format!("A spot just opened in {}.", name),
                NotificationKind::Success,
            )
            .await;
        }
    }

    /// A driver announced they are leaving: one more spot in `lot_id`
    pub async fn release_spot(&self, lot_id: &str) -> Result<ParkingLot, ReportError> {
        let mut lots = self.lots.write().await;
        let lot = lots
            .iter_mut()
            .find(|l| l.id == lot_id)
            .ok_or_else(|| ReportError::UnknownLot(lot_id.to_string()))?;

        lot.adjust(1);
        Ok(lot.clone())
    }

    /// Run `tick` forever on `interval`
    pub fn spawn_simulation(
        &self,
        interval: std::time::Duration,
        tray: NotificationTray,
    ) -> tokio::task::JoinHandle<()> {
        let feed = self.clone();
        info!("Lot feed simulation every {:?}", interval);

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                feed.tick(&mut rng, &tray).await;
            }
        })
    }
}
