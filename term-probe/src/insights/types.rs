//! Types making up an insight bundle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything derived from one composite report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightBundle {
    pub summary: SummaryInsights,
    pub business: BusinessInsights,
    pub performance: PerformanceInsights,
    pub quality: QualityInsights,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<Recommendation>,
    /// Generation time of the source composite report.
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub database: Option<String>,
    pub container_count: Option<u64>,
    pub total_records: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub average_rating: Option<f64>,
    pub hotel_count: Option<u64>,
    pub total_revenue: Option<f64>,
    pub average_booking_amount: Option<f64>,
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryInsights {
    pub overview: Overview,
    pub key_metrics: KeyMetrics,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueInsights {
    pub total_revenue: Option<f64>,
    pub average_booking_value: Option<f64>,
}

/// Booking rates in percent, derived from the status distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookingRates {
    pub total_bookings: u64,
    pub confirmation_rate: f64,
    pub cancellation_rate: f64,
}

impl BookingRates {
    /// Rates over `max(total, 1)`, so an empty distribution yields zeros.
    pub fn from_counts(total: u64, confirmed: u64, cancelled: u64) -> Self {
        let denominator = total.max(1) as f64;
        Self {
            total_bookings: total,
            confirmation_rate: confirmed as f64 / denominator * 100.0,
            cancellation_rate: cancelled as f64 / denominator * 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationalInsights {
    pub hotel_count: Option<u64>,
    pub average_rating: Option<f64>,
    pub price_range: Option<PriceRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessInsights {
    pub revenue: RevenueInsights,
    /// Present when the booking status distribution was computed.
    pub bookings: Option<BookingRates>,
    pub operational: OperationalInsights,
    pub growth_opportunities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceInsights {
    pub data_size_mb: Option<f64>,
    pub storage_size_mb: Option<f64>,
    pub index_count: Option<u64>,
    /// `data / storage * 100`, omitted when storage size is zero.
    pub storage_efficiency: Option<f64>,
    pub optimization_opportunities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityInsights {
    pub overall_score: Option<f64>,
    pub issues: Vec<String>,
    /// Percentage of records without null/empty values, per container.
    pub completeness: BTreeMap<String, f64>,
    pub improvement_suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighNullRatio,
    ExtremelyLowRating,
    CancellationsExceedConfirmations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub container: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Quality,
    Performance,
    Business,
    General,
}

/// One ranked recommendation. Rank 1 is the most important.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub rank: usize,
    pub source: RecommendationSource,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueOptimization {
    pub status_distribution: BTreeMap<String, u64>,
    /// Confirmed share of all bookings in percent; 0 when there are none.
    pub confirmation_rate: f64,
}

/// Hotel-management view of a business report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotelInsights {
    pub occupancy: OperationalInsights,
    pub revenue_optimization: Option<RevenueOptimization>,
    pub strategic_recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_rates() {
        let rates = BookingRates::from_counts(100, 80, 20);
        assert_eq!(rates.confirmation_rate, 80.0);
        assert_eq!(rates.cancellation_rate, 20.0);

        let empty = BookingRates::from_counts(0, 0, 0);
        assert_eq!(empty.confirmation_rate, 0.0);
        assert_eq!(empty.cancellation_rate, 0.0);
    }
}
