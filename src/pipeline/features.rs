//! Raw trip record to model feature vector.
//!
//! All column-name lookups happen once, when the artifact is loaded, and are
//! baked into a [`FeatureLayout`]. Building a vector is then a fixed sequence
//! of positional writes into a zeroed array.

use std::collections::HashMap;

use tracing::debug;

use crate::models::artifacts::{ColumnIndex, ModelArtifact};
use crate::pipeline::encoding::TargetEncodingTable;
use crate::pipeline::record::TripRecord;
use crate::pipeline::timestamp::{PickupTime, TimestampParseError};
use crate::traits::features::FeatureVector;

/// Column names in the training schema.
pub mod columns {
    pub const TRIP_MILES: &str = "trip_miles";
    pub const HOUR_SIN: &str = "hour_sin";
    pub const HOUR_COS: &str = "hour_cos";
    pub const WEEKDAY: &str = "weekday";
    pub const IS_WEEKEND: &str = "is_weekend";
    pub const MONTH_NUM: &str = "month_num";
    pub const PICKUP_TE: &str = "pulocationid_te";
    pub const DROPOFF_TE: &str = "dolocationid_te";
}

/// Training-time columns that cannot be observed at pickup; they are
/// imputed with their training median.
pub const MEDIAN_IMPUTED: [&str; 9] = [
    "dur_min",
    "speed_mph",
    "req_to_pickup_min",
    "onscene_to_pickup_min",
    "pair_cnt",
    "pulocationid_cnt",
    "dolocationid_cnt",
    columns::PICKUP_TE,
    columns::DROPOFF_TE,
];

/// Categorical zone fields that are target encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneField {
    Pickup,
    Dropoff,
}

impl ZoneField {
    pub const ALL: [ZoneField; 2] = [ZoneField::Pickup, ZoneField::Dropoff];

    /// Key of this field in the target-encoding file
    pub fn table_name(self) -> &'static str {
        match self {
            ZoneField::Pickup => "pulocationid",
            ZoneField::Dropoff => "dolocationid",
        }
    }

    /// Feature column holding the encoded value
    pub fn column(self) -> &'static str {
        match self {
            ZoneField::Pickup => columns::PICKUP_TE,
            ZoneField::Dropoff => columns::DROPOFF_TE,
        }
    }

    fn select(self, record: &TripRecord) -> Option<i64> {
        match self {
            ZoneField::Pickup => record.pulocationid,
            ZoneField::Dropoff => record.dolocationid,
        }
    }
}

#[derive(Debug, Clone)]
struct EncodedColumn {
    field: ZoneField,
    position: usize,
    table: TargetEncodingTable,
}

/// Positions of every column the builder knows how to fill, resolved against
/// one artifact's column list. Columns the artifact lacks are `None` and are
/// never written.
#[derive(Debug, Clone)]
pub struct FeatureLayout {
    width: usize,
    trip_miles: Option<usize>,
    hour_sin: Option<usize>,
    hour_cos: Option<usize>,
    weekday: Option<usize>,
    is_weekend: Option<usize>,
    month_num: Option<usize>,
    imputed: Vec<(usize, f64)>,
    encoded: Vec<EncodedColumn>,
}

impl FeatureLayout {
    pub fn resolve(
        index: &ColumnIndex,
        tables: &HashMap<String, TargetEncodingTable>,
        medians: &HashMap<String, f64>,
    ) -> Self {
        let median = |name: &str| medians.get(name).copied().unwrap_or(0.0);

        let imputed = MEDIAN_IMPUTED
            .iter()
            .filter_map(|name| index.position(name).map(|pos| (pos, median(name))))
            .collect();

        let encoded = ZoneField::ALL
            .iter()
            .filter_map(|&field| {
                let position = index.position(field.column())?;
                // Without a trained table the column's median stands in as the global mean
                let table = tables
                    .get(field.table_name())
                    .cloned()
                    .unwrap_or_else(|| TargetEncodingTable::fallback_only(median(field.column())));
                Some(EncodedColumn { field, position, table })
            })
            .collect();

        Self {
            width: index.len(),
            trip_miles: index.position(columns::TRIP_MILES),
            hour_sin: index.position(columns::HOUR_SIN),
            hour_cos: index.position(columns::HOUR_COS),
            weekday: index.position(columns::WEEKDAY),
            is_weekend: index.position(columns::IS_WEEKEND),
            month_num: index.position(columns::MONTH_NUM),
            imputed,
            encoded,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of columns this layout writes; the rest stay at zero.
    pub fn populated(&self) -> usize {
        let direct = [
            self.trip_miles,
            self.hour_sin,
            self.hour_cos,
            self.weekday,
            self.is_weekend,
            self.month_num,
        ];
        let mut positions: Vec<usize> = direct.iter().flatten().copied().collect();
        positions.extend(self.imputed.iter().map(|(pos, _)| *pos));
        positions.extend(self.encoded.iter().map(|e| e.position));
        positions.sort_unstable();
        positions.dedup();
        positions.len()
    }
}

/// Builds model inputs from trip records.
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Build the feature vector for one record.
    ///
    /// Fails only when the pickup timestamp cannot be parsed; unknown or
    /// missing zone ids resolve through the target-encoding fallback.
    pub fn build(record: &TripRecord, artifact: &ModelArtifact) -> Result<FeatureVector, TimestampParseError> {
        Self::build_with_layout(record, artifact.layout())
    }

    pub fn build_with_layout(record: &TripRecord, layout: &FeatureLayout) -> Result<FeatureVector, TimestampParseError> {
        let pickup = PickupTime::parse(&record.pickup_dt_str)?;
        let mut vector = FeatureVector::zeros(layout.width);

        let mut put = |position: Option<usize>, value: f64| {
            if let Some(pos) = position {
                vector.set(pos, value);
            }
        };

        put(layout.trip_miles, record.trip_miles);
        put(layout.hour_sin, pickup.hour_sin());
        put(layout.hour_cos, pickup.hour_cos());
        put(layout.weekday, f64::from(pickup.weekday));
        put(layout.is_weekend, if pickup.is_weekend { 1.0 } else { 0.0 });
        put(layout.month_num, f64::from(pickup.month));

        for &(pos, median) in &layout.imputed {
            vector.set(pos, median);
        }

        // Encoded values overwrite the median imputation of the same column
        for encoded in &layout.encoded {
            let resolution = encoded.table.resolve(encoded.field.select(record));
            debug!(
                field = encoded.field.table_name(),
                source = ?resolution.source,
                value = resolution.value,
                "target encoded zone"
            );
            vector.set(encoded.position, resolution.value);
        }

        Ok(vector)
    }
}
