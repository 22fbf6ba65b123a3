use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// WGS84 bounding box, [west, south, east, north] on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn extend(&mut self, x: f64, y: f64) {
        if x < self.min_x {
            self.min_x = x;
        }
        if y < self.min_y {
            self.min_y = y;
        }
        if x > self.max_x {
            self.max_x = x;
        }
        if y > self.max_y {
            self.max_y = y;
        }
    }

    pub fn merge(&mut self, other: &Bounds) {
        self.extend(other.min_x, other.min_y);
        self.extend(other.max_x, other.max_y);
    }

    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// Summary produced by spatial ingestion for one spatial table.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct IngestSummary {
    pub table_name: String,
    pub srid: i32,
    pub feature_count: i64,
    pub bounds: [f64; 4],
    pub geometry_types: Vec<String>,
    pub property_fields: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_and_centroid() {
        let mut b = Bounds::empty();
        assert!(b.is_empty());
        b.extend(10.0, 20.0);
        b.extend(-10.0, 40.0);
        assert!(!b.is_empty());
        assert_eq!(b.to_array(), [-10.0, 20.0, 10.0, 40.0]);
        assert_eq!(b.centroid(), (0.0, 30.0));
    }

    #[test]
    fn merge_covers_both() {
        let mut a = Bounds::empty();
        a.extend(0.0, 0.0);
        let mut b = Bounds::empty();
        b.extend(5.0, -3.0);
        a.merge(&b);
        assert_eq!(a.to_array(), [0.0, -3.0, 5.0, 0.0]);
    }
}
