use serde_json::Value;

/// Axis-aligned bounding rectangle in image-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Option<Self> {
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }
        if min_x > max_x || min_y > max_y {
            return None;
        }
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

fn xy(value: &Value) -> Option<(f64, f64)> {
    let x = value.get("x")?.as_f64()?;
    let y = value.get("y")?.as_f64()?;
    Some((x, y))
}

/// Maps a label record to an optional bounding box, checking shape tags in
/// order: polygon `regions`, point `position`, box `centre`+`size`. Only the
/// first matching shape is used. Pure and total: never panics.
pub fn extract_bbox(label: &Value) -> Option<BoundingBox> {
    if let Some(regions) = label
        .get("regions")
        .and_then(Value::as_array)
        .filter(|r| !r.is_empty())
    {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut any = false;
        for ring in regions {
            let Some(points) = ring.as_array() else {
                continue;
            };
            for point in points {
                let Some((x, y)) = xy(point) else { continue };
                any = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
        if !any {
            return None;
        }
        return BoundingBox::new(min_x, min_y, max_x, max_y);
    }

    if let Some(position) = label.get("position") {
        let (x, y) = xy(position)?;
        return BoundingBox::new(x, y, x, y);
    }

    if let (Some(centre), Some(size)) = (label.get("centre"), label.get("size")) {
        let (cx, cy) = xy(centre)?;
        let (sx, sy) = xy(size)?;
        let (hw, hh) = (sx / 2.0, sy / 2.0);
        return BoundingBox::new(cx - hw, cy - hh, cx + hw, cy + hh);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn polygon_bbox_spans_all_points() {
        let label = json!({
            "regions": [
                [{"x": 0.0, "y": 0.0}, {"x": 10.0, "y": 5.0}],
                [{"x": -2.0, "y": 3.0}]
            ]
        });
        let bbox = extract_bbox(&label).unwrap();
        assert_eq!(bbox, BoundingBox::new(-2.0, 0.0, 10.0, 5.0).unwrap());
    }

    #[test]
    fn empty_regions_has_no_bbox() {
        assert!(extract_bbox(&json!({"regions": []})).is_none());
    }

    #[test]
    fn empty_regions_falls_through_to_position() {
        let label = json!({"regions": [], "position": {"x": 5.0, "y": 5.0}});
        let bbox = extract_bbox(&label).unwrap();
        assert_eq!(bbox, BoundingBox::new(5.0, 5.0, 5.0, 5.0).unwrap());
    }

    #[test]
    fn point_is_degenerate_box() {
        let label = json!({"position": {"x": 3.0, "y": 4.0}});
        let bbox = extract_bbox(&label).unwrap();
        assert_eq!(bbox, BoundingBox::new(3.0, 4.0, 3.0, 4.0).unwrap());
    }

    #[test]
    fn centre_and_size_produce_box() {
        let label = json!({"centre": {"x": 10.0, "y": 10.0}, "size": {"x": 4.0, "y": 2.0}});
        let bbox = extract_bbox(&label).unwrap();
        assert_eq!(bbox, BoundingBox::new(8.0, 9.0, 12.0, 11.0).unwrap());
    }

    #[test]
    fn shape_priority_prefers_earlier_row() {
        // has both regions and position: regions wins
        let label = json!({
            "regions": [[{"x": 1.0, "y": 1.0}]],
            "position": {"x": 99.0, "y": 99.0}
        });
        let bbox = extract_bbox(&label).unwrap();
        assert_eq!(bbox, BoundingBox::new(1.0, 1.0, 1.0, 1.0).unwrap());
    }

    #[test]
    fn no_recognizable_shape_is_none() {
        assert!(extract_bbox(&json!({"caption": "no geometry here"})).is_none());
    }

    #[test]
    fn non_numeric_coordinate_is_rejected() {
        let label = json!({"position": {"x": "not-a-number", "y": 1.0}});
        assert!(extract_bbox(&label).is_none());
    }
}
