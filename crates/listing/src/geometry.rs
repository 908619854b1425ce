//! Geometry parsing for spatial filters.
//!
//! Geometries travel through the listing as WKT text and are bound as
//! query parameters; parsing here only validates the text and measures
//! bounding boxes.

use std::str::FromStr;

use geo::BoundingRect;
use geo_types::Geometry;

use crate::error::{ListingError, ListingResult};

/// Parse WKT into a geometry, naming `field` on failure.
pub fn parse_wkt(field: &'static str, wkt: &str) -> ListingResult<Geometry<f64>> {
    wkt::Wkt::from_str(wkt)
        .map_err(|e| ListingError::invalid(field, format!("cannot parse geometry {wkt:?}: {e}")))
        .and_then(|w| {
            w.try_into().map_err(|e: wkt::conversion::Error| {
                ListingError::invalid(field, format!("unsupported geometry {wkt:?}: {e:?}"))
            })
        })
}

/// Normalize a bounding box to a WKT polygon.
///
/// Accepts a WKT polygon or four comma-separated numbers
/// `minX,minY,maxX,maxY`.
pub fn parse_bounding_box(text: &str) -> ListingResult<String> {
    let text = text.trim();
    if let Some(rest) = text
        .get(..7)
        .filter(|keyword| keyword.eq_ignore_ascii_case("POLYGON"))
        .map(|_| &text[7..])
    {
        let text = format!("POLYGON{rest}");
        return match parse_wkt("bbox", &text)? {
            Geometry::Polygon(_) => Ok(text),
            _ => Err(ListingError::invalid("bbox", "expected a polygon")),
        };
    }

    let coords = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ListingError::invalid("bbox", format!("{text:?}: {e}")))?;
    let [min_x, min_y, max_x, max_y] = coords[..] else {
        return Err(ListingError::invalid(
            "bbox",
            format!("expected minX,minY,maxX,maxY, got {text:?}"),
        ));
    };
    if !coords.iter().all(|c| c.is_finite()) {
        return Err(ListingError::invalid(
            "bbox",
            format!("coordinates must be finite, got {text:?}"),
        ));
    }

    Ok(format!(
        "POLYGON(({min_x} {min_y}, {min_x} {max_y}, {max_x} {max_y}, {max_x} {min_y}, {min_x} {min_y}))"
    ))
}

/// Width of the geometry's bounding rectangle.
pub fn bounding_width(field: &'static str, wkt: &str) -> ListingResult<f64> {
    parse_wkt(field, wkt)?
        .bounding_rect()
        .map(|rect| rect.width())
        .ok_or_else(|| ListingError::invalid(field, "empty geometry"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn four_numbers_make_a_closed_ring() {
        let wkt = parse_bounding_box("0,10,200,300").unwrap();
        assert_eq!(wkt, "POLYGON((0 10, 0 300, 200 300, 200 10, 0 10))");
        assert!(parse_wkt("bbox", &wkt).is_ok());
    }

    #[test]
    fn polygon_text_is_kept() {
        let text = "POLYGON((0 0, 0 5, 5 5, 5 0, 0 0))";
        assert_eq!(parse_bounding_box(text).unwrap(), text);
    }

    #[test]
    fn polygon_keyword_is_case_insensitive() {
        assert_eq!(
            parse_bounding_box("polygon((0 0, 0 5, 5 5, 5 0, 0 0))").unwrap(),
            "POLYGON((0 0, 0 5, 5 5, 5 0, 0 0))"
        );
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        for text in ["NaN,0,10,10", "0,0,inf,10", "0,-infinity,10,10"] {
            let err = parse_bounding_box(text).unwrap_err();
            assert_eq!(err.field(), Some("bbox"), "{text}");
        }
    }

    #[test]
    fn rejects_other_shapes() {
        for bad in ["1,2,3", "1,2,3,4,5", "a,b,c,d", "POLYGON((0 0, 1", ""] {
            let err = parse_bounding_box(bad).unwrap_err();
            assert_eq!(err.field(), Some("bbox"), "{bad}");
        }
    }

    #[test]
    fn width_of_bounding_rect() {
        let width = bounding_width("bbox", "POLYGON((10 0, 10 5, 60 5, 60 0, 10 0))").unwrap();
        assert!((width - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_parses() {
        assert!(matches!(
            parse_wkt("baseAnnotation", "POINT(1 2)").unwrap(),
            Geometry::Point(_)
        ));
    }
}
