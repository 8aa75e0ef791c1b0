//! Geometry reprojection between coordinate reference systems.

use std::f64::consts::FRAC_PI_4;

use geo_types::{
    Coord, Geometry, GeometryCollection, Line, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon, Rect, Triangle,
};
use geofuse_core_common::{Crs, Feature};

use crate::error::ReprojectError;

/// Converts feature geometry from one CRS to another.
pub trait Reprojector: Send + Sync {
    /// Returns `feature` with its geometry expressed in `to`.
    ///
    /// # Errors
    ///
    /// Fails when no transform between `from` and `to` is available or a
    /// coordinate is outside the transform's domain.
    fn reproject(&self, feature: Feature, from: &Crs, to: &Crs) -> Result<Feature, ReprojectError>;
}

const EARTH_RADIUS: f64 = 6_378_137.0;
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KnownCrs {
    Geographic,
    WebMercator,
}

impl KnownCrs {
    fn parse(crs: &Crs) -> Option<Self> {
        let normalized: String = crs
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "EPSG:4326" | "OGC:CRS84" | "CRS84" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84"
            | "URN:OGC:DEF:CRS:EPSG::4326" => Some(KnownCrs::Geographic),
            "EPSG:3857" | "EPSG:900913" | "URN:OGC:DEF:CRS:EPSG::3857" => {
                Some(KnownCrs::WebMercator)
            },
            _ => None,
        }
    }
}

/// Reprojects between WGS 84 longitude/latitude (EPSG:4326) and spherical
/// Web Mercator (EPSG:3857).
///
/// Latitudes beyond the Mercator limit are clamped. Any other pair of
/// reference systems is rejected with [`ReprojectError::Unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl Reprojector for WebMercator {
    fn reproject(&self, mut feature: Feature, from: &Crs, to: &Crs) -> Result<Feature, ReprojectError> {
        let unsupported = || ReprojectError::Unsupported {
            from: from.clone(),
            to: to.clone(),
        };
        let source = KnownCrs::parse(from).ok_or_else(unsupported)?;
        let target = KnownCrs::parse(to).ok_or_else(unsupported)?;

        let transform: fn(Coord<f64>) -> Result<Coord<f64>, ReprojectError> = match (source, target) {
            (a, b) if a == b => return Ok(feature),
            (KnownCrs::Geographic, KnownCrs::WebMercator) => to_mercator,
            (KnownCrs::WebMercator, KnownCrs::Geographic) => to_geographic,
            _ => return Err(unsupported()),
        };

        if let Some(geometry) = feature.geometry.take() {
            feature.geometry = Some(map_coords(geometry, &transform)?);
        }
        Ok(feature)
    }
}

fn check_finite(c: Coord<f64>) -> Result<(), ReprojectError> {
    if c.x.is_finite() && c.y.is_finite() {
        Ok(())
    } else {
        Err(ReprojectError::OutOfDomain {
            x: c.x.to_string(),
            y: c.y.to_string(),
            reason: "coordinate is not finite".to_string(),
        })
    }
}

fn to_mercator(c: Coord<f64>) -> Result<Coord<f64>, ReprojectError> {
    check_finite(c)?;
    let lat = c.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Ok(Coord {
        x: EARTH_RADIUS * c.x.to_radians(),
        y: EARTH_RADIUS * (FRAC_PI_4 + lat / 2.0).tan().ln(),
    })
}

fn to_geographic(c: Coord<f64>) -> Result<Coord<f64>, ReprojectError> {
    check_finite(c)?;
    Ok(Coord {
        x: (c.x / EARTH_RADIUS).to_degrees(),
        y: (2.0 * (c.y / EARTH_RADIUS).exp().atan() - 2.0 * FRAC_PI_4).to_degrees(),
    })
}

type CoordFn<'a> = &'a dyn Fn(Coord<f64>) -> Result<Coord<f64>, ReprojectError>;

fn map_line_string(line: LineString<f64>, f: CoordFn<'_>) -> Result<LineString<f64>, ReprojectError> {
    line.0.into_iter().map(f).collect::<Result<Vec<_>, _>>().map(LineString)
}

fn map_polygon(polygon: Polygon<f64>, f: CoordFn<'_>) -> Result<Polygon<f64>, ReprojectError> {
    let (exterior, interiors) = polygon.into_inner();
    let interiors = interiors
        .into_iter()
        .map(|ring| map_line_string(ring, f))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(map_line_string(exterior, f)?, interiors))
}

fn map_coords(geometry: Geometry<f64>, f: CoordFn<'_>) -> Result<Geometry<f64>, ReprojectError> {
    Ok(match geometry {
        Geometry::Point(p) => Point::from(f(p.0)?).into(),
        Geometry::Line(l) => Line::new(f(l.start)?, f(l.end)?).into(),
        Geometry::LineString(l) => map_line_string(l, f)?.into(),
        Geometry::Polygon(p) => map_polygon(p, f)?.into(),
        Geometry::MultiPoint(m) => MultiPoint(
            m.0.into_iter()
                .map(|p| f(p.0).map(Point::from))
                .collect::<Result<_, _>>()?,
        )
        .into(),
        Geometry::MultiLineString(m) => MultiLineString(
            m.0.into_iter()
                .map(|l| map_line_string(l, f))
                .collect::<Result<_, _>>()?,
        )
        .into(),
        Geometry::MultiPolygon(m) => MultiPolygon(
            m.0.into_iter()
                .map(|p| map_polygon(p, f))
                .collect::<Result<_, _>>()?,
        )
        .into(),
        Geometry::GeometryCollection(c) => Geometry::GeometryCollection(GeometryCollection(
            c.0.into_iter()
                .map(|g| map_coords(g, f))
                .collect::<Result<_, _>>()?,
        )),
        Geometry::Rect(r) => Rect::new(f(r.min())?, f(r.max())?).into(),
        Geometry::Triangle(t) => {
            let [a, b, c] = t.to_array();
            Triangle::new(f(a)?, f(b)?, f(c)?).into()
        },
    })
}
