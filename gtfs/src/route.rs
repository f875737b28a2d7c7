use std::path::Path;

use anyhow::{Context, Result};
use geojson::GeoJson;
use geom::{Distance, GPSBounds, LonLat, PolyLine, Pt2D};

/// The path a route takes, used to turn a vehicle's position into a fraction along the route.
pub struct RouteGeometry {
    // (longitude, latitude), as given
    points: Vec<(f64, f64)>,
    gps_bounds: GPSBounds,
    pl: PolyLine,
}

impl RouteGeometry {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        let mut gps_bounds = GPSBounds::new();
        for (lon, lat) in &points {
            if !lon.is_finite() || !lat.is_finite() {
                bail!("Route geometry has a bad point ({lon}, {lat})");
            }
            gps_bounds.update(LonLat::new(*lon, *lat));
        }
        let pts: Vec<Pt2D> = points
            .iter()
            .map(|(lon, lat)| LonLat::new(*lon, *lat).to_pt(&gps_bounds))
            .collect();
        let pts = Pt2D::approx_dedupe(pts, Distance::meters(1.0));
        if pts.len() < 2 {
            bail!(
                "Route geometry needs at least 2 distinct points, got {}",
                pts.len()
            );
        }
        // TODO The route could double back on itself. Projection then picks whichever piece is
        // closest.
        let pl = PolyLine::unchecked_new(pts);
        Ok(Self {
            points,
            gps_bounds,
            pl,
        })
    }

    /// Reads either a JSON list of [longitude, latitude] pairs, or GeoJSON with a LineString.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs_err::read_to_string(path)?;
        let points = parse_points(&contents)
            .with_context(|| format!("reading route geometry from {}", path.display()))?;
        Self::new(points)
    }

    /// Writes the points back out in the list-of-pairs format.
    pub fn write_points<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let pairs: Vec<[f64; 2]> = self.points.iter().map(|(x, y)| [*x, *y]).collect();
        fs_err::write(path, serde_json::to_string_pretty(&pairs)?)?;
        Ok(())
    }

    /// Returns the fraction of the way along the route (0 to 1) of the closest point on the route
    /// to this position. This is planar, not geodesic.
    pub fn project(&self, longitude: f64, latitude: f64) -> Option<f64> {
        if !longitude.is_finite() || !latitude.is_finite() {
            return None;
        }
        let pt = LonLat::new(longitude, latitude).to_pt(&self.gps_bounds);
        let (dist, _) = self.pl.dist_along_of_point(self.pl.project_pt(pt))?;
        Some((dist / self.pl.length()).clamp(0.0, 1.0))
    }
}

fn parse_points(contents: &str) -> Result<Vec<(f64, f64)>> {
    let contents = contents.trim_start_matches('\u{feff}');
    if contents.trim_start().starts_with('[') {
        let pairs: Vec<[f64; 2]> = serde_json::from_str(contents)?;
        return Ok(pairs.into_iter().map(|[x, y]| (x, y)).collect());
    }

    let gj: GeoJson = contents.parse()?;
    let geometry = match gj {
        GeoJson::Geometry(geometry) => Some(geometry),
        GeoJson::Feature(feature) => feature.geometry,
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .find_map(|feature| feature.geometry),
    };
    match geometry.map(|g| g.value) {
        Some(geojson::Value::LineString(pts)) => Ok(pts
            .into_iter()
            .filter(|pt| pt.len() >= 2)
            .map(|pt| (pt[0], pt[1]))
            .collect()),
        _ => bail!("GeoJSON doesn't have a LineString"),
    }
}
