//! Great-circle distance and radius-bounded proximity filtering.
//!
//! Everything here is synchronous and pure. Callers validate coordinates
//! before computing distances; the proximity filter silently drops items
//! whose coordinates are missing or out of range instead of failing.

use serde::{Deserialize, Serialize};

use crate::ports::GeolocationProvider;
use crate::CoreError;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius substituted when a caller asks for less than one kilometre.
pub const DEFAULT_MAX_RADIUS_KM: f64 = 50.0;

/// Region deltas scale as `radius / KM_PER_REGION_DELTA`.
const KM_PER_REGION_DELTA: f64 = 60.0;

/// Map centre when there is neither an origin nor any store to frame.
pub const FALLBACK_CENTER: Coordinate = Coordinate {
    latitude: 12.879_7,
    longitude: 121.774_0,
};

pub const FALLBACK_LATITUDE_DELTA: f64 = 0.0922;
pub const FALLBACK_LONGITUDE_DELTA: f64 = 0.0421;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCoordinate`] if latitude is outside
    /// `[-90, 90]` or longitude outside `[-180, 180]`.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoreError> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        if coordinate.is_valid() {
            Ok(coordinate)
        } else {
            Err(CoreError::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Haversine great-circle distance in kilometres.
#[must_use]
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1.0 for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Anything that can be placed on the map.
pub trait Locatable {
    /// The item's position, or `None` when it has no usable coordinate pair.
    fn coordinate(&self) -> Option<Coordinate>;
}

impl Locatable for Coordinate {
    fn coordinate(&self) -> Option<Coordinate> {
        self.is_valid().then_some(*self)
    }
}

impl<T: Locatable> Locatable for &T {
    fn coordinate(&self) -> Option<Coordinate> {
        (*self).coordinate()
    }
}

/// Map viewport: a centre plus half-spans in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRegion {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl ViewRegion {
    fn fixed_zoom(center: Coordinate) -> Self {
        Self {
            latitude: center.latitude,
            longitude: center.longitude,
            latitude_delta: FALLBACK_LATITUDE_DELTA,
            longitude_delta: FALLBACK_LONGITUDE_DELTA,
        }
    }

    fn framing(center: Coordinate, radius_km: f64) -> Self {
        let delta = radius_km / KM_PER_REGION_DELTA;
        Self {
            latitude: center.latitude,
            longitude: center.longitude,
            latitude_delta: delta,
            longitude_delta: delta,
        }
    }
}

/// An item that survived filtering, with its distance from the origin.
///
/// `distance_km` is `None` on the unfiltered branch (no origin available).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nearby<T> {
    pub item: T,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityResult<T> {
    pub visible: Vec<Nearby<T>>,
    pub region: ViewRegion,
    /// Radius actually applied, after sub-1 km reinterpretation.
    pub effective_radius_km: Option<f64>,
}

/// Tunables for [`ProximityPolicy::filter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityPolicy {
    pub default_max_radius_km: f64,
    pub fallback_center: Coordinate,
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self {
            default_max_radius_km: DEFAULT_MAX_RADIUS_KM,
            fallback_center: FALLBACK_CENTER,
        }
    }
}

impl ProximityPolicy {
    #[must_use]
    pub fn with_default_max_radius(default_max_radius_km: f64) -> Self {
        Self {
            default_max_radius_km,
            ..Self::default()
        }
    }

    /// Radii below 1 km mean "use the default wide radius", not "almost nothing".
    #[must_use]
    pub fn effective_radius(&self, radius_km: f64) -> f64 {
        if radius_km < 1.0 || radius_km.is_nan() {
            self.default_max_radius_km
        } else {
            radius_km
        }
    }

    /// Reduce `items` to those within the radius of `origin`, nearest first.
    ///
    /// Without an origin every item with a usable coordinate is returned in
    /// input order and the region falls back to a fixed zoom centred on the
    /// first such item (or [`ProximityPolicy::fallback_center`]).
    pub fn filter<T, I>(
        &self,
        origin: Option<Coordinate>,
        radius_km: f64,
        items: I,
    ) -> ProximityResult<T>
    where
        T: Locatable,
        I: IntoIterator<Item = T>,
    {
        let located = items.into_iter().filter_map(|item| {
            let coordinate = item.coordinate()?;
            Some((item, coordinate))
        });

        let Some(origin) = origin.filter(Coordinate::is_valid) else {
            let visible: Vec<Nearby<T>> = located
                .map(|(item, _)| Nearby {
                    item,
                    distance_km: None,
                })
                .collect();
            let center = visible
                .first()
                .and_then(|n| n.item.coordinate())
                .unwrap_or(self.fallback_center);
            return ProximityResult {
                visible,
                region: ViewRegion::fixed_zoom(center),
                effective_radius_km: None,
            };
        };

        let effective = self.effective_radius(radius_km);
        let mut visible: Vec<Nearby<T>> = located
            .filter_map(|(item, coordinate)| {
                let d = distance_km(origin, coordinate);
                (d <= effective).then_some(Nearby {
                    item,
                    distance_km: Some(d),
                })
            })
            .collect();
        // Stable sort keeps input order among equidistant stores.
        visible.sort_by(|a, b| {
            a.distance_km
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.distance_km.unwrap_or(f64::INFINITY))
        });

        ProximityResult {
            visible,
            region: ViewRegion::framing(origin, effective),
            effective_radius_km: Some(effective),
        }
    }
}

/// [`ProximityPolicy::filter`] with the default policy.
pub fn filter_by_proximity<T, I>(
    origin: Option<Coordinate>,
    radius_km: f64,
    items: I,
) -> ProximityResult<T>
where
    T: Locatable,
    I: IntoIterator<Item = T>,
{
    ProximityPolicy::default().filter(origin, radius_km, items)
}

/// A validated search request.
///
/// `radius_km: None` is the explicit way to ask for the default radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityQuery {
    pub origin: Coordinate,
    pub radius_km: Option<f64>,
}

impl ProximityQuery {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCoordinate`] for an out-of-range origin and
    /// [`CoreError::Validation`] for a radius that is not a positive number.
    pub fn new(origin: Coordinate, radius_km: Option<f64>) -> Result<Self, CoreError> {
        if !origin.is_valid() {
            return Err(CoreError::InvalidCoordinate {
                latitude: origin.latitude,
                longitude: origin.longitude,
            });
        }
        if let Some(r) = radius_km {
            if !r.is_finite() || r <= 0.0 {
                return Err(CoreError::validation(
                    "radius_km",
                    format!("must be greater than 0, got {r}"),
                ));
            }
        }
        Ok(Self { origin, radius_km })
    }

    pub fn run<T, I>(&self, policy: &ProximityPolicy, items: I) -> ProximityResult<T>
    where
        T: Locatable,
        I: IntoIterator<Item = T>,
    {
        let radius = self.radius_km.unwrap_or(policy.default_max_radius_km);
        policy.filter(Some(self.origin), radius, items)
    }
}

/// Ask the provider for a fix, treating any failure as "no origin".
pub async fn resolve_origin<P>(provider: &P) -> Option<Coordinate>
where
    P: GeolocationProvider + ?Sized,
{
    match provider.current_position().await {
        Ok(fix) if fix.coordinate.is_valid() => {
            tracing::debug!(accuracy_m = fix.accuracy_m, "geolocation fix acquired");
            Some(fix.coordinate)
        }
        Ok(fix) => {
            tracing::warn!(
                latitude = fix.coordinate.latitude,
                longitude = fix.coordinate.longitude,
                "geolocation provider returned an out-of-range fix; ignoring"
            );
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "geolocation unavailable; showing unfiltered stores");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{Fix, LocationError};

    fn coord(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate {
            latitude,
            longitude,
        }
    }

    /// A point `km` north of `origin`.
    fn north_of(origin: Coordinate, km: f64) -> Coordinate {
        coord(
            origin.latitude + (km / EARTH_RADIUS_KM).to_degrees(),
            origin.longitude,
        )
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Pin {
        name: &'static str,
        at: Option<Coordinate>,
    }

    impl Locatable for Pin {
        fn coordinate(&self) -> Option<Coordinate> {
            self.at.filter(Coordinate::is_valid)
        }
    }

    fn names<T>(result: &ProximityResult<T>, f: impl Fn(&T) -> &'static str) -> Vec<&'static str> {
        result.visible.iter().map(|n| f(&n.item)).collect()
    }

    #[test]
    fn distance_is_zero_for_same_point() {
        let a = coord(12.675, 123.871);
        assert!(distance_km(a, a).abs() < f64::EPSILON);
    }

    #[test]
    fn distance_is_symmetric() {
        let samples = [
            (coord(12.675, 123.871), coord(14.5995, 120.9842)),
            (coord(-33.8688, 151.2093), coord(51.5074, -0.1278)),
            (coord(89.9, 0.0), coord(-89.9, 179.9)),
            (coord(0.0, -180.0), coord(0.0, 180.0)),
        ];
        for (a, b) in samples {
            assert!(
                (distance_km(a, b) - distance_km(b, a)).abs() < 1e-9,
                "asymmetric for {a:?} / {b:?}"
            );
        }
    }

    #[test]
    fn distance_matches_known_city_pair() {
        // Manila to Cebu City is roughly 570 km.
        let manila = coord(14.5995, 120.9842);
        let cebu = coord(10.3157, 123.8854);
        let d = distance_km(manila, cebu);
        assert!((d - 570.0).abs() < 15.0, "got {d}");
    }

    #[test]
    fn antipodal_points_do_not_produce_nan() {
        let d = distance_km(coord(0.0, 0.0), coord(0.0, 180.0));
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn coordinate_new_rejects_out_of_range() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn three_km_radius_keeps_only_near_store() {
        let origin = coord(12.6750, 123.8710);
        let stores = vec![
            Pin {
                name: "far",
                at: Some(north_of(origin, 4.8)),
            },
            Pin {
                name: "near",
                at: Some(north_of(origin, 1.2)),
            },
        ];

        let result = filter_by_proximity(Some(origin), 3.0, stores);

        assert_eq!(names(&result, |p| p.name), vec!["near"]);
        assert!((result.region.latitude_delta - 3.0 / 60.0).abs() < 1e-9);
        assert!((result.region.longitude_delta - 3.0 / 60.0).abs() < 1e-9);
        assert!((result.region.latitude - origin.latitude).abs() < f64::EPSILON);
        let d = result.visible[0].distance_km.expect("distance present");
        assert!((d - 1.2).abs() < 0.01, "got {d}");
    }

    #[test]
    fn visible_is_sorted_by_distance() {
        let origin = coord(10.0, 120.0);
        let stores: Vec<Pin> = [7.0, 0.5, 3.0, 12.0, 1.0]
            .iter()
            .zip(["g", "a", "c", "l", "b"])
            .map(|(km, name)| Pin {
                name,
                at: Some(north_of(origin, *km)),
            })
            .collect();

        let result = filter_by_proximity(Some(origin), 20.0, stores);

        assert_eq!(names(&result, |p| p.name), vec!["a", "b", "c", "g", "l"]);
        let distances: Vec<f64> = result
            .visible
            .iter()
            .map(|n| n.distance_km.unwrap())
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn larger_radius_yields_superset() {
        let origin = coord(10.0, 120.0);
        let stores: Vec<Pin> = [2.0, 4.0, 8.0, 16.0, 32.0]
            .iter()
            .zip(["a", "b", "c", "d", "e"])
            .map(|(km, name)| Pin {
                name,
                at: Some(north_of(origin, *km)),
            })
            .collect();

        let radii = [1.0, 3.0, 5.0, 10.0, 20.0, 40.0];
        for pair in radii.windows(2) {
            let small = filter_by_proximity(Some(origin), pair[0], stores.clone());
            let large = filter_by_proximity(Some(origin), pair[1], stores.clone());
            for n in &small.visible {
                assert!(
                    large.visible.iter().any(|m| m.item == n.item),
                    "{} visible at {} km but not at {} km",
                    n.item.name,
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn sub_kilometre_radius_uses_default() {
        let origin = coord(10.0, 120.0);
        let stores: Vec<Pin> = [0.3, 5.0, 45.0, 55.0]
            .iter()
            .zip(["a", "b", "c", "d"])
            .map(|(km, name)| Pin {
                name,
                at: Some(north_of(origin, *km)),
            })
            .collect();

        let quirky = filter_by_proximity(Some(origin), 0.5, stores.clone());
        let explicit = filter_by_proximity(Some(origin), DEFAULT_MAX_RADIUS_KM, stores);

        assert_eq!(names(&quirky, |p| p.name), names(&explicit, |p| p.name));
        assert_eq!(names(&quirky, |p| p.name), vec!["a", "b", "c"]);
        assert_eq!(quirky.effective_radius_km, Some(DEFAULT_MAX_RADIUS_KM));
    }

    #[test]
    fn exactly_one_kilometre_is_taken_literally() {
        let policy = ProximityPolicy::default();
        assert!((policy.effective_radius(1.0) - 1.0).abs() < f64::EPSILON);
        assert!((policy.effective_radius(0.999) - DEFAULT_MAX_RADIUS_KM).abs() < f64::EPSILON);
        assert!((policy.effective_radius(-4.0) - DEFAULT_MAX_RADIUS_KM).abs() < f64::EPSILON);
    }

    #[test]
    fn no_origin_returns_all_located_items_unsorted() {
        let stores = vec![
            Pin {
                name: "first",
                at: Some(coord(14.0, 121.0)),
            },
            Pin {
                name: "missing",
                at: None,
            },
            Pin {
                name: "bogus",
                at: Some(coord(123.0, 400.0)),
            },
            Pin {
                name: "second",
                at: Some(coord(10.0, 123.0)),
            },
        ];

        let result = filter_by_proximity(None, 3.0, stores);

        assert_eq!(names(&result, |p| p.name), vec!["first", "second"]);
        assert!(result.visible.iter().all(|n| n.distance_km.is_none()));
        assert!((result.region.latitude - 14.0).abs() < f64::EPSILON);
        assert!((result.region.latitude_delta - FALLBACK_LATITUDE_DELTA).abs() < f64::EPSILON);
        assert!(result.effective_radius_km.is_none());
    }

    #[test]
    fn no_origin_and_no_stores_centres_on_fallback() {
        let result = filter_by_proximity::<Pin, _>(None, 3.0, Vec::new());
        assert!(result.visible.is_empty());
        assert_eq!(result.region.latitude, FALLBACK_CENTER.latitude);
        assert_eq!(result.region.longitude, FALLBACK_CENTER.longitude);
    }

    #[test]
    fn stores_without_coordinates_are_skipped_when_filtering() {
        let origin = coord(10.0, 120.0);
        let stores = vec![
            Pin {
                name: "nowhere",
                at: None,
            },
            Pin {
                name: "here",
                at: Some(origin),
            },
        ];
        let result = filter_by_proximity(Some(origin), 5.0, stores);
        assert_eq!(names(&result, |p| p.name), vec!["here"]);
    }

    #[test]
    fn query_rejects_non_positive_radius() {
        let origin = coord(10.0, 120.0);
        assert!(ProximityQuery::new(origin, Some(0.0)).is_err());
        assert!(ProximityQuery::new(origin, Some(-2.0)).is_err());
        assert!(ProximityQuery::new(origin, Some(f64::NAN)).is_err());
        assert!(ProximityQuery::new(coord(100.0, 0.0), None).is_err());
        assert!(ProximityQuery::new(origin, Some(0.5)).is_ok());
    }

    #[test]
    fn query_without_radius_uses_policy_default() {
        let origin = coord(10.0, 120.0);
        let policy = ProximityPolicy::with_default_max_radius(10.0);
        let stores = vec![
            Pin {
                name: "in",
                at: Some(north_of(origin, 9.0)),
            },
            Pin {
                name: "out",
                at: Some(north_of(origin, 11.0)),
            },
        ];
        let query = ProximityQuery::new(origin, None).unwrap();
        let result = query.run(&policy, stores);
        assert_eq!(names(&result, |p| p.name), vec!["in"]);
    }

    struct FixedProvider(Result<Fix, LocationError>);

    #[async_trait::async_trait]
    impl GeolocationProvider for FixedProvider {
        async fn current_position(&self) -> Result<Fix, LocationError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn resolve_origin_maps_denial_to_none() {
        let provider = FixedProvider(Err(LocationError::PermissionDenied));
        assert!(resolve_origin(&provider).await.is_none());
    }

    #[tokio::test]
    async fn resolve_origin_returns_fix() {
        let provider = FixedProvider(Ok(Fix {
            coordinate: coord(12.675, 123.871),
            accuracy_m: 15.0,
        }));
        assert_eq!(resolve_origin(&provider).await, Some(coord(12.675, 123.871)));
    }
}
