use std::collections::HashMap;

use crate::error::{consistency_error, quality_error, skipped_info, ValidationError};
use crate::navigator::{find_all, get_attr, get_child_text, inner_base_line, inner_base_offset};
use crate::{Document, Format};

use super::{Rule, RuleRunConfig};

const NETEX_ONLY: &[Format] = &[Format::Netex];
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

fn parse_location(inner_xml: &str, base_offset: usize, base_line: u32) -> Option<(f64, f64)> {
    let location = find_all(inner_xml, "Location", base_offset, base_line)
        .into_iter()
        .next()?;
    let lat = get_child_text(&location.inner_xml, "Latitude")?.parse::<f64>().ok()?;
    let lon = get_child_text(&location.inner_xml, "Longitude")?.parse::<f64>().ok()?;
    Some((lat, lon))
}

fn haversine_meters(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// Centroid/Location lives nested one level deeper than Location itself for
/// StopPlace/Quay (`Centroid/Location`), but directly under
/// ScheduledStopPoint (`Location`). This helper finds either shape.
fn centroid_location(inner_xml: &str, base_offset: usize, base_line: u32) -> Option<(f64, f64)> {
    if let Some(centroid) = find_all(inner_xml, "Centroid", base_offset, base_line).into_iter().next() {
        return parse_location(&centroid.inner_xml, inner_base_offset(&centroid), inner_base_line(&centroid));
    }
    parse_location(inner_xml, base_offset, base_line)
}

pub struct StopPlaceQuayDistanceIsReasonable;

const DEFAULT_QUAY_DISTANCE_METERS: f64 = 500.0;

impl Rule for StopPlaceQuayDistanceIsReasonable {
    fn name(&self) -> &'static str {
        "stopPlaceQuayDistanceIsReasonable"
    }
    fn display_name(&self) -> &'static str {
        "Stop place / quay distance is reasonable"
    }
    fn description(&self) -> &'static str {
        "Each Quay must lie within a configurable distance of its containing StopPlace's centroid."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], config: &RuleRunConfig) -> Vec<ValidationError> {
        let threshold = config.distance_meters.unwrap_or(DEFAULT_QUAY_DISTANCE_METERS);
        let mut errors = Vec::new();
        for doc in docs {
            let Some(frame_defaults) = crate::navigator::find_netex_elements(
                &doc.xml,
                crate::navigator::paths::FRAME_DEFAULTS_COMPOSITE,
                crate::navigator::paths::FRAME_DEFAULTS_FLAT,
            )
            .into_iter()
            .next() else {
                continue;
            };
            let location_system = get_child_text(&frame_defaults.inner_xml, "DefaultLocationSystem");
            let is_wgs84 = location_system
                .as_deref()
                .map(|s| s.contains("4326") || s.contains("WGS84"))
                .unwrap_or(false);
            if !is_wgs84 {
                errors.push(skipped_info(
                    self.name(),
                    "FrameDefaults/DefaultLocationSystem is missing or not WGS84 (EPSG:4326); distance check skipped",
                ));
                continue;
            }

            for stop_place in find_all(&doc.xml, "StopPlace", 0, 1) {
                let sp_offset = inner_base_offset(&stop_place);
                let sp_line = inner_base_line(&stop_place);
                let Some(stop_centroid) = centroid_location(&stop_place.inner_xml, sp_offset, sp_line) else {
                    continue;
                };
                for quay in find_all(&stop_place.inner_xml, "Quay", sp_offset, sp_line) {
                    let q_offset = inner_base_offset(&quay);
                    let q_line = inner_base_line(&quay);
                    let Some(quay_centroid) = centroid_location(&quay.inner_xml, q_offset, q_line) else {
                        continue;
                    };
                    let distance = haversine_meters(stop_centroid, quay_centroid);
                    if distance > threshold {
                        let quay_id = get_attr(&quay.open_tag, "id").unwrap_or_else(|| "<unknown>".to_string());
                        errors.push(
                            quality_error(
                                self.name(),
                                format!(
                                    "Quay `{}` is {:.0}m from its StopPlace centroid, which exceeds {:.0}m",
                                    quay_id, distance, threshold
                                ),
                            )
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(quay.line), None),
                        );
                    }
                }
            }
        }
        errors
    }
}

pub struct LocationsAreReferencingTheSamePoint;

const DEFAULT_ASSIGNMENT_DISTANCE_METERS: f64 = 100.0;

impl Rule for LocationsAreReferencingTheSamePoint {
    fn name(&self) -> &'static str {
        "locationsAreReferencingTheSamePoint"
    }
    fn display_name(&self) -> &'static str {
        "Locations are referencing the same point"
    }
    fn description(&self) -> &'static str {
        "A PassengerStopAssignment's StopPlace and ScheduledStopPoint should sit within a configurable distance of each other."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], config: &RuleRunConfig) -> Vec<ValidationError> {
        let threshold = config.distance_meters.unwrap_or(DEFAULT_ASSIGNMENT_DISTANCE_METERS);

        let mut stop_place_locations: HashMap<String, (f64, f64)> = HashMap::new();
        let mut stop_point_locations: HashMap<String, (f64, f64)> = HashMap::new();
        let mut known_stop_places = std::collections::HashSet::new();
        let mut known_stop_points = std::collections::HashSet::new();

        for doc in docs {
            for el in find_all(&doc.xml, "StopPlace", 0, 1) {
                let Some(id) = get_attr(&el.open_tag, "id") else { continue };
                known_stop_places.insert(id.clone());
                let offset = inner_base_offset(&el);
                let line = inner_base_line(&el);
                if let Some(loc) = centroid_location(&el.inner_xml, offset, line) {
                    stop_place_locations.insert(id, loc);
                }
            }
            for el in find_all(&doc.xml, "ScheduledStopPoint", 0, 1) {
                let Some(id) = get_attr(&el.open_tag, "id") else { continue };
                known_stop_points.insert(id.clone());
                let offset = inner_base_offset(&el);
                let line = inner_base_line(&el);
                if let Some(loc) = centroid_location(&el.inner_xml, offset, line) {
                    stop_point_locations.insert(id, loc);
                }
            }
        }

        let mut errors = Vec::new();
        for doc in docs {
            for assignment in find_all(&doc.xml, "PassengerStopAssignment", 0, 1) {
                let offset = inner_base_offset(&assignment);
                let line = inner_base_line(&assignment);
                let stop_place_ref = find_all(&assignment.inner_xml, "StopPlaceRef", offset, line)
                    .into_iter()
                    .next()
                    .and_then(|el| get_attr(&el.open_tag, "ref"));
                let stop_point_ref = find_all(&assignment.inner_xml, "ScheduledStopPointRef", offset, line)
                    .into_iter()
                    .next()
                    .and_then(|el| get_attr(&el.open_tag, "ref"));

                let (Some(sp_ref), Some(ssp_ref)) = (stop_place_ref, stop_point_ref) else {
                    continue;
                };

                if !known_stop_places.contains(&sp_ref) || !known_stop_points.contains(&ssp_ref) {
                    errors.push(
                        consistency_error(
                            self.name(),
                            format!(
                                "PassengerStopAssignment references `{}`/`{}`, at least one of which does not exist",
                                sp_ref, ssp_ref
                            ),
                        )
                        .with_file_name(doc.file_name.clone())
                        .with_position(Some(assignment.line), None),
                    );
                    continue;
                }

                let (Some(&sp_loc), Some(&ssp_loc)) =
                    (stop_place_locations.get(&sp_ref), stop_point_locations.get(&ssp_ref))
                else {
                    // Missing coordinates are silently skipped, matching the
                    // documented (and intentionally preserved) source behaviour.
                    continue;
                };

                let distance = haversine_meters(sp_loc, ssp_loc);
                if distance > threshold {
                    errors.push(
                        consistency_error(
                            self.name(),
                            format!(
                                "StopPlace `{}` and ScheduledStopPoint `{}` are {:.0}m apart, which exceeds {:.0}m",
                                sp_ref, ssp_ref, distance, threshold
                            ),
                        )
                        .with_file_name(doc.file_name.clone())
                        .with_position(Some(assignment.line), None),
                    );
                }
            }
        }
        errors
    }
}
