use crate::error::{consistency_error, ValidationError};
use crate::navigator::{find_all, get_attr, get_child_text};
use crate::{Document, Format};

use super::{Rule, RuleRunConfig};

const NETEX_ONLY: &[Format] = &[Format::Netex];

const VALID_STOP_PLACE_TYPES: &[&str] = &[
    "onstreetBus",
    "onstreetTram",
    "busStation",
    "airport",
    "railStation",
    "metroStation",
    "coachStation",
    "ferryPort",
    "harbourPort",
    "ferryStop",
    "liftStation",
    "tramStation",
    "vehicleRailInterchange",
    "taxiStand",
    "other",
];

pub struct EveryStopPlaceHasAName;

impl Rule for EveryStopPlaceHasAName {
    fn name(&self) -> &'static str {
        "everyStopPlaceHasAName"
    }
    fn display_name(&self) -> &'static str {
        "Every stop place has a name"
    }
    fn description(&self) -> &'static str {
        "Every StopPlace must have an id and a Name or ShortName."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for doc in docs {
            for el in find_all(&doc.xml, "StopPlace", 0, 1) {
                if get_attr(&el.open_tag, "id").is_none() {
                    errors.push(
                        consistency_error(self.name(), "StopPlace is missing an `id` attribute")
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                    );
                }
                let name = get_child_text(&el.inner_xml, "Name");
                let short_name = get_child_text(&el.inner_xml, "ShortName");
                if name.is_none() && short_name.is_none() {
                    errors.push(
                        consistency_error(self.name(), "StopPlace has neither a Name nor a ShortName")
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                    );
                }
            }
        }
        errors
    }
}

pub struct EveryScheduledStopPointHasAName;

impl Rule for EveryScheduledStopPointHasAName {
    fn name(&self) -> &'static str {
        "everyScheduledStopPointHasAName"
    }
    fn display_name(&self) -> &'static str {
        "Every scheduled stop point has a name"
    }
    fn description(&self) -> &'static str {
        "Every ScheduledStopPoint must have an id and a Name."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for doc in docs {
            for el in find_all(&doc.xml, "ScheduledStopPoint", 0, 1) {
                if get_attr(&el.open_tag, "id").is_none() {
                    errors.push(
                        consistency_error(self.name(), "ScheduledStopPoint is missing an `id` attribute")
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                    );
                }
                if get_child_text(&el.inner_xml, "Name").is_none() {
                    errors.push(
                        consistency_error(self.name(), "ScheduledStopPoint has no Name")
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                    );
                }
            }
        }
        errors
    }
}

pub struct EveryStopPlaceHasACorrectStopPlaceType;

impl Rule for EveryStopPlaceHasACorrectStopPlaceType {
    fn name(&self) -> &'static str {
        "everyStopPlaceHasACorrectStopPlaceType"
    }
    fn display_name(&self) -> &'static str {
        "Every stop place has a correct stop place type"
    }
    fn description(&self) -> &'static str {
        "StopPlaceType, when present, must be one of the enumerated NeTEx values."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for doc in docs {
            for el in find_all(&doc.xml, "StopPlace", 0, 1) {
                let Some(stop_place_type) = get_child_text(&el.inner_xml, "StopPlaceType") else {
                    continue;
                };
                if !VALID_STOP_PLACE_TYPES.contains(&stop_place_type.as_str()) {
                    errors.push(
                        consistency_error(
                            self.name(),
                            format!("StopPlaceType `{}` is not a recognized value", stop_place_type),
                        )
                        .with_file_name(doc.file_name.clone())
                        .with_position(Some(el.line), None),
                    );
                }
            }
        }
        errors
    }
}
