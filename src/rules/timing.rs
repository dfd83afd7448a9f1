use crate::error::{consistency_error, ValidationError};
use crate::navigator::{find_all, get_child_text, inner_base_line, inner_base_offset};
use crate::{Document, Format};

use super::{Rule, RuleRunConfig};

const NETEX_ONLY: &[Format] = &[Format::Netex];

pub struct EveryStopPointHasArrivalAndDepartureTime;

impl Rule for EveryStopPointHasArrivalAndDepartureTime {
    fn name(&self) -> &'static str {
        "everyStopPointHasArrivalAndDepartureTime"
    }
    fn display_name(&self) -> &'static str {
        "Every stop point has arrival and departure time"
    }
    fn description(&self) -> &'static str {
        "The first passing time needs a departure, the last needs an arrival, and every intermediate one needs both."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for doc in docs {
            for journey in find_all(&doc.xml, "ServiceJourney", 0, 1) {
                let journey_offset = inner_base_offset(&journey);
                let journey_line = inner_base_line(&journey);
                let Some(passing_times_el) =
                    find_all(&journey.inner_xml, "passingTimes", journey_offset, journey_line)
                        .into_iter()
                        .next()
                else {
                    continue;
                };
                let pt_offset = inner_base_offset(&passing_times_el);
                let pt_line = inner_base_line(&passing_times_el);
                let times = find_all(&passing_times_el.inner_xml, "TimetabledPassingTime", pt_offset, pt_line);
                let last_index = times.len().saturating_sub(1);
                for (i, t) in times.iter().enumerate() {
                    let has_arrival = get_child_text(&t.inner_xml, "ArrivalTime").is_some();
                    let has_departure = get_child_text(&t.inner_xml, "DepartureTime").is_some();
                    let needs_departure = i != last_index;
                    let needs_arrival = i != 0;
                    if needs_departure && !has_departure {
                        errors.push(
                            consistency_error(self.name(), "TimetabledPassingTime is missing a DepartureTime")
                                .with_file_name(doc.file_name.clone())
                                .with_position(Some(t.line), None),
                        );
                    }
                    if needs_arrival && !has_arrival {
                        errors.push(
                            consistency_error(self.name(), "TimetabledPassingTime is missing an ArrivalTime")
                                .with_file_name(doc.file_name.clone())
                                .with_position(Some(t.line), None),
                        );
                    }
                }
            }
        }
        errors
    }
}

pub struct PassingTimesIsNotDecreasing;

impl Rule for PassingTimesIsNotDecreasing {
    fn name(&self) -> &'static str {
        "passingTimesIsNotDecreasing"
    }
    fn display_name(&self) -> &'static str {
        "Passing times are not decreasing"
    }
    fn description(&self) -> &'static str {
        "Consecutive TimetabledPassingTime entries must not go backward in arrival/departure time or day offset."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for doc in docs {
            for journey in find_all(&doc.xml, "ServiceJourney", 0, 1) {
                let journey_offset = inner_base_offset(&journey);
                let journey_line = inner_base_line(&journey);
                let Some(passing_times_el) =
                    find_all(&journey.inner_xml, "passingTimes", journey_offset, journey_line)
                        .into_iter()
                        .next()
                else {
                    continue;
                };
                let pt_offset = inner_base_offset(&passing_times_el);
                let pt_line = inner_base_line(&passing_times_el);
                let times = find_all(&passing_times_el.inner_xml, "TimetabledPassingTime", pt_offset, pt_line);

                let mut prev_departure: Option<String> = None;
                let mut prev_day_offset: Option<i64> = None;
                for t in &times {
                    let arrival = get_child_text(&t.inner_xml, "ArrivalTime");
                    let departure = get_child_text(&t.inner_xml, "DepartureTime");
                    let arrival_day_offset = get_child_text(&t.inner_xml, "ArrivalDayOffset")
                        .and_then(|s| s.parse::<i64>().ok())
                        .unwrap_or(0);
                    let departure_day_offset = get_child_text(&t.inner_xml, "DepartureDayOffset")
                        .and_then(|s| s.parse::<i64>().ok())
                        .unwrap_or(arrival_day_offset);

                    if let (Some(prev_dep), Some(arr)) = (&prev_departure, &arrival) {
                        if let Some(prev_day) = prev_day_offset {
                            if arrival_day_offset == prev_day && arr < prev_dep {
                                errors.push(
                                    consistency_error(
                                        self.name(),
                                        format!(
                                            "ArrivalTime `{}` is earlier than the previous DepartureTime `{}`",
                                            arr, prev_dep
                                        ),
                                    )
                                    .with_file_name(doc.file_name.clone())
                                    .with_position(Some(t.line), None),
                                );
                            }
                        }
                    }

                    if let Some(prev_day) = prev_day_offset
                        && arrival_day_offset < prev_day
                    {
                        errors.push(
                            consistency_error(self.name(), "ArrivalDayOffset decreases along the passing-time sequence")
                                .with_file_name(doc.file_name.clone())
                                .with_position(Some(t.line), None),
                        );
                    }

                    if let Some(dep) = &departure {
                        prev_departure = Some(dep.clone());
                        prev_day_offset = Some(departure_day_offset);
                    } else if let Some(arr) = &arrival {
                        prev_departure = Some(arr.clone());
                        prev_day_offset = Some(arrival_day_offset);
                    }
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(xml: &str) -> Document {
        Document {
            file_name: "a.xml".to_string(),
            xml: xml.to_string(),
        }
    }

    #[test]
    fn missing_departure_on_first_stop_is_flagged() {
        let xml = r#"<ServiceJourney id="SJ1"><passingTimes>
            <TimetabledPassingTime id="T1"><ArrivalTime>08:00:00</ArrivalTime></TimetabledPassingTime>
            <TimetabledPassingTime id="T2"><ArrivalTime>08:10:00</ArrivalTime></TimetabledPassingTime>
        </passingTimes></ServiceJourney>"#;
        let errors = EveryStopPointHasArrivalAndDepartureTime.run(&[doc(xml)], &RuleRunConfig::default());
        assert!(errors.iter().any(|e| e.message.contains("DepartureTime")));
    }

    #[test]
    fn decreasing_arrival_after_departure_is_flagged() {
        let xml = r#"<ServiceJourney id="SJ1"><passingTimes>
            <TimetabledPassingTime id="T1"><DepartureTime>08:30:00</DepartureTime></TimetabledPassingTime>
            <TimetabledPassingTime id="T2"><ArrivalTime>08:10:00</ArrivalTime></TimetabledPassingTime>
        </passingTimes></ServiceJourney>"#;
        let errors = PassingTimesIsNotDecreasing.run(&[doc(xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 1);
        let expected_line = xml.lines().position(|l| l.contains("id=\"T2\"")).unwrap() as u32 + 1;
        assert_eq!(errors[0].line, Some(expected_line));
    }

    #[test]
    fn non_decreasing_sequence_passes() {
        let xml = r#"<ServiceJourney id="SJ1"><passingTimes>
            <TimetabledPassingTime id="T1"><DepartureTime>08:00:00</DepartureTime></TimetabledPassingTime>
            <TimetabledPassingTime id="T2"><ArrivalTime>08:05:00</ArrivalTime><DepartureTime>08:06:00</DepartureTime></TimetabledPassingTime>
            <TimetabledPassingTime id="T3"><ArrivalTime>08:15:00</ArrivalTime></TimetabledPassingTime>
        </passingTimes></ServiceJourney>"#;
        let errors = PassingTimesIsNotDecreasing.run(&[doc(xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 0);
    }
}
