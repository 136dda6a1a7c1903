use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{config_error, Error, Result};
use crate::hierarchy::StaticHierarchy;

/// Label of the most general level of every date hierarchy.
pub const TOP_LABEL: &str = "*";

/// Calendar granularities, declared from the finest to the coarsest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    Hour,
    DayMonthYear,
    /// ISO 8601 week. Weeks straddle months and years, so nothing but the
    /// top level may follow it.
    WeekYear,
    MonthYear,
    QuarterYear,
    Year,
    Decade,
    Century,
    Millennium,
}

impl Granularity {
    pub fn label(&self, date: &NaiveDateTime) -> String {
        let year = date.year();
        match self {
            Granularity::Hour => format!(
                "{:04}-{:02}-{:02} {:02}:00",
                year,
                date.month(),
                date.day(),
                date.hour()
            ),
            Granularity::DayMonthYear => {
                format!("{:04}-{:02}-{:02}", year, date.month(), date.day())
            }
            Granularity::WeekYear => {
                let week = date.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            Granularity::MonthYear => format!("{:04}-{:02}", year, date.month()),
            Granularity::QuarterYear => format!("{:04}-Q{}", year, date.month0() / 3 + 1),
            Granularity::Year => format!("{:04}", year),
            Granularity::Decade => span(year, 10),
            Granularity::Century => span(year, 100),
            Granularity::Millennium => span(year, 1000),
        }
    }
}

fn span(year: i32, width: i32) -> String {
    let start = year.div_euclid(width) * width;
    format!("{:04}-{:04}", start, start + width - 1)
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Hour => "hour",
            Granularity::DayMonthYear => "day",
            Granularity::WeekYear => "week",
            Granularity::MonthYear => "month",
            Granularity::QuarterYear => "quarter",
            Granularity::Year => "year",
            Granularity::Decade => "decade",
            Granularity::Century => "century",
            Granularity::Millennium => "millennium",
        };
        f.write_str(name)
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Granularity::Hour),
            "day" | "day_month_year" => Ok(Granularity::DayMonthYear),
            "week" | "week_year" => Ok(Granularity::WeekYear),
            "month" | "month_year" => Ok(Granularity::MonthYear),
            "quarter" | "quarter_year" => Ok(Granularity::QuarterYear),
            "year" => Ok(Granularity::Year),
            "decade" => Ok(Granularity::Decade),
            "century" => Ok(Granularity::Century),
            "millennium" => Ok(Granularity::Millennium),
            other => Err(config_error(format!("unknown date granularity {:?}", other))),
        }
    }
}

/// A strftime-style date format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateFormat(String);

impl DateFormat {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn pattern(&self) -> &str {
        &self.0
    }

    /// Parse a value as a date-time, or as a date at midnight.
    pub fn parse(&self, value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        NaiveDateTime::parse_from_str(value, &self.0)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, &self.0)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
    }
}

/// Derives a date hierarchy from the observed values of an attribute.
///
/// Level `i` (for `1 <= i <= granularities.len()`) holds the label of the
/// `i`-th granularity; the final level is [`TOP_LABEL`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateHierarchyBuilder {
    format: DateFormat,
    granularities: Vec<Granularity>,
}

impl DateHierarchyBuilder {
    pub fn new(format: impl Into<String>, granularities: &[Granularity]) -> Result<Self> {
        if granularities.is_empty() {
            return Err(config_error("date hierarchy needs at least one granularity"));
        }
        if let Some(pair) = granularities.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(config_error(format!(
                "date granularities must coarsen strictly, got {} before {}",
                pair[0], pair[1]
            )));
        }
        if let Some(pair) = granularities
            .windows(2)
            .find(|pair| pair[0] == Granularity::WeekYear)
        {
            return Err(config_error(format!(
                "{} does not refine {}: only the top level may follow it",
                pair[0], pair[1]
            )));
        }
        Ok(Self {
            format: DateFormat::new(format),
            granularities: granularities.to_vec(),
        })
    }

    pub fn format(&self) -> &DateFormat {
        &self.format
    }

    pub fn granularities(&self) -> &[Granularity] {
        &self.granularities
    }

    pub fn height(&self) -> usize {
        self.granularities.len() + 1
    }

    fn parse(&self, attribute: &str, value: &str) -> Result<NaiveDateTime> {
        self.format.parse(value).ok_or_else(|| Error::MalformedDate {
            attribute: attribute.to_string(),
            value: value.to_string(),
            format: self.format.pattern().to_string(),
        })
    }

    pub fn label<'a>(&self, attribute: &str, value: &'a str, level: usize) -> Result<Cow<'a, str>> {
        let date = self.parse(attribute, value)?;
        match level {
            0 => Ok(Cow::Borrowed(value)),
            l if l <= self.granularities.len() => {
                Ok(Cow::Owned(self.granularities[l - 1].label(&date)))
            }
            l if l == self.height() => Ok(Cow::Borrowed(TOP_LABEL)),
            l => Err(config_error(format!(
                "level {} exceeds height {} of date hierarchy for {:?}",
                l,
                self.height(),
                attribute
            ))),
        }
    }

    /// Build the lookup table for the distinct values in `observed`.
    pub fn build<'v, I>(&self, attribute: &str, observed: I) -> Result<StaticHierarchy>
    where
        I: IntoIterator<Item = &'v str>,
    {
        let distinct: BTreeSet<&str> = observed.into_iter().collect();
        let mut hierarchy = StaticHierarchy::new();
        for value in distinct {
            let date = self.parse(attribute, value)?;
            let labels = self
                .granularities
                .iter()
                .map(|granularity| granularity.label(&date))
                .chain(std::iter::once(TOP_LABEL.to_string()));
            hierarchy.add(value, labels)?;
        }
        Ok(hierarchy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    fn builder() -> DateHierarchyBuilder {
        DateHierarchyBuilder::new(
            FORMAT,
            &[
                Granularity::DayMonthYear,
                Granularity::MonthYear,
                Granularity::Year,
                Granularity::Decade,
                Granularity::Century,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_labels() {
        let builder = builder();
        assert_eq!(builder.format().pattern(), FORMAT);
        assert_eq!(builder.granularities().len(), 5);
        assert_eq!(builder.granularities()[2], Granularity::Year);
        let value = "1987-06-21 14:30:00";
        assert_eq!(builder.label("b", value, 0).unwrap(), value);
        assert_eq!(builder.label("b", value, 1).unwrap(), "1987-06-21");
        assert_eq!(builder.label("b", value, 2).unwrap(), "1987-06");
        assert_eq!(builder.label("b", value, 3).unwrap(), "1987");
        assert_eq!(builder.label("b", value, 4).unwrap(), "1980-1989");
        assert_eq!(builder.label("b", value, 5).unwrap(), "1900-1999");
        assert_eq!(builder.label("b", value, 6).unwrap(), TOP_LABEL);
        assert!(builder.label("b", value, 7).is_err());
    }

    #[test]
    fn test_quarter_and_hour() {
        let date = DateFormat::new(FORMAT).parse("2021-11-03 07:15:00").unwrap();
        assert_eq!(Granularity::QuarterYear.label(&date), "2021-Q4");
        assert_eq!(Granularity::Hour.label(&date), "2021-11-03 07:00");
        assert_eq!(Granularity::Millennium.label(&date), "2000-2999");
        assert_eq!(Granularity::WeekYear.label(&date), "2021-W44");
    }

    #[test]
    fn test_date_only_format() {
        let format = DateFormat::new("%Y-%m-%d");
        let date = format.parse("2001-02-03").unwrap();
        assert_eq!(Granularity::DayMonthYear.label(&date), "2001-02-03");
    }

    #[test]
    fn test_build_is_monotone() {
        let hierarchy = builder()
            .build(
                "birth_datetime",
                [
                    "1987-06-21 14:30:00",
                    "1987-06-22 09:00:00",
                    "1999-12-31 23:59:59",
                    "2003-01-01 00:00:00",
                    "1987-06-21 14:30:00",
                ],
            )
            .unwrap();
        assert_eq!(hierarchy.len(), 4);
        assert_eq!(hierarchy.height(), 6);
        hierarchy.validate().unwrap();
    }

    #[test]
    fn test_build_rejects_malformed_dates() {
        let err = builder()
            .build("birth_datetime", ["1987-06-21 14:30:00", "21/06/1987"])
            .unwrap_err();
        assert!(matches!(err, Error::MalformedDate { value, .. } if value == "21/06/1987"));
    }

    #[test]
    fn test_granularities_must_coarsen() {
        let descending = [Granularity::Year, Granularity::MonthYear];
        assert!(DateHierarchyBuilder::new(FORMAT, &descending).is_err());
        assert!(DateHierarchyBuilder::new(FORMAT, &[]).is_err());
    }

    #[test]
    fn test_week_is_only_followed_by_the_top() {
        for coarser in [
            Granularity::MonthYear,
            Granularity::QuarterYear,
            Granularity::Year,
            Granularity::Decade,
        ] {
            let granularities = [Granularity::WeekYear, coarser];
            assert!(DateHierarchyBuilder::new(FORMAT, &granularities).is_err());
        }
        let builder = DateHierarchyBuilder::new(
            FORMAT,
            &[Granularity::DayMonthYear, Granularity::WeekYear],
        )
        .unwrap();
        assert_eq!(builder.height(), 3);
        let hierarchy = builder
            .build(
                "admission",
                [
                    "2020-12-31 10:00:00",
                    "2021-01-01 08:00:00",
                    "2021-01-04 12:00:00",
                ],
            )
            .unwrap();
        hierarchy.validate().unwrap();
        assert_eq!(hierarchy.level_of("2021-01-01 08:00:00", 2), Some("2020-W53"));
        assert_eq!(hierarchy.level_of("2021-01-04 12:00:00", 2), Some("2021-W01"));
    }

    #[test]
    fn test_parse_granularity() {
        assert_eq!("decade".parse::<Granularity>().unwrap(), Granularity::Decade);
        assert_eq!(
            "DAY_MONTH_YEAR".parse::<Granularity>().unwrap(),
            Granularity::DayMonthYear
        );
        assert_eq!("week".parse::<Granularity>().unwrap(), Granularity::WeekYear);
        assert_eq!(Granularity::WeekYear.to_string(), "week");
        assert!("fortnight".parse::<Granularity>().is_err());
    }
}
