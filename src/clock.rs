//! Purpose: Estimate local clock skew from an HTTP server's `Date` header.
//! Exports: `ClockSkew`, `check_skew`, `parse_http_date`, `format_http_date`, `round_to_second`.
//! Role: HEAD request, discard body, parse `Date` with the fixed RFC 1123 layout.
//! Invariants: Accepted layout is `Mon, 02 Jan 2006 15:04:05 GMT`.
//! Invariants: RFC 822 zones carry their offsets; other alphabetic abbreviations read as UTC.
//! Invariants: Skew is `local - remote`, with the local clock rounded to the nearest second.
use std::time::Duration;
use time::format_description::BorrowedFormatItem;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::client::{HttpClient, parse_http_url};
use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_TIME_URL: &str = "https://time.gov/";
pub const DEFAULT_CLOCK_TIMEOUT: Duration = Duration::from_secs(30);

const HTTP_DATE_LAYOUT: &str =
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second]";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockSkew {
    pub remote: OffsetDateTime,
    pub local: OffsetDateTime,
    pub skew: time::Duration,
}

impl ClockSkew {
    pub fn measure(remote: OffsetDateTime, local: OffsetDateTime) -> Self {
        let local = round_to_second(local);
        Self {
            remote,
            local,
            skew: local - remote,
        }
    }

    pub fn skew_ms(&self) -> i128 {
        self.skew.whole_milliseconds()
    }
}

pub fn check_skew(url: &str, timeout: Duration) -> Result<ClockSkew, Error> {
    let parsed = parse_http_url(url)?;
    let host = parsed.host_str().unwrap_or(url).to_string();

    let response = HttpClient::with_timeout(timeout).head(url)?;
    let local = OffsetDateTime::now_utc();

    let Some(date) = response.header("Date").filter(|value| !value.is_empty()) else {
        return Err(Error::new(ErrorKind::MissingHeader)
            .with_message(format!("no date header received from {host}"))
            .with_url(url)
            .with_status(response.status()));
    };
    let remote = parse_http_date(date).map_err(|err| err.with_url(url))?;
    let skew = ClockSkew::measure(remote, local);
    tracing::info!(
        "{host} : {} (skew {})",
        format_http_date(remote).unwrap_or_else(|_| date.to_string()),
        skew.skew
    );
    Ok(skew)
}

pub fn parse_http_date(value: &str) -> Result<OffsetDateTime, Error> {
    let trimmed = value.trim();
    let Some((stamp, zone)) = trimmed.rsplit_once(' ') else {
        return Err(Error::new(ErrorKind::Parse)
            .with_message(format!("date {value:?} does not match the RFC 1123 layout")));
    };
    let Some(hours) = zone_offset_hours(zone) else {
        return Err(Error::new(ErrorKind::Parse)
            .with_message(format!("unsupported time zone {zone:?} in date {value:?}")));
    };
    let offset = UtcOffset::from_hms(hours, 0, 0).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid zone offset")
            .with_source(err)
    })?;
    let layout = http_date_layout()?;
    let parsed = PrimitiveDateTime::parse(stamp, &layout).map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message(format!("date {value:?} does not match the RFC 1123 layout"))
            .with_source(err)
    })?;
    Ok(parsed.assume_offset(offset))
}

/// Hour offset for an RFC 1123 zone abbreviation.
///
/// Unknown abbreviations of three to five uppercase letters are read as UTC.
fn zone_offset_hours(zone: &str) -> Option<i8> {
    let hours = match zone {
        "UT" | "UTC" | "GMT" => 0,
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        _ if (3..=5).contains(&zone.len()) && zone.bytes().all(|b| b.is_ascii_uppercase()) => 0,
        _ => return None,
    };
    Some(hours)
}

pub fn format_http_date(value: OffsetDateTime) -> Result<String, Error> {
    let layout = http_date_layout()?;
    let stamp = value.to_offset(UtcOffset::UTC).format(&layout).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to format http date")
            .with_source(err)
    })?;
    Ok(format!("{stamp} GMT"))
}

/// Rounds half-up to whole seconds.
pub fn round_to_second(value: OffsetDateTime) -> OffsetDateTime {
    let nanos = value.nanosecond();
    let truncated = value - time::Duration::nanoseconds(i64::from(nanos));
    if nanos >= 500_000_000 {
        truncated + time::Duration::SECOND
    } else {
        truncated
    }
}

fn http_date_layout() -> Result<Vec<BorrowedFormatItem<'static>>, Error> {
    time::format_description::parse(HTTP_DATE_LAYOUT).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid http date layout")
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{ClockSkew, format_http_date, parse_http_date, round_to_second};
    use crate::core::error::ErrorKind;
    use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

    fn utc(year: i32, month: Month, day: u8, h: u8, m: u8, s: u8, nanos: u32) -> OffsetDateTime {
        let date = Date::from_calendar_date(year, month, day).expect("date");
        let time = Time::from_hms_nano(h, m, s, nanos).expect("time");
        PrimitiveDateTime::new(date, time).assume_utc()
    }

    #[test]
    fn parses_rfc1123_reference_layout() {
        let parsed = parse_http_date("Mon, 02 Jan 2006 15:04:05 GMT").expect("parse");
        assert_eq!(parsed, utc(2006, Month::January, 2, 15, 4, 5, 0));
    }

    #[test]
    fn parses_rfc7231_example() {
        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").expect("parse");
        assert_eq!(parsed, utc(1994, Month::November, 6, 8, 49, 37, 0));
        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 UTC").expect("parse utc");
        assert_eq!(parsed.unix_timestamp(), 784_111_777);
    }

    #[test]
    fn north_american_zones_carry_offsets() {
        let pst = parse_http_date("Sun, 06 Nov 1994 08:49:37 PST").expect("pst");
        assert_eq!(pst.unix_timestamp(), 784_140_577);
        let est = parse_http_date("Sun, 06 Nov 1994 08:49:37 EST").expect("est");
        assert_eq!(est.unix_timestamp(), 784_129_777);
        let edt = parse_http_date("Sun, 06 Nov 1994 08:49:37 EDT").expect("edt");
        assert_eq!(edt.unix_timestamp(), 784_126_177);
        assert_eq!(
            format_http_date(pst).expect("format"),
            "Sun, 06 Nov 1994 16:49:37 GMT"
        );
    }

    #[test]
    fn unknown_abbreviations_read_as_utc() {
        for value in [
            "Sun, 06 Nov 1994 08:49:37 CET",
            "Sun, 06 Nov 1994 08:49:37 AEST",
        ] {
            let parsed = parse_http_date(value).expect("parse");
            assert_eq!(parsed.unix_timestamp(), 784_111_777, "value {value:?}");
        }
    }

    #[test]
    fn rejects_other_layouts() {
        for value in [
            "",
            "2006-01-02T15:04:05Z",
            "Sunday, 06-Nov-94 08:49:37 GMT",
            "Sun Nov  6 08:49:37 1994",
            "Sun, 06 Nov 1994 08:49 GMT",
            "Sun, 06 Nov 1994 08:49:37 +0000",
            "Sun, 06 Nov 1994 08:49:37 gmt",
            "Sun, 06 Nov 1994 08:49:37 Z",
        ] {
            let err = parse_http_date(value).expect_err("reject");
            assert_eq!(err.kind(), ErrorKind::Parse, "value {value:?}");
        }
    }

    #[test]
    fn format_is_inverse_of_parse() {
        let value = "Mon, 02 Jan 2006 15:04:05 GMT";
        let parsed = parse_http_date(value).expect("parse");
        assert_eq!(format_http_date(parsed).expect("format"), value);
    }

    #[test]
    fn rounding_is_half_up() {
        let base = utc(2024, Month::March, 1, 12, 0, 0, 0);
        assert_eq!(round_to_second(utc(2024, Month::March, 1, 12, 0, 0, 499_999_999)), base);
        assert_eq!(
            round_to_second(utc(2024, Month::March, 1, 11, 59, 59, 500_000_000)),
            base
        );
    }

    #[test]
    fn skew_is_local_minus_remote() {
        let remote = utc(2024, Month::March, 1, 12, 0, 0, 0);
        let local = utc(2024, Month::March, 1, 12, 0, 2, 600_000_000);
        let skew = ClockSkew::measure(remote, local);
        assert_eq!(skew.skew_ms(), 3_000);
        assert_eq!(skew.local, utc(2024, Month::March, 1, 12, 0, 3, 0));

        let behind = ClockSkew::measure(remote, utc(2024, Month::March, 1, 11, 59, 58, 0));
        assert_eq!(behind.skew_ms(), -2_000);
    }
}
