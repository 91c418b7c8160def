//! UTCTime and GeneralizedTime.

use super::EncodingRules;
use pathkit_types::Asn1Error;
use std::fmt;

/// Broken-down UTC calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl DateTime {
    /// Convert a UNIX timestamp to calendar components. Fails with
    /// `IntegerOverflow` when the year does not fit an `i32`.
    pub fn from_unix(timestamp: i64) -> Result<Self, Asn1Error> {
        let days = timestamp.div_euclid(86_400);
        let secs = timestamp.rem_euclid(86_400) as u32;

        // Civil date from days since epoch (Howard Hinnant's algorithm).
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = (z - era * 146_097) as u32;
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe as i64 + era * 400 + i64::from(month <= 2);

        Ok(DateTime {
            year: i32::try_from(year).map_err(|_| Asn1Error::IntegerOverflow)?,
            month,
            day,
            hour: secs / 3600,
            minute: (secs % 3600) / 60,
            second: secs % 60,
        })
    }

    /// Seconds since 1970-01-01T00:00:00Z.
    pub fn to_unix(&self) -> i64 {
        let y = i64::from(self.year) - i64::from(self.month <= 2);
        let m = i64::from(if self.month <= 2 { self.month + 9 } else { self.month - 3 });
        let era = y.div_euclid(400);
        let yoe = y - era * 400;
        let doy = (153 * m + 2) / 5 + i64::from(self.day) - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        let days = era * 146_097 + doe - 719_468;
        days * 86_400
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    fn validate(&self, offset: usize) -> Result<(), Asn1Error> {
        let leap = (self.year % 4 == 0 && self.year % 100 != 0) || self.year % 400 == 0;
        let month_days = match self.month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if leap => 29,
            2 => 28,
            _ => return Err(Asn1Error::malformed(offset, "month out of range")),
        };
        if self.day == 0 || self.day > month_days {
            return Err(Asn1Error::malformed(offset, "day out of range"));
        }
        if self.hour > 23 || self.minute > 59 || self.second > 59 {
            return Err(Asn1Error::malformed(offset, "time of day out of range"));
        }
        Ok(())
    }
}

/// Which universal time type a value was (or will be) encoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeKind {
    Utc,
    Generalized,
}

/// A decoded time value.
///
/// The exact source text is kept so a decoded value re-encodes to the
/// same octets under BER, including fractional seconds or offsets. The
/// timestamp is the instant it denotes, truncated to whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Asn1Time {
    kind: TimeKind,
    text: String,
    timestamp: i64,
    datetime: DateTime,
}

impl Asn1Time {
    /// UTCTime `YYMMDDHHMMSSZ`. Only years 1950 through 2049 are representable.
    pub fn utc(timestamp: i64) -> Result<Self, Asn1Error> {
        let dt = DateTime::from_unix(timestamp)?;
        if !(1950..=2049).contains(&dt.year) {
            return Err(Asn1Error::malformed(0, "year outside the UTCTime range"));
        }
        Ok(Asn1Time {
            kind: TimeKind::Utc,
            text: format!(
                "{:02}{:02}{:02}{:02}{:02}{:02}Z",
                dt.year % 100,
                dt.month,
                dt.day,
                dt.hour,
                dt.minute,
                dt.second
            ),
            timestamp,
            datetime: dt,
        })
    }

    /// GeneralizedTime `YYYYMMDDHHMMSSZ`.
    pub fn generalized(timestamp: i64) -> Result<Self, Asn1Error> {
        let dt = DateTime::from_unix(timestamp)?;
        if !(0..=9999).contains(&dt.year) {
            return Err(Asn1Error::malformed(0, "year outside the GeneralizedTime range"));
        }
        Ok(Asn1Time {
            kind: TimeKind::Generalized,
            text: format!(
                "{:04}{:02}{:02}{:02}{:02}{:02}Z",
                dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
            ),
            timestamp,
            datetime: dt,
        })
    }

    /// The X.509 `Time` choice: UTCTime through 2049, GeneralizedTime after.
    pub fn x509(timestamp: i64) -> Result<Self, Asn1Error> {
        let year = DateTime::from_unix(timestamp)?.year;
        if (1950..=2049).contains(&year) {
            Self::utc(timestamp)
        } else {
            Self::generalized(timestamp)
        }
    }

    /// Parse the content octets of a UTCTime or GeneralizedTime.
    pub fn parse(
        kind: TimeKind,
        content: &[u8],
        rules: EncodingRules,
    ) -> Result<Self, Asn1Error> {
        let text = std::str::from_utf8(content)
            .map_err(|_| Asn1Error::malformed(0, "time is not ASCII"))?;
        if !text.is_ascii() {
            return Err(Asn1Error::malformed(0, "time is not ASCII"));
        }
        let timestamp = match kind {
            TimeKind::Utc => parse_utc_time(text, rules)?,
            TimeKind::Generalized => parse_generalized_time(text, rules)?,
        };
        Ok(Asn1Time {
            kind,
            text: text.to_string(),
            timestamp,
            datetime: DateTime::from_unix(timestamp)?,
        })
    }

    /// Whether the text already satisfies the DER time rules.
    pub fn is_der(&self) -> bool {
        Asn1Time::parse(self.kind, self.text.as_bytes(), EncodingRules::Der).is_ok()
    }

    /// The same instant in DER form: seconds present, zone `Z`, fraction
    /// without trailing zeros. A UTCTime whose UTC instant leaves the
    /// 1950-2049 window is rendered as a GeneralizedTime.
    pub fn to_der_form(&self) -> Self {
        if self.is_der() {
            return self.clone();
        }
        let rendered = match self.kind {
            TimeKind::Utc => {
                Self::utc(self.timestamp).or_else(|_| Self::generalized(self.timestamp))
            }
            TimeKind::Generalized => Self::generalized(self.timestamp).map(|mut t| {
                if let Some(fraction) = self.fraction() {
                    t.text.pop();
                    t.text.push('.');
                    t.text.push_str(fraction);
                    t.text.push('Z');
                }
                t
            }),
        };
        rendered.unwrap_or_else(|_| self.clone())
    }

    /// Fractional-second digits of a GeneralizedTime, trailing zeros removed.
    fn fraction(&self) -> Option<&str> {
        let start = self.text.find(|c: char| c == '.' || c == ',')? + 1;
        let digits = &self.text[start..];
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        let fraction = digits[..end].trim_end_matches('0');
        (!fraction.is_empty()).then_some(fraction)
    }

    pub fn kind(&self) -> TimeKind {
        self.kind
    }

    /// The time exactly as encoded.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Seconds since the UNIX epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn datetime(&self) -> DateTime {
        self.datetime
    }

    pub fn year(&self) -> i32 {
        self.datetime().year
    }
}

impl fmt::Display for Asn1Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = self.datetime();
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
        )
    }
}

fn digits(s: &str, at: usize, n: usize) -> Result<u32, Asn1Error> {
    let part = s
        .get(at..at + n)
        .ok_or(Asn1Error::TruncatedInput { offset: at })?;
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Asn1Error::malformed(at, "expected decimal digits"));
    }
    part.parse()
        .map_err(|_| Asn1Error::malformed(at, "expected decimal digits"))
}

/// Parse a trailing zone designator starting at `at`. Returns the offset
/// to subtract (in seconds) to obtain UTC, or `None` for local time.
fn parse_zone(s: &str, at: usize, rules: EncodingRules) -> Result<Option<i64>, Asn1Error> {
    let rest = &s[at..];
    if rest == "Z" {
        return Ok(Some(0));
    }
    if rules == EncodingRules::Der {
        return Err(Asn1Error::malformed(at, "DER time must end in Z"));
    }
    if rest.is_empty() {
        return Ok(None);
    }
    let sign = match rest.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return Err(Asn1Error::malformed(at, "invalid time zone designator")),
    };
    if rest.len() != 5 {
        return Err(Asn1Error::malformed(at, "invalid time zone offset"));
    }
    let hh = digits(s, at + 1, 2)?;
    let mm = digits(s, at + 3, 2)?;
    if hh > 23 || mm > 59 {
        return Err(Asn1Error::malformed(at, "time zone offset out of range"));
    }
    Ok(Some(sign * (i64::from(hh) * 3600 + i64::from(mm) * 60)))
}

/// UTCTime: `YYMMDDHHMM[SS](Z|+hhmm|-hhmm)`. Two-digit years resolve per
/// RFC 5280: 50-99 to 19xx, 00-49 to 20xx.
fn parse_utc_time(s: &str, rules: EncodingRules) -> Result<i64, Asn1Error> {
    let yy = digits(s, 0, 2)?;
    let year = (if yy >= 50 { 1900 + yy } else { 2000 + yy }) as i32;
    let month = digits(s, 2, 2)?;
    let day = digits(s, 4, 2)?;
    let hour = digits(s, 6, 2)?;
    let minute = digits(s, 8, 2)?;
    let has_seconds = s.as_bytes().get(10).is_some_and(|b| b.is_ascii_digit());
    let (second, zone_at) = if has_seconds {
        (digits(s, 10, 2)?, 12)
    } else if rules == EncodingRules::Der {
        return Err(Asn1Error::malformed(10, "DER UTCTime requires seconds"));
    } else {
        (0, 10)
    };
    let offset = parse_zone(s, zone_at, rules)?
        .ok_or_else(|| Asn1Error::malformed(zone_at, "UTCTime requires a zone"))?;
    let dt = DateTime {
        year,
        month,
        day,
        hour,
        minute,
        second,
    };
    dt.validate(0)?;
    Ok(dt.to_unix() - offset)
}

/// GeneralizedTime: `YYYYMMDDHH[MM[SS[.fff]]][Z|+hhmm|-hhmm]`. DER requires
/// seconds, a `Z`, and a fraction without trailing zeros.
fn parse_generalized_time(s: &str, rules: EncodingRules) -> Result<i64, Asn1Error> {
    let der = rules == EncodingRules::Der;
    let year = digits(s, 0, 4)? as i32;
    let month = digits(s, 4, 2)?;
    let day = digits(s, 6, 2)?;
    let hour = digits(s, 8, 2)?;
    let mut at = 10;
    let mut minute = 0;
    let mut second = 0;
    let is_digit = |i: usize| s.as_bytes().get(i).is_some_and(|b| b.is_ascii_digit());
    if is_digit(at) {
        minute = digits(s, at, 2)?;
        at += 2;
        if is_digit(at) {
            second = digits(s, at, 2)?;
            at += 2;
        }
    }
    if der && at != 14 {
        return Err(Asn1Error::malformed(at, "DER GeneralizedTime requires seconds"));
    }
    if let Some(&sep) = s.as_bytes().get(at) {
        if sep == b'.' || sep == b',' {
            if der && sep == b',' {
                return Err(Asn1Error::malformed(at, "DER fraction separator must be '.'"));
            }
            let frac_start = at + 1;
            let mut end = frac_start;
            while is_digit(end) {
                end += 1;
            }
            if end == frac_start {
                return Err(Asn1Error::malformed(at, "empty fractional seconds"));
            }
            if der && s.as_bytes()[end - 1] == b'0' {
                return Err(Asn1Error::malformed(end - 1, "fraction has trailing zeros"));
            }
            at = end;
        }
    }
    let offset = parse_zone(s, at, rules)?.unwrap_or(0);
    let dt = DateTime {
        year,
        month,
        day,
        hour,
        minute,
        second,
    };
    dt.validate(0)?;
    Ok(dt.to_unix() - offset)
}
