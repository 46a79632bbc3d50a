use std::fmt;

/// Calendar period an aggregate window or a touch bucket spans.
///
/// The discriminants are the on-disk encoding and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Period {
    FiveMinute = 0,
    OneHour = 1,
    SixHour = 2,
    TwelveHour = 3,
    OneDay = 4,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::FiveMinute,
        Period::OneHour,
        Period::SixHour,
        Period::TwelveHour,
        Period::OneDay,
    ];

    pub fn seconds_per_sample(self) -> i64 {
        match self {
            Period::FiveMinute => 60 * 5,
            Period::OneHour => 60 * 60,
            Period::SixHour => 60 * 60 * 6,
            Period::TwelveHour => 60 * 60 * 12,
            Period::OneDay => 60 * 60 * 24,
        }
    }

    /// UTC start of the window containing `now` (epoch seconds).
    ///
    /// Every period length divides a UTC day and epoch day boundaries are
    /// UTC midnights, so flooring to a multiple of the period is exactly the
    /// calendar quantization (zeroed seconds, minute floored to a multiple
    /// of five, hour floored to a multiple of six, and so on).
    pub fn window_start(self, now: i64) -> i64 {
        now - now.rem_euclid(self.seconds_per_sample())
    }

    pub fn from_wire(value: u32) -> Option<Period> {
        Period::ALL.into_iter().find(|p| *p as u32 == value)
    }

    pub fn parse(name: &str) -> Option<Period> {
        match name {
            "FIVEMINUTE" => Some(Period::FiveMinute),
            "ONEHOUR" => Some(Period::OneHour),
            "SIXHOUR" => Some(Period::SixHour),
            "TWELVEHOUR" => Some(Period::TwelveHour),
            "ONEDAY" => Some(Period::OneDay),
            _ => None,
        }
    }

    /// Touch paths accept any junk as a period name and fall back to one hour.
    pub fn parse_or_hour(name: &str) -> Period {
        Period::parse(name).unwrap_or(Period::OneHour)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Period::FiveMinute => "FIVEMINUTE",
            Period::OneHour => "ONEHOUR",
            Period::SixHour => "SIXHOUR",
            Period::TwelveHour => "TWELVEHOUR",
            Period::OneDay => "ONEDAY",
        };
        f.write_str(name)
    }
}
