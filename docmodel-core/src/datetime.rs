//! Conversion between host datetimes and stored BSON datetimes.
//!
//! Stored datetimes have millisecond precision. Converting to the store
//! truncates anything finer; converting back is lossless.

use bson::{Bson, DateTime as BsonDateTime};
use chrono::{DateTime, Utc};

pub fn to_store(value: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(value)
}

pub fn from_store(value: BsonDateTime) -> DateTime<Utc> {
    value.to_chrono()
}

/// Reads a stored datetime, returning `None` for any other kind of value.
pub fn from_bson(value: &Bson) -> Option<DateTime<Utc>> {
    match value {
        Bson::DateTime(value) => Some(from_store(*value)),
        _ => None,
    }
}

/// The current time, already truncated to store precision.
pub fn now() -> BsonDateTime {
    to_store(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn round_trip_truncates_to_milliseconds() {
        let original = Utc.with_ymd_and_hms(1977, 5, 25, 12, 0, 0).unwrap()
            .with_nanosecond(123_987_654)
            .unwrap();

        let restored = from_store(to_store(original));

        assert_eq!(restored.nanosecond(), 123_000_000);
        assert_eq!(restored.timestamp_millis(), original.timestamp_millis());
    }

    #[test]
    fn millisecond_values_survive_unchanged() {
        let original = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

        assert_eq!(from_store(to_store(original)), original);
        assert_eq!(from_bson(&Bson::DateTime(to_store(original))), Some(original));
        assert_eq!(from_bson(&Bson::from("yesterday")), None);
    }
}
