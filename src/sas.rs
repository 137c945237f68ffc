//! SAS token expiry arithmetic and URL assembly.

use crate::{keys, ClientId, ClientRecord, DashopsError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

/// Expiry format accepted by `az storage ... generate-sas`: minute precision,
/// UTC.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// Returns the expiry string `days` after `now`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use dashops::sas::expiry_after;
///
/// let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 45).unwrap();
/// assert_eq!(expiry_after(now, 14), "2026-11-01T09:30Z");
/// ```
pub fn expiry_after(now: DateTime<Utc>, days: u32) -> String {
    (now + Duration::days(i64::from(days)))
        .format(EXPIRY_FORMAT)
        .to_string()
}

/// Parses an expiry written by [`expiry_after`].
///
/// Full RFC 3339 timestamps are accepted too, since tokens minted by hand
/// usually carry seconds.
pub fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, EXPIRY_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Checks that the record's SAS token, if any, is still valid at `now`.
///
/// A record with no `SAS_EXPIRY` passes: nothing has been minted yet.
///
/// # Errors
///
/// Returns [`DashopsError::SasExpired`] if the expiry is unreadable or not in
/// the future.
pub fn ensure_not_expired(client: &ClientId, record: &ClientRecord, now: DateTime<Utc>) -> Result<()> {
    let Some(raw) = record.get(keys::SAS_EXPIRY) else {
        return Ok(());
    };

    let expired = |reason: String| DashopsError::SasExpired {
        client: client.to_string(),
        reason,
    };

    let expiry = parse_expiry(raw).ok_or_else(|| expired(format!("unreadable expiry '{}'", raw)))?;
    if expiry <= now {
        return Err(expired(format!(
            "expired at {}; run `dashops refresh-sas {}`",
            raw, client
        )));
    }
    Ok(())
}

/// Blob endpoint URL for a container with `token` as the query string.
pub fn sas_url(account: &str, container: &str, token: &str) -> String {
    format!(
        "https://{}.blob.core.windows.net/{}?{}",
        account,
        container,
        token.trim_start_matches('?')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 59).unwrap()
    }

    fn client() -> ClientId {
        ClientId::parse("abcd").unwrap()
    }

    #[test]
    fn test_expiry_is_exactly_n_days_later() {
        assert_eq!(expiry_after(now(), 14), "2026-11-01T12:00Z");
        assert_eq!(expiry_after(now(), 7), "2026-10-25T12:00Z");

        let parsed = parse_expiry(&expiry_after(now(), 14)).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 11, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_expiry_crosses_year_end() {
        let late = Utc.with_ymd_and_hms(2026, 12, 28, 23, 59, 0).unwrap();
        assert_eq!(expiry_after(late, 7), "2027-01-04T23:59Z");
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(
            parse_expiry("2026-11-01T12:00:00Z"),
            Some(Utc.with_ymd_and_hms(2026, 11, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(parse_expiry("next tuesday"), None);
    }

    #[test]
    fn test_absent_expiry_is_fine() {
        assert!(ensure_not_expired(&client(), &ClientRecord::new(), now()).is_ok());
    }

    #[test]
    fn test_future_expiry_passes() {
        let record = ClientRecord::new().with(keys::SAS_EXPIRY, "2026-10-19T00:00Z");
        assert!(ensure_not_expired(&client(), &record, now()).is_ok());
    }

    #[test]
    fn test_past_expiry_fails() {
        let record = ClientRecord::new().with(keys::SAS_EXPIRY, "2026-10-18T11:59Z");
        let err = ensure_not_expired(&client(), &record, now()).unwrap_err();
        assert!(matches!(err, DashopsError::SasExpired { .. }));
        assert!(err.to_string().contains("refresh-sas abcd"));
    }

    #[test]
    fn test_unreadable_expiry_fails() {
        let record = ClientRecord::new().with(keys::SAS_EXPIRY, "soon");
        assert!(ensure_not_expired(&client(), &record, now()).is_err());
    }

    #[test]
    fn test_sas_url() {
        assert_eq!(
            sas_url("abcdstorage", "abcd-data", "?sv=2022-11-02&sig=x"),
            "https://abcdstorage.blob.core.windows.net/abcd-data?sv=2022-11-02&sig=x"
        );
    }
}
