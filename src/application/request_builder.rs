// Builds archive requests: PV expressions, timestamps and URLs
use crate::application::archive_client::{ArchiveRequest, HttpMethod};
use crate::domain::binning::ResolvedBinning;
use chrono::{DateTime, FixedOffset, Utc};

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: String,
    offset: FixedOffset,
    do_not_chunk: bool,
}

impl RequestBuilder {
    pub fn new(base_url: &str, offset: FixedOffset, do_not_chunk: bool) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            offset,
            do_not_chunk,
        }
    }

    /// `GET /getData.json` for one PV over `[from, to]`.
    pub fn build(
        &self,
        pv: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        binning: &ResolvedBinning,
    ) -> ArchiveRequest {
        let expression = binning.pv_expression(pv);
        let mut url = format!(
            "{}/getData.json?pv={}&from={}&to={}",
            self.base_url,
            urlencoding::encode(&expression),
            urlencoding::encode(&format_archive_timestamp(from, self.offset)),
            urlencoding::encode(&format_archive_timestamp(to, self.offset)),
        );
        if self.do_not_chunk {
            url.push_str("&donotchunk=true");
        }

        ArchiveRequest {
            label: pv.to_string(),
            url,
            method: HttpMethod::Get,
            headers: vec![("Accept", "application/json".to_string())],
            body: None,
        }
    }

    /// `POST /getDataAtTime` for the latest value of every PV at `at`.
    pub fn build_at_time(&self, pvs: &[String], at: DateTime<Utc>) -> ArchiveRequest {
        let url = format!(
            "{}/getDataAtTime?at={}",
            self.base_url,
            urlencoding::encode(&format_archive_timestamp(at, self.offset)),
        );

        ArchiveRequest {
            label: pvs.join(","),
            url,
            method: HttpMethod::Post,
            headers: vec![
                ("Content-Type", "application/json".to_string()),
                ("Accept", "application/json".to_string()),
            ],
            body: Some(serde_json::Value::from(pvs.to_vec()).to_string()),
        }
    }
}

/// `YYYY-MM-DDTHH:MM:SS.000±HH:MM` in the given offset. The archive rejects `Z`,
/// and a zero offset is written `-00:00`.
pub fn format_archive_timestamp(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = instant.with_timezone(&offset);
    let offset_secs = offset.local_minus_utc();
    let sign = if offset_secs > 0 { '+' } else { '-' };
    let abs = offset_secs.unsigned_abs();

    format!(
        "{}.000{}{:02}:{:02}",
        local.format("%Y-%m-%dT%H:%M:%S"),
        sign,
        abs / 3600,
        (abs % 3600) / 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::operator::Operator;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_format_utc_uses_negative_zero_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        assert_eq!(
            format_archive_timestamp(instant, utc()),
            "2024-03-01T12:30:45.000-00:00"
        );
    }

    #[test]
    fn test_format_truncates_sub_seconds() {
        let instant = Utc.timestamp_opt(1_709_296_245, 987_000_000).unwrap();
        assert_eq!(
            format_archive_timestamp(instant, utc()),
            "2024-03-01T12:30:45.000-00:00"
        );
    }

    #[test]
    fn test_format_converts_to_wall_time_of_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap();
        let pacific = FixedOffset::west_opt(8 * 3600).unwrap();
        assert_eq!(
            format_archive_timestamp(instant, pacific),
            "2024-01-14T19:00:00.000-08:00"
        );

        let india = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        assert_eq!(
            format_archive_timestamp(instant, india),
            "2024-01-15T08:30:00.000+05:30"
        );
    }

    #[test]
    fn test_build_binned_request() {
        let builder = RequestBuilder::new("http://archiver/retrieval/data/", utc(), false);
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let binning = ResolvedBinning::Binned {
            operator: Operator::Mean,
            bin_size_secs: 900,
        };

        let request = builder.build("SOME:PV:NAME", from, to, &binning);
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.label, "SOME:PV:NAME");
        assert_eq!(
            request.url,
            "http://archiver/retrieval/data/getData.json\
             ?pv=mean_900%28SOME%3APV%3ANAME%29\
             &from=2024-03-01T00%3A00%3A00.000-00%3A00\
             &to=2024-03-02T00%3A00%3A00.000-00%3A00"
        );
        assert!(request.body.is_none());
    }

    #[test]
    fn test_build_raw_request_keeps_pv_and_donotchunk() {
        let builder = RequestBuilder::new("http://archiver", utc(), true);
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();

        let request = builder.build("ROOM:LI30:1:OUTSIDE_TEMP", from, to, &ResolvedBinning::Raw);
        assert!(request.url.contains("pv=ROOM%3ALI30%3A1%3AOUTSIDE_TEMP&"));
        assert!(request.url.ends_with("&donotchunk=true"));
    }

    #[test]
    fn test_positive_offset_is_url_encoded() {
        let builder = RequestBuilder::new("http://archiver", FixedOffset::east_opt(3600).unwrap(), false);
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();

        let request = builder.build("A", from, to, &ResolvedBinning::Raw);
        assert!(request.url.contains("from=2024-03-01T01%3A00%3A00.000%2B01%3A00"));
    }

    #[test]
    fn test_build_at_time_posts_pv_list() {
        let builder = RequestBuilder::new("http://archiver", utc(), false);
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let pvs = vec!["VPIO:IN20:111:VRAW".to_string(), "ROOM:LI30:1:OUTSIDE_TEMP".to_string()];

        let request = builder.build_at_time(&pvs, at);
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.url,
            "http://archiver/getDataAtTime?at=2024-03-01T08%3A00%3A00.000-00%3A00"
        );
        assert_eq!(
            request.body.as_deref(),
            Some(r#"["VPIO:IN20:111:VRAW","ROOM:LI30:1:OUTSIDE_TEMP"]"#)
        );
        assert!(request
            .headers
            .contains(&("Content-Type", "application/json".to_string())));
    }
}
