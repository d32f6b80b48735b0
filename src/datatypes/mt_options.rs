// ABOUTME: Per-message overrides for mobile-terminated submits
// ABOUTME: Unset fields fall back to the defaults carried by the client's auth record

use crate::auth::ClientAuthRecord;
use crate::datatypes::timestamp;
use chrono::{DateTime, Local};

/// Optional submit settings. Anything left as `None` is taken from the
/// [`ClientAuthRecord`] the session logged in with.
///
/// # Example
///
/// ```rust
/// use smsgate::datatypes::MtOptions;
///
/// let options = MtOptions::new()
///     .need_report(1)
///     .msg_level(3)
///     .sp_sub_no("8801");
/// assert_eq!(options.msg_level, Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MtOptions {
    pub need_report: Option<u8>,
    pub msg_level: Option<u8>,
    pub fee_user_type: Option<u8>,
    pub fee_terminal_type: Option<u8>,
    pub service_id: Option<String>,
    pub fee_terminal_id: Option<String>,
    pub fee_type: Option<String>,
    pub fee_code: Option<String>,
    /// Absolute validity stamp (`yyMMddHHmmss032+`)
    pub valid_time: Option<String>,
    /// Scheduled delivery stamp (`yyMMddHHmmss032+`)
    pub at_time: Option<String>,
    /// Appended to the display number to form the sender
    pub sp_sub_no: Option<String>,
    pub link_id: Option<String>,
}

impl MtOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn need_report(mut self, flag: u8) -> Self {
        self.need_report = Some(flag);
        self
    }

    pub fn msg_level(mut self, level: u8) -> Self {
        self.msg_level = Some(level);
        self
    }

    /// 0 destination, 1 source, 2 SP, 3 see fee_terminal_id. Other values are ignored.
    pub fn fee_user_type(mut self, kind: u8) -> Self {
        self.fee_user_type = (kind <= 3).then_some(kind);
        self
    }

    /// 0 real number, 1 pseudo number. Other values are ignored.
    pub fn fee_terminal_type(mut self, kind: u8) -> Self {
        self.fee_terminal_type = (kind <= 1).then_some(kind);
        self
    }

    pub fn service_id(mut self, id: impl Into<String>) -> Self {
        self.service_id = Some(id.into());
        self
    }

    pub fn fee_terminal_id(mut self, id: impl Into<String>) -> Self {
        self.fee_terminal_id = Some(id.into());
        self
    }

    pub fn fee_type(mut self, fee_type: impl Into<String>) -> Self {
        self.fee_type = Some(fee_type.into());
        self
    }

    pub fn fee_code(mut self, code: impl Into<String>) -> Self {
        self.fee_code = Some(code.into());
        self
    }

    pub fn valid_time(mut self, stamp: impl Into<String>) -> Self {
        self.valid_time = Some(stamp.into());
        self
    }

    pub fn at_time(mut self, at: &DateTime<Local>) -> Self {
        self.at_time = Some(timestamp::validity_stamp(at));
        self
    }

    pub fn sp_sub_no(mut self, sub_no: impl Into<String>) -> Self {
        self.sp_sub_no = Some(sub_no.into());
        self
    }

    pub fn link_id(mut self, link_id: impl Into<String>) -> Self {
        self.link_id = Some(link_id.into());
        self
    }

    /// Merge with the record's defaults into concrete field values.
    pub fn resolve(&self, record: &ClientAuthRecord) -> ResolvedMt {
        let valid_time = self.valid_time.clone().unwrap_or_else(|| {
            let now = Local::now();
            timestamp::validity_stamp(&timestamp::after(&now, record.mt_valid_duration))
        });

        let mut src_id = record.sms_display_no.clone();
        if let Some(sub_no) = &self.sp_sub_no {
            src_id.push_str(sub_no);
        }

        ResolvedMt {
            need_report: self.need_report.unwrap_or(record.need_report),
            msg_level: self.msg_level.unwrap_or(record.default_msg_level),
            fee_user_type: self.fee_user_type.unwrap_or(record.fee_user_type),
            fee_terminal_type: self.fee_terminal_type.unwrap_or(record.fee_terminal_type),
            service_id: pick(&self.service_id, &record.service_id),
            fee_terminal_id: pick(&self.fee_terminal_id, &record.fee_terminal_id),
            fee_type: pick(&self.fee_type, &record.fee_type),
            fee_code: pick(&self.fee_code, &record.fee_code),
            valid_time,
            at_time: self.at_time.clone().unwrap_or_default(),
            src_id,
            link_id: pick(&self.link_id, &record.link_id),
        }
    }
}

fn pick(value: &Option<String>, fallback: &str) -> String {
    value.clone().unwrap_or_else(|| fallback.to_string())
}

/// Submit fields after defaults are applied
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMt {
    pub need_report: u8,
    pub msg_level: u8,
    pub fee_user_type: u8,
    pub fee_terminal_type: u8,
    pub service_id: String,
    pub fee_terminal_id: String,
    pub fee_type: String,
    pub fee_code: String,
    pub valid_time: String,
    pub at_time: String,
    pub src_id: String,
    pub link_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Isp;

    fn record() -> ClientAuthRecord {
        ClientAuthRecord::new(Isp::Cmpp, "123456", "888888", 0x30)
            .with_display_no("1064899")
            .with_service_id("MI0001")
    }

    #[test]
    fn unset_fields_come_from_the_record() {
        let resolved = MtOptions::new().resolve(&record());
        assert_eq!(resolved.need_report, 1);
        assert_eq!(resolved.service_id, "MI0001");
        assert_eq!(resolved.src_id, "1064899");
        assert!(resolved.at_time.is_empty());
        assert_eq!(resolved.valid_time.len(), 16);
        assert!(resolved.valid_time.ends_with("032+"));
    }

    #[test]
    fn overrides_win() {
        let resolved = MtOptions::new()
            .need_report(0)
            .service_id("OTHER")
            .sp_sub_no("01")
            .valid_time("231021080510032+")
            .resolve(&record());
        assert_eq!(resolved.need_report, 0);
        assert_eq!(resolved.service_id, "OTHER");
        assert_eq!(resolved.src_id, "106489901");
        assert_eq!(resolved.valid_time, "231021080510032+");
    }

    #[test]
    fn out_of_range_fee_kinds_are_ignored() {
        let options = MtOptions::new().fee_user_type(7).fee_terminal_type(2);
        assert_eq!(options.fee_user_type, None);
        assert_eq!(options.fee_terminal_type, None);
    }
}
